mod common;

use classweave::analysis::ClassHierarchy;
use classweave::class_file::{ConstantIndex, PoolEntry, Version};
use classweave::code::opcodes::*;
use classweave::code::{FrameKind, Label, LabelResolver, LdcValue};
use classweave::reader::ClassReader;
use classweave::tree::{ClassNode, InsnNode};
use classweave::visitor::{ClassVisitor, MethodVisitor};
use classweave::writer::{ClassWriter, WriterFlags, MAX_CODE_LENGTH};
use classweave::*;
use common::*;

fn start_class(flags: WriterFlags) -> ClassWriter {
    init_logging();
    let mut writer = ClassWriter::new(flags);
    writer
        .visit(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            "demo/Writer",
            Some("java/lang/Object"),
            &[],
        )
        .unwrap();
    writer
}

fn static_method<'a>(writer: &'a mut ClassWriter, descriptor: &str) -> Box<dyn MethodVisitor + 'a> {
    let mut method = writer
        .visit_method(MethodAccessFlags::STATIC, "m", descriptor, &[])
        .unwrap()
        .unwrap();
    method.visit_code().unwrap();
    method
}

#[test]
fn finishing_twice_fails() {
    let mut writer = start_class(WriterFlags::empty());
    writer.visit_end().unwrap();
    writer.finish().unwrap();
    assert!(matches!(writer.finish(), Err(Error::AlreadyFinished)));
    assert!(matches!(writer.visit_end(), Err(Error::AlreadyFinished)));
    assert!(matches!(
        writer.visit_field(FieldAccessFlags::PUBLIC, "f", "I", None),
        Err(Error::AlreadyFinished)
    ));
}

#[test]
fn finishing_without_header_fails() {
    let mut writer = ClassWriter::new(WriterFlags::empty());
    assert!(matches!(
        writer.finish(),
        Err(Error::MalformedAttribute { name: "ClassFile", .. })
    ));
}

#[test]
fn label_must_be_placed() {
    let mut writer = start_class(WriterFlags::empty());
    let mut method = static_method(&mut writer, "()V");
    let target = Label::from_raw(0);
    method.visit_jump_insn(GOTO, target).unwrap();
    method.visit_maxs(0, 0).unwrap();
    assert!(matches!(
        method.visit_end(),
        Err(Error::UnresolvedLabel(label)) if label == target
    ));
}

#[test]
fn label_placed_twice() {
    let mut writer = start_class(WriterFlags::empty());
    let mut method = static_method(&mut writer, "()V");
    let label = Label::from_raw(0);
    method.visit_label(label).unwrap();
    method.visit_insn(NOP).unwrap();
    assert!(matches!(
        method.visit_label(label),
        Err(Error::DoublePlacement(l)) if l == label
    ));
}

#[test]
fn narrow_jump_out_of_range() {
    let mut writer = start_class(WriterFlags::empty());
    let mut method = static_method(&mut writer, "()V");
    let far = Label::from_raw(0);
    method.visit_jump_insn(GOTO, far).unwrap();
    for _ in 0..33_000 {
        method.visit_insn(NOP).unwrap();
    }
    method.visit_label(far).unwrap();
    method.visit_insn(RETURN).unwrap();
    method.visit_maxs(0, 0).unwrap();
    assert!(matches!(
        method.visit_end(),
        Err(Error::OffsetOutOfRange { delta: 33_003, .. })
    ));
}

#[test]
fn wide_jump_reaches_far() {
    let mut writer = start_class(WriterFlags::empty());
    {
        let mut method = static_method(&mut writer, "()V");
        let far = Label::from_raw(0);
        method.visit_jump_insn(GOTO_W, far).unwrap();
        for _ in 0..33_000 {
            method.visit_insn(NOP).unwrap();
        }
        method.visit_label(far).unwrap();
        method.visit_insn(RETURN).unwrap();
        method.visit_maxs(0, 0).unwrap();
        method.visit_end().unwrap();
    }
    writer.visit_end().unwrap();
    let bytes = writer.finish().unwrap();

    let mut class = ClassNode::new();
    ClassReader::decode(&bytes, &mut class).unwrap();
    let (_, first) = class.methods[0].instructions.iter().next().unwrap();
    assert!(matches!(
        first,
        InsnNode::Insn(classweave::code::Insn::Jump { opcode: GOTO_W, .. })
    ));
}

#[test]
fn code_too_large() {
    let mut writer = start_class(WriterFlags::empty());
    let mut method = static_method(&mut writer, "()V");
    for _ in 0..MAX_CODE_LENGTH {
        method.visit_insn(NOP).unwrap();
    }
    method.visit_insn(RETURN).unwrap();
    method.visit_maxs(0, 0).unwrap();
    assert!(matches!(
        method.visit_end(),
        Err(Error::CodeTooLarge(65536))
    ));
}

#[test]
fn tableswitch_needs_one_target_per_key() {
    let mut writer = start_class(WriterFlags::empty());
    let mut method = static_method(&mut writer, "(I)V");
    let label = Label::from_raw(0);
    method.visit_var_insn(ILOAD, 0).unwrap();
    assert!(matches!(
        method.visit_table_switch_insn(0, 3, label, &[label, label]),
        Err(Error::MalformedAttribute { name: "Code", .. })
    ));
}

#[test]
fn pool_deduplicates() {
    let (writer, _) = write_sample(WriterFlags::COMPUTE_FRAMES);
    let mut pool = writer.symbols().pool.clone();
    let before = pool.len();

    let entry = PoolEntry::MethodRef {
        owner: "java/lang/Object",
        name: "<init>",
        descriptor: "()V",
        is_interface: false,
    };
    let indices: Vec<ConstantIndex> = (0..5).map(|_| pool.intern(&entry).unwrap()).collect();
    assert!(indices.iter().all(|index| *index == indices[0]));
    assert_eq!(pool.len(), before);

    let fresh = pool.intern(&PoolEntry::Utf8("never seen before")).unwrap();
    assert_eq!(pool.intern(&PoolEntry::Utf8("never seen before")).unwrap(), fresh);
    assert_eq!(pool.len(), before + 1);
}

#[test]
fn label_resolver_contract() {
    let mut labels = LabelResolver::new();
    let label = labels.new_label();
    assert!(matches!(labels.offset_of(label), Err(Error::NotYetPlaced(l)) if l == label));
    labels.place(label, 17).unwrap();
    assert_eq!(labels.offset_of(label).unwrap(), 17);
    assert!(matches!(labels.place(label, 18), Err(Error::DoublePlacement(l)) if l == label));
}

#[test]
fn computed_maxs_for_straight_line_code() {
    let mut writer = start_class(WriterFlags::COMPUTE_MAXS);
    {
        let mut method = writer
            .visit_method(MethodAccessFlags::PUBLIC, "go", "()V", &[])
            .unwrap()
            .unwrap();
        method.visit_code().unwrap();
        method.visit_var_insn(ALOAD, 0).unwrap();
        method
            .visit_method_insn(INVOKEVIRTUAL, "demo/Writer", "other", "()V", false)
            .unwrap();
        method.visit_insn(RETURN).unwrap();
        method.visit_maxs(99, 99).unwrap();
        method.visit_end().unwrap();
    }
    writer.visit_end().unwrap();
    let bytes = writer.finish().unwrap();

    let mut class = ClassNode::new();
    ClassReader::decode(&bytes, &mut class).unwrap();
    let method = &class.methods[0];
    assert_eq!((method.max_stack, method.max_locals), (1, 1));
}

#[test]
fn computed_frame_at_loop_header() {
    let mut writer = start_class(WriterFlags::COMPUTE_FRAMES);
    {
        let mut method = static_method(&mut writer, "(I)V");
        let top = Label::from_raw(0);
        method.visit_label(top).unwrap();
        method.visit_iinc_insn(0, -1).unwrap();
        method.visit_var_insn(ILOAD, 0).unwrap();
        method.visit_jump_insn(IFNE, top).unwrap();
        method.visit_insn(RETURN).unwrap();
        method.visit_maxs(0, 0).unwrap();
        method.visit_end().unwrap();
    }
    writer.visit_end().unwrap();
    let bytes = writer.finish().unwrap();

    let mut class = ClassNode::new();
    ClassReader::decode(&bytes, &mut class).unwrap();
    let nodes: Vec<&InsnNode> = class.methods[0]
        .instructions
        .iter()
        .map(|(_, node)| node)
        .collect();
    assert!(matches!(nodes[0], InsnNode::Label(_)));
    assert!(matches!(nodes[1], InsnNode::Frame(frame) if frame.kind == FrameKind::Same));
    assert_eq!(
        nodes
            .iter()
            .filter(|node| matches!(node, InsnNode::Frame(_)))
            .count(),
        1
    );
}

#[test]
fn conflicting_locals_are_reported() {
    let mut writer = start_class(WriterFlags::COMPUTE_FRAMES);
    {
        let mut method = static_method(&mut writer, "(Z)V");
        let other = Label::from_raw(0);
        let join = Label::from_raw(1);
        method.visit_var_insn(ILOAD, 0).unwrap();
        method.visit_jump_insn(IFEQ, other).unwrap();
        method.visit_insn(ICONST_0).unwrap();
        method.visit_var_insn(ISTORE, 1).unwrap();
        method.visit_jump_insn(GOTO, join).unwrap();
        method.visit_label(other).unwrap();
        method.visit_insn(FCONST_0).unwrap();
        method.visit_var_insn(FSTORE, 1).unwrap();
        method.visit_label(join).unwrap();
        method.visit_insn(RETURN).unwrap();
        method.visit_maxs(0, 0).unwrap();
        method.visit_end().unwrap();
    }
    writer.visit_end().unwrap();
    writer.finish().unwrap();

    assert!(writer.diagnostics().iter().any(|diagnostic| matches!(
        diagnostic,
        Diagnostic::InconsistentFrameMerge {
            slot: FrameSlot::Local(1),
            ..
        }
    )));
}

#[test]
fn frames_merge_through_the_hierarchy() {
    let mut hierarchy = ClassHierarchy::new();
    hierarchy.add_class("demo/Base", Some("java/lang/Object".to_owned()));
    hierarchy.add_class("demo/Left", Some("demo/Base".to_owned()));
    hierarchy.add_class("demo/Right", Some("demo/Base".to_owned()));

    let mut writer =
        start_class(WriterFlags::COMPUTE_FRAMES).with_hierarchy(Box::new(hierarchy));
    {
        let mut method = static_method(&mut writer, "(ZLdemo/Left;Ldemo/Right;)Ljava/lang/Object;");
        let other = Label::from_raw(0);
        let join = Label::from_raw(1);
        method.visit_var_insn(ILOAD, 0).unwrap();
        method.visit_jump_insn(IFEQ, other).unwrap();
        method.visit_var_insn(ALOAD, 1).unwrap();
        method.visit_jump_insn(GOTO, join).unwrap();
        method.visit_label(other).unwrap();
        method.visit_var_insn(ALOAD, 2).unwrap();
        method.visit_label(join).unwrap();
        method.visit_insn(ARETURN).unwrap();
        method.visit_maxs(0, 0).unwrap();
        method.visit_end().unwrap();
    }
    writer.visit_end().unwrap();
    let bytes = writer.finish().unwrap();

    let mut class = ClassNode::new();
    ClassReader::decode(&bytes, &mut class).unwrap();
    let stacks: Vec<Vec<_>> = class.methods[0]
        .instructions
        .iter()
        .filter_map(|(_, node)| match node {
            InsnNode::Frame(frame) => Some(frame.stack.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        stacks.last().unwrap(),
        &vec![classweave::class_file::VerificationType::Object(
            "demo/Base".to_owned()
        )]
    );
}

#[test]
fn old_classes_get_no_frames() {
    init_logging();
    let mut writer = ClassWriter::new(WriterFlags::COMPUTE_FRAMES);
    writer
        .visit(
            Version::JAVA5,
            ClassAccessFlags::PUBLIC,
            "demo/Old",
            Some("java/lang/Object"),
            &[],
        )
        .unwrap();
    {
        let mut method = static_method(&mut writer, "(I)V");
        let top = Label::from_raw(0);
        method.visit_label(top).unwrap();
        method.visit_iinc_insn(0, -1).unwrap();
        method.visit_var_insn(ILOAD, 0).unwrap();
        method.visit_jump_insn(IFNE, top).unwrap();
        method.visit_insn(RETURN).unwrap();
        method.visit_maxs(0, 0).unwrap();
        method.visit_end().unwrap();
    }
    writer.visit_end().unwrap();
    let bytes = writer.finish().unwrap();

    let mut class = ClassNode::new();
    ClassReader::decode(&bytes, &mut class).unwrap();
    assert_eq!(class.methods[0].max_stack, 1);
    assert!(!class.methods[0]
        .instructions
        .iter()
        .any(|(_, node)| matches!(node, InsnNode::Frame(_))));
}

#[test]
fn long_constants_use_ldc2_w() {
    let mut writer = start_class(WriterFlags::COMPUTE_MAXS);
    {
        let mut method = static_method(&mut writer, "()J");
        method.visit_ldc_insn(&LdcValue::Long(1 << 40)).unwrap();
        method.visit_insn(LRETURN).unwrap();
        method.visit_maxs(0, 0).unwrap();
        method.visit_end().unwrap();
    }
    writer.visit_end().unwrap();
    let bytes = writer.finish().unwrap();

    let mut class = ClassNode::new();
    ClassReader::decode(&bytes, &mut class).unwrap();
    assert_eq!(class.methods[0].max_stack, 2);
    assert!(class.methods[0].instructions.iter().any(|(_, node)| matches!(
        node,
        InsnNode::Insn(classweave::code::Insn::Ldc {
            value: LdcValue::Long(value),
            ..
        }) if *value == 1 << 40
    )));
}

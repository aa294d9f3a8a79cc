use crate::access_flags::MethodAccessFlags;
use crate::class_file::{Attribute, VerificationType};
use crate::code::{
    Encoding, FrameKind, FrameType, Handle, Insn, Label, LabelGenerator, LdcValue,
    SequentialLabels,
};
use crate::tree::{FrameNode, InsnList, InsnNode};
use crate::visitor::MethodVisitor;
use crate::Error;
use std::collections::HashSet;

/// Exception handler covering `[start, end)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryCatchBlockNode {
    pub start: Label,
    pub end: Label,
    pub handler: Label,

    /// Internal name of the exception class caught, or `None` to catch everything
    pub catch_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableNode {
    pub name: String,
    pub descriptor: String,
    pub start: Label,
    pub end: Label,
    pub index: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumberNode {
    pub line: u16,
    pub start: Label,
}

/// Method, with its code as an editable instruction list
///
/// Recording events into a method node and then calling [`MethodNode::accept`] replays the same
/// events (modulo whatever edits were made in between).
#[derive(Debug, Clone)]
pub struct MethodNode {
    pub access_flags: MethodAccessFlags,
    pub name: String,
    pub descriptor: String,
    pub exceptions: Vec<String>,

    /// Method attributes which are not otherwise decoded, along with any placeholders for
    /// `Code` and `Exceptions` (see [attribute placement](crate::visitor#attribute-placement))
    pub attributes: Vec<Attribute>,

    /// Whether the method has a `Code` attribute (it does if there are any instructions)
    pub has_code: bool,
    pub instructions: InsnList,

    /// Exception handlers, in the order they are tried
    pub try_catch_blocks: Vec<TryCatchBlockNode>,
    pub local_variables: Vec<LocalVariableNode>,
    pub line_numbers: Vec<LineNumberNode>,

    /// Code attributes which are not otherwise decoded
    pub code_attributes: Vec<Attribute>,
    pub max_stack: u16,
    pub max_locals: u16,

    labels: SequentialLabels,

    /// Encoding from `visit_insn_encoding`, for the next instruction
    encoding: Encoding,
}

impl MethodNode {
    pub fn new(
        access_flags: MethodAccessFlags,
        name: impl Into<String>,
        descriptor: impl Into<String>,
        exceptions: Vec<String>,
    ) -> MethodNode {
        MethodNode {
            access_flags,
            name: name.into(),
            descriptor: descriptor.into(),
            exceptions,
            attributes: vec![],
            has_code: false,
            instructions: InsnList::new(),
            try_catch_blocks: vec![],
            local_variables: vec![],
            line_numbers: vec![],
            code_attributes: vec![],
            max_stack: 0,
            max_locals: 0,
            labels: SequentialLabels::new(),
            encoding: Encoding::Compact,
        }
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    fn has_any_code(&self) -> bool {
        self.has_code || !self.instructions.is_empty()
    }

    /// Make sure labels handed out by `fresh_label` never collide with `label`
    fn saw(&mut self, label: Label) -> Label {
        self.labels.skip_past(label);
        label
    }

    /// Encoding for the instruction being pushed, resetting it for the next one
    fn take_encoding(&mut self) -> Encoding {
        std::mem::take(&mut self.encoding)
    }

    fn push(&mut self, node: InsnNode) -> Result<(), Error> {
        if let InsnNode::Insn(insn) = &node {
            for target in insn.targets() {
                self.labels.skip_past(target);
            }
        }
        self.instructions.push_back(node);
        Ok(())
    }

    /// Every label referenced by an instruction, frame, exception handler, or debug entry
    pub fn referenced_labels(&self) -> Vec<Label> {
        let mut labels = vec![];
        for (_, node) in &self.instructions {
            match node {
                InsnNode::Insn(insn) => labels.extend(insn.targets()),
                InsnNode::Frame(frame) => {
                    for typ in frame.locals.iter().chain(&frame.stack) {
                        if let VerificationType::Uninitialized(label) = typ {
                            labels.push(*label);
                        }
                    }
                }
                InsnNode::Label(_) => (),
            }
        }
        for block in &self.try_catch_blocks {
            labels.extend([block.start, block.end, block.handler]);
        }
        for local in &self.local_variables {
            labels.extend([local.start, local.end]);
        }
        labels.extend(self.line_numbers.iter().map(|line| line.start));
        labels
    }

    /// Check that every referenced label is placed in the instruction list
    pub fn check_labels(&self) -> Result<(), Error> {
        let placed: HashSet<Label> = self
            .instructions
            .iter()
            .filter_map(|(_, node)| match node {
                InsnNode::Label(label) => Some(*label),
                _ => None,
            })
            .collect();
        match self
            .referenced_labels()
            .into_iter()
            .find(|label| !placed.contains(label))
        {
            Some(dangling) => Err(Error::DanglingLabelReference(dangling)),
            None => Ok(()),
        }
    }

    /// Replay the method contents (everything after `visit_method`) into a visitor
    pub fn accept(&self, visitor: &mut dyn MethodVisitor) -> Result<(), Error> {
        for attribute in &self.attributes {
            visitor.visit_attribute(attribute)?;
        }

        if self.has_any_code() {
            self.check_labels()?;
            visitor.visit_code()?;
            for (_, node) in &self.instructions {
                match node {
                    InsnNode::Insn(insn) => insn.accept(visitor)?,
                    InsnNode::Label(label) => visitor.visit_label(*label)?,
                    InsnNode::Frame(frame) => {
                        visitor.visit_frame(frame.kind, &frame.locals, &frame.stack)?
                    }
                }
            }
            for block in &self.try_catch_blocks {
                visitor.visit_try_catch_block(
                    block.start,
                    block.end,
                    block.handler,
                    block.catch_type.as_deref(),
                )?;
            }
            for local in &self.local_variables {
                visitor.visit_local_variable(
                    &local.name,
                    &local.descriptor,
                    local.start,
                    local.end,
                    local.index,
                )?;
            }
            for line in &self.line_numbers {
                visitor.visit_line_number(line.line, line.start)?;
            }
            for attribute in &self.code_attributes {
                visitor.visit_attribute(attribute)?;
            }
            visitor.visit_maxs(self.max_stack, self.max_locals)?;
        }

        visitor.visit_end()
    }
}

impl LabelGenerator for MethodNode {
    fn fresh_label(&mut self) -> Label {
        self.labels.fresh_label()
    }
}

impl MethodVisitor for MethodNode {
    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<(), Error> {
        if self.has_code {
            self.code_attributes.push(attribute.clone());
        } else {
            self.attributes.push(attribute.clone());
        }
        Ok(())
    }

    fn visit_code(&mut self) -> Result<(), Error> {
        self.has_code = true;
        Ok(())
    }

    fn visit_frame(
        &mut self,
        kind: FrameKind,
        locals: &[FrameType],
        stack: &[FrameType],
    ) -> Result<(), Error> {
        for typ in locals.iter().chain(stack) {
            if let VerificationType::Uninitialized(label) = typ {
                self.saw(*label);
            }
        }
        self.push(InsnNode::Frame(FrameNode {
            kind,
            locals: locals.to_vec(),
            stack: stack.to_vec(),
        }))
    }

    fn visit_insn(&mut self, opcode: u8) -> Result<(), Error> {
        self.push(Insn::Simple(opcode).into())
    }

    fn visit_int_insn(&mut self, opcode: u8, operand: i32) -> Result<(), Error> {
        self.push(Insn::Int { opcode, operand }.into())
    }

    fn visit_var_insn(&mut self, opcode: u8, var: u16) -> Result<(), Error> {
        let encoding = self.take_encoding();
        self.push(
            Insn::Var {
                opcode,
                var,
                encoding,
            }
            .into(),
        )
    }

    fn visit_insn_encoding(&mut self, encoding: Encoding) -> Result<(), Error> {
        self.encoding = encoding;
        Ok(())
    }

    fn visit_type_insn(&mut self, opcode: u8, class: &str) -> Result<(), Error> {
        self.push(
            Insn::Type {
                opcode,
                class: class.to_owned(),
            }
            .into(),
        )
    }

    fn visit_field_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<(), Error> {
        self.push(
            Insn::Field {
                opcode,
                owner: owner.to_owned(),
                name: name.to_owned(),
                descriptor: descriptor.to_owned(),
            }
            .into(),
        )
    }

    fn visit_method_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<(), Error> {
        self.push(
            Insn::Method {
                opcode,
                owner: owner.to_owned(),
                name: name.to_owned(),
                descriptor: descriptor.to_owned(),
                is_interface,
            }
            .into(),
        )
    }

    fn visit_invoke_dynamic_insn(
        &mut self,
        name: &str,
        descriptor: &str,
        bootstrap: &Handle,
        arguments: &[LdcValue],
    ) -> Result<(), Error> {
        self.push(
            Insn::InvokeDynamic {
                name: name.to_owned(),
                descriptor: descriptor.to_owned(),
                bootstrap: bootstrap.clone(),
                arguments: arguments.to_vec(),
            }
            .into(),
        )
    }

    fn visit_jump_insn(&mut self, opcode: u8, target: Label) -> Result<(), Error> {
        self.push(Insn::Jump { opcode, target }.into())
    }

    fn visit_label(&mut self, label: Label) -> Result<(), Error> {
        let label = self.saw(label);
        self.push(InsnNode::Label(label))
    }

    fn visit_ldc_insn(&mut self, value: &LdcValue) -> Result<(), Error> {
        let encoding = self.take_encoding();
        self.push(
            Insn::Ldc {
                value: value.clone(),
                encoding,
            }
            .into(),
        )
    }

    fn visit_iinc_insn(&mut self, var: u16, increment: i16) -> Result<(), Error> {
        let encoding = self.take_encoding();
        self.push(
            Insn::Iinc {
                var,
                increment,
                encoding,
            }
            .into(),
        )
    }

    fn visit_table_switch_insn(
        &mut self,
        low: i32,
        high: i32,
        default: Label,
        targets: &[Label],
    ) -> Result<(), Error> {
        self.push(
            Insn::TableSwitch {
                low,
                high,
                default,
                targets: targets.to_vec(),
            }
            .into(),
        )
    }

    fn visit_lookup_switch_insn(
        &mut self,
        default: Label,
        pairs: &[(i32, Label)],
    ) -> Result<(), Error> {
        self.push(
            Insn::LookupSwitch {
                default,
                pairs: pairs.to_vec(),
            }
            .into(),
        )
    }

    fn visit_multi_anewarray_insn(&mut self, descriptor: &str, dimensions: u8) -> Result<(), Error> {
        self.push(
            Insn::MultiANewArray {
                descriptor: descriptor.to_owned(),
                dimensions,
            }
            .into(),
        )
    }

    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> Result<(), Error> {
        let start = self.saw(start);
        let end = self.saw(end);
        let handler = self.saw(handler);
        self.try_catch_blocks.push(TryCatchBlockNode {
            start,
            end,
            handler,
            catch_type: catch_type.map(str::to_owned),
        });
        Ok(())
    }

    fn visit_local_variable(
        &mut self,
        name: &str,
        descriptor: &str,
        start: Label,
        end: Label,
        index: u16,
    ) -> Result<(), Error> {
        let start = self.saw(start);
        let end = self.saw(end);
        self.local_variables.push(LocalVariableNode {
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            start,
            end,
            index,
        });
        Ok(())
    }

    fn visit_line_number(&mut self, line: u16, start: Label) -> Result<(), Error> {
        let start = self.saw(start);
        self.line_numbers.push(LineNumberNode { line, start });
        Ok(())
    }

    fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<(), Error> {
        self.max_stack = max_stack;
        self.max_locals = max_locals;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::opcodes::*;

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl MethodVisitor for Recorder {
        fn visit_code(&mut self) -> Result<(), Error> {
            self.0.push("code".to_owned());
            Ok(())
        }

        fn visit_insn(&mut self, opcode: u8) -> Result<(), Error> {
            self.0.push(format!("insn {}", opcode));
            Ok(())
        }

        fn visit_jump_insn(&mut self, opcode: u8, target: Label) -> Result<(), Error> {
            self.0.push(format!("jump {} {:?}", opcode, target));
            Ok(())
        }

        fn visit_label(&mut self, label: Label) -> Result<(), Error> {
            self.0.push(format!("label {:?}", label));
            Ok(())
        }

        fn visit_try_catch_block(
            &mut self,
            start: Label,
            _end: Label,
            handler: Label,
            catch_type: Option<&str>,
        ) -> Result<(), Error> {
            self.0
                .push(format!("try {:?} {:?} {:?}", start, handler, catch_type));
            Ok(())
        }

        fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<(), Error> {
            self.0.push(format!("maxs {} {}", max_stack, max_locals));
            Ok(())
        }

        fn visit_end(&mut self) -> Result<(), Error> {
            self.0.push("end".to_owned());
            Ok(())
        }
    }

    #[test]
    fn replays_recorded_events() {
        let mut method = MethodNode::new(MethodAccessFlags::STATIC, "f", "()V", vec![]);
        let top = Label::from_raw(3);
        method.visit_code().unwrap();
        method.visit_label(top).unwrap();
        method.visit_insn(NOP).unwrap();
        method.visit_jump_insn(GOTO, top).unwrap();
        method
            .visit_try_catch_block(top, top, top, Some("java/lang/Throwable"))
            .unwrap();
        method.visit_maxs(0, 0).unwrap();
        method.visit_end().unwrap();

        let mut recorder = Recorder::default();
        method.accept(&mut recorder).unwrap();
        assert_eq!(
            recorder.0,
            vec![
                "code",
                "label L3",
                "insn 0",
                "jump 167 L3",
                "try L3 L3 Some(\"java/lang/Throwable\")",
                "maxs 0 0",
                "end",
            ]
        );

        // Fresh labels don't collide with recorded ones
        assert_eq!(method.fresh_label(), Label::from_raw(4));
    }

    #[test]
    fn removed_label_is_dangling() {
        let mut method = MethodNode::new(MethodAccessFlags::STATIC, "f", "()V", vec![]);
        let target = method.fresh_label();
        let label_id = method.instructions.push_back(InsnNode::Label(target));
        method.instructions.push_back(Insn::Jump {
            opcode: GOTO,
            target,
        });
        method.instructions.remove(label_id).unwrap();

        let mut recorder = Recorder::default();
        assert!(matches!(
            method.accept(&mut recorder),
            Err(Error::DanglingLabelReference(label)) if label == target
        ));
    }

    #[test]
    fn encoding_applies_to_the_next_instruction_only() {
        let mut method = MethodNode::new(MethodAccessFlags::STATIC, "f", "(I)V", vec![]);
        method.visit_code().unwrap();
        method.visit_insn_encoding(Encoding::Wide).unwrap();
        method.visit_iinc_insn(0, 1).unwrap();
        method.visit_var_insn(ILOAD, 0).unwrap();
        method.visit_insn(POP).unwrap();
        method.visit_insn(RETURN).unwrap();

        let insns: Vec<&Insn> = method
            .instructions
            .iter()
            .filter_map(|(_, node)| node.as_insn())
            .collect();
        assert_eq!(
            insns[..2],
            [
                &Insn::Iinc {
                    var: 0,
                    increment: 1,
                    encoding: Encoding::Wide,
                },
                &Insn::Var {
                    opcode: ILOAD,
                    var: 0,
                    encoding: Encoding::Compact,
                },
            ]
        );
    }

    #[test]
    fn abstract_method_has_no_code_events() {
        let method = MethodNode::new(MethodAccessFlags::ABSTRACT, "f", "()V", vec![]);
        let mut recorder = Recorder::default();
        method.accept(&mut recorder).unwrap();
        assert_eq!(recorder.0, vec!["end"]);
    }
}

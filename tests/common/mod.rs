#![allow(dead_code)]

use classweave::class_file::{Attribute, Serialize, Version};
use classweave::code::opcodes::*;
use classweave::code::{
    ConstantDynamic, Handle, HandleKind, Label, LabelGenerator, LdcValue, SequentialLabels,
};
use classweave::visitor::{ClassVisitor, MethodVisitor};
use classweave::writer::{ClassWriter, WriterFlags};
use classweave::*;

pub const SAMPLE_NAME: &str = "demo/Sample";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Offset just past the constant pool of a class written by `writer`
pub fn pool_end(writer: &ClassWriter) -> usize {
    let mut pool = vec![];
    writer.symbols().pool.serialize(&mut pool).unwrap();
    8 + pool.len()
}

fn begin_method<'a>(
    writer: &'a mut ClassWriter,
    access_flags: MethodAccessFlags,
    name: &str,
    descriptor: &str,
    exceptions: &[String],
) -> Box<dyn MethodVisitor + 'a> {
    let mut method = writer
        .visit_method(access_flags, name, descriptor, exceptions)
        .unwrap()
        .unwrap();
    method.visit_code().unwrap();
    method
}

fn lambda_metafactory() -> Handle {
    Handle {
        kind: HandleKind::InvokeStatic,
        owner: "java/lang/invoke/LambdaMetafactory".to_owned(),
        name: "metafactory".to_owned(),
        descriptor: "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;".to_owned(),
        is_interface: false,
    }
}

/// Class with a bit of everything the reader and writer understand
///
/// ```java,ignore,no_run
/// public class Sample implements Runnable {
///     public static final int ANSWER = 42;
///     private String name;
///
///     public Sample() { super(); }
///     static int classify(int x) { /* tableswitch, then lookupswitch */ }
///     static long sum(int n) throws java.io.IOException { /* loop */ }
///     static String guarded(Object o) { /* two handlers over the same range */ }
///     static Object fresh() { return new Object(); }
///     public void run() { Runnable r = () -> {}; }
///     static int constant() { /* dynamic constant */ }
///     static void wide() { int x300 = 0; x300 += 1000; }
///     static native void poke();
/// }
/// ```
pub fn write_sample(flags: WriterFlags) -> (ClassWriter, Vec<u8>) {
    init_logging();
    let mut labels = SequentialLabels::new();
    let mut writer = ClassWriter::new(flags);
    writer
        .visit(
            Version::JAVA11,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            SAMPLE_NAME,
            Some("java/lang/Object"),
            &["java/lang/Runnable".to_owned()],
        )
        .unwrap();
    writer.visit_source("Sample.java").unwrap();
    writer
        .visit_attribute(&Attribute {
            name: "Demo".to_owned(),
            data: vec![1, 2, 3],
        })
        .unwrap();

    {
        let mut field = writer
            .visit_field(
                FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
                "ANSWER",
                "I",
                Some(&LdcValue::Integer(42)),
            )
            .unwrap()
            .unwrap();
        field.visit_end().unwrap();
    }
    {
        let mut field = writer
            .visit_field(FieldAccessFlags::PRIVATE, "name", "Ljava/lang/String;", None)
            .unwrap()
            .unwrap();
        field
            .visit_attribute(&Attribute {
                name: "Note".to_owned(),
                data: vec![7],
            })
            .unwrap();
        field.visit_end().unwrap();
    }

    // Constructor, with debug information
    {
        let start = labels.fresh_label();
        let end = labels.fresh_label();
        let mut method = begin_method(&mut writer, MethodAccessFlags::PUBLIC, "<init>", "()V", &[]);
        method.visit_label(start).unwrap();
        method.visit_var_insn(ALOAD, 0).unwrap();
        method
            .visit_method_insn(INVOKESPECIAL, "java/lang/Object", "<init>", "()V", false)
            .unwrap();
        method.visit_insn(RETURN).unwrap();
        method.visit_label(end).unwrap();
        method
            .visit_local_variable("this", "Ldemo/Sample;", start, end, 0)
            .unwrap();
        method.visit_line_number(3, start).unwrap();
        method.visit_maxs(1, 1).unwrap();
        method.visit_end().unwrap();
    }

    // Switches
    {
        let cases: Vec<Label> = (0..3).map(|_| labels.fresh_label()).collect();
        let otherwise = labels.fresh_label();
        let negative = labels.fresh_label();
        let big = labels.fresh_label();
        let other = labels.fresh_label();
        let mut method = begin_method(&mut writer, MethodAccessFlags::STATIC, "classify", "(I)I", &[]);
        method.visit_var_insn(ILOAD, 0).unwrap();
        method
            .visit_table_switch_insn(0, 2, otherwise, &cases)
            .unwrap();
        method.visit_label(cases[0]).unwrap();
        method.visit_insn(ICONST_1).unwrap();
        method.visit_insn(IRETURN).unwrap();
        method.visit_label(cases[1]).unwrap();
        method.visit_insn(ICONST_2).unwrap();
        method.visit_insn(IRETURN).unwrap();
        method.visit_label(cases[2]).unwrap();
        method.visit_int_insn(BIPUSH, 100).unwrap();
        method.visit_insn(IRETURN).unwrap();
        method.visit_label(otherwise).unwrap();
        method.visit_var_insn(ILOAD, 0).unwrap();
        method
            .visit_lookup_switch_insn(other, &[(-5, negative), (1000, big)])
            .unwrap();
        method.visit_label(negative).unwrap();
        method.visit_int_insn(SIPUSH, -300).unwrap();
        method.visit_insn(IRETURN).unwrap();
        method.visit_label(big).unwrap();
        method.visit_ldc_insn(&LdcValue::Integer(100_000)).unwrap();
        method.visit_insn(IRETURN).unwrap();
        method.visit_label(other).unwrap();
        method.visit_insn(ICONST_M1).unwrap();
        method.visit_insn(IRETURN).unwrap();
        method.visit_maxs(1, 1).unwrap();
        method.visit_end().unwrap();
    }

    // Loop
    {
        let top = labels.fresh_label();
        let done = labels.fresh_label();
        let mut method = begin_method(
            &mut writer,
            MethodAccessFlags::STATIC,
            "sum",
            "(I)J",
            &["java/io/IOException".to_owned()],
        );
        method.visit_insn(LCONST_0).unwrap();
        method.visit_var_insn(LSTORE, 1).unwrap();
        method.visit_label(top).unwrap();
        method.visit_var_insn(ILOAD, 0).unwrap();
        method.visit_jump_insn(IFLE, done).unwrap();
        method.visit_var_insn(LLOAD, 1).unwrap();
        method.visit_var_insn(ILOAD, 0).unwrap();
        method.visit_insn(I2L).unwrap();
        method.visit_insn(LADD).unwrap();
        method.visit_var_insn(LSTORE, 1).unwrap();
        method.visit_iinc_insn(0, -1).unwrap();
        method.visit_jump_insn(GOTO, top).unwrap();
        method.visit_label(done).unwrap();
        method.visit_var_insn(LLOAD, 1).unwrap();
        method.visit_insn(LRETURN).unwrap();
        method.visit_maxs(4, 3).unwrap();
        method.visit_end().unwrap();
    }

    // Overlapping handlers: `ClassCastException` is tried before the catch-all
    {
        let start = labels.fresh_label();
        let end = labels.fresh_label();
        let on_cast = labels.fresh_label();
        let on_any = labels.fresh_label();
        let mut method = begin_method(
            &mut writer,
            MethodAccessFlags::STATIC,
            "guarded",
            "(Ljava/lang/Object;)Ljava/lang/String;",
            &[],
        );
        method.visit_label(start).unwrap();
        method.visit_var_insn(ALOAD, 0).unwrap();
        method.visit_type_insn(CHECKCAST, "java/lang/String").unwrap();
        method.visit_insn(ARETURN).unwrap();
        method.visit_label(end).unwrap();
        method.visit_label(on_cast).unwrap();
        method.visit_insn(POP).unwrap();
        method
            .visit_ldc_insn(&LdcValue::String("cce".to_owned()))
            .unwrap();
        method.visit_insn(ARETURN).unwrap();
        method.visit_label(on_any).unwrap();
        method.visit_insn(POP).unwrap();
        method.visit_insn(ACONST_NULL).unwrap();
        method.visit_insn(ARETURN).unwrap();
        method
            .visit_try_catch_block(start, end, on_cast, Some("java/lang/ClassCastException"))
            .unwrap();
        method
            .visit_try_catch_block(start, end, on_any, None)
            .unwrap();
        method.visit_maxs(1, 1).unwrap();
        method.visit_end().unwrap();
    }

    // Allocation
    {
        let mut method = begin_method(
            &mut writer,
            MethodAccessFlags::STATIC,
            "fresh",
            "()Ljava/lang/Object;",
            &[],
        );
        method.visit_type_insn(NEW, "java/lang/Object").unwrap();
        method.visit_insn(DUP).unwrap();
        method
            .visit_method_insn(INVOKESPECIAL, "java/lang/Object", "<init>", "()V", false)
            .unwrap();
        method.visit_insn(ARETURN).unwrap();
        method.visit_maxs(2, 0).unwrap();
        method.visit_end().unwrap();
    }

    // Lambda
    {
        let mut method = begin_method(&mut writer, MethodAccessFlags::PUBLIC, "run", "()V", &[]);
        method
            .visit_invoke_dynamic_insn(
                "run",
                "()Ljava/lang/Runnable;",
                &lambda_metafactory(),
                &[
                    LdcValue::MethodType("()V".to_owned()),
                    LdcValue::MethodHandle(Handle {
                        kind: HandleKind::InvokeStatic,
                        owner: SAMPLE_NAME.to_owned(),
                        name: "lambda$run$0".to_owned(),
                        descriptor: "()V".to_owned(),
                        is_interface: false,
                    }),
                    LdcValue::MethodType("()V".to_owned()),
                ],
            )
            .unwrap();
        method.visit_var_insn(ASTORE, 1).unwrap();
        method.visit_insn(RETURN).unwrap();
        method.visit_maxs(1, 2).unwrap();
        method.visit_end().unwrap();
    }

    // Dynamic constant, along with a `double` constant
    {
        let invoke = Handle {
            kind: HandleKind::InvokeStatic,
            owner: "java/lang/invoke/ConstantBootstraps".to_owned(),
            name: "invoke".to_owned(),
            descriptor: "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/Class;Ljava/lang/invoke/MethodHandle;[Ljava/lang/Object;)Ljava/lang/Object;".to_owned(),
            is_interface: false,
        };
        let dynamic = ConstantDynamic {
            name: "_".to_owned(),
            descriptor: "I".to_owned(),
            bootstrap: invoke,
            arguments: vec![LdcValue::Integer(7)],
        };
        let mut method = begin_method(&mut writer, MethodAccessFlags::STATIC, "constant", "()I", &[]);
        method.visit_ldc_insn(&LdcValue::Dynamic(dynamic)).unwrap();
        method.visit_ldc_insn(&LdcValue::Double(1.5)).unwrap();
        method.visit_insn(D2I).unwrap();
        method.visit_insn(IADD).unwrap();
        method.visit_insn(IRETURN).unwrap();
        method.visit_maxs(3, 0).unwrap();
        method.visit_end().unwrap();
    }

    // Wide locals
    {
        let mut method = begin_method(&mut writer, MethodAccessFlags::STATIC, "wide", "()V", &[]);
        method.visit_insn(ICONST_0).unwrap();
        method.visit_var_insn(ISTORE, 300).unwrap();
        method.visit_iinc_insn(300, 1000).unwrap();
        method.visit_insn(RETURN).unwrap();
        method.visit_maxs(1, 301).unwrap();
        method.visit_end().unwrap();
    }

    // No code
    {
        let mut method = writer
            .visit_method(
                MethodAccessFlags::STATIC | MethodAccessFlags::NATIVE,
                "poke",
                "()V",
                &[],
            )
            .unwrap()
            .unwrap();
        method.visit_end().unwrap();
    }

    writer.visit_end().unwrap();
    let bytes = writer.finish().unwrap();
    (writer, bytes)
}

use crate::code::opcodes::*;
use crate::code::Label;

/// Instruction, with symbolic operands
///
/// Constant pool references are resolved to names and values, and bytecode offsets to labels.
/// Opcodes are only those listed for each variant: `iload_0` is `Var { opcode: ILOAD, var: 0 }`
/// with the [`Encoding::Compact`] encoding, and `iload 0` the same with [`Encoding::Explicit`].
#[derive(Debug, Clone, PartialEq)]
pub enum Insn {
    /// Instruction without operands (eg. `iadd`, `areturn`, `athrow`)
    Simple(u8),

    /// `bipush`, `sipush`, or `newarray` (with the array type code as operand)
    Int { opcode: u8, operand: i32 },

    /// Load, store, or `ret` on a local variable
    Var {
        opcode: u8,
        var: u16,
        encoding: Encoding,
    },

    /// `new`, `anewarray`, `checkcast`, or `instanceof`
    ///
    /// The type is an internal name, or an array descriptor.
    Type { opcode: u8, class: String },

    /// `getstatic`, `putstatic`, `getfield`, or `putfield`
    Field {
        opcode: u8,
        owner: String,
        name: String,
        descriptor: String,
    },

    /// `invokevirtual`, `invokespecial`, `invokestatic`, or `invokeinterface`
    Method {
        opcode: u8,
        owner: String,
        name: String,
        descriptor: String,
        is_interface: bool,
    },

    InvokeDynamic {
        name: String,
        descriptor: String,
        bootstrap: Handle,
        arguments: Vec<LdcValue>,
    },

    /// Conditional jumps, `goto`, `jsr`, `goto_w`, and `jsr_w`
    Jump { opcode: u8, target: Label },

    /// `ldc`, `ldc_w`, or `ldc2_w`
    Ldc { value: LdcValue, encoding: Encoding },

    Iinc {
        var: u16,
        increment: i16,
        encoding: Encoding,
    },

    /// Jump to `targets[key - low]` if `low <= key <= high`, else to `default`
    TableSwitch {
        low: i32,
        high: i32,
        default: Label,
        targets: Vec<Label>,
    },

    /// Jump to the label paired with `key`, else to `default`
    LookupSwitch {
        default: Label,
        pairs: Vec<(i32, Label)>,
    },

    MultiANewArray { descriptor: String, dimensions: u8 },
}

impl Insn {
    pub fn opcode(&self) -> u8 {
        match self {
            Insn::Simple(opcode)
            | Insn::Int { opcode, .. }
            | Insn::Var { opcode, .. }
            | Insn::Type { opcode, .. }
            | Insn::Field { opcode, .. }
            | Insn::Method { opcode, .. }
            | Insn::Jump { opcode, .. } => *opcode,
            Insn::InvokeDynamic { .. } => INVOKEDYNAMIC,
            Insn::Ldc { value, .. } if value.is_wide() => LDC2_W,
            Insn::Ldc {
                encoding: Encoding::Compact,
                ..
            } => LDC,
            Insn::Ldc { .. } => LDC_W,
            Insn::Iinc { .. } => IINC,
            Insn::TableSwitch { .. } => TABLESWITCH,
            Insn::LookupSwitch { .. } => LOOKUPSWITCH,
            Insn::MultiANewArray { .. } => MULTIANEWARRAY,
        }
    }

    /// Labels this instruction may transfer control to
    pub fn targets(&self) -> Vec<Label> {
        match self {
            Insn::Jump { target, .. } => vec![*target],
            Insn::TableSwitch {
                default, targets, ..
            } => {
                let mut all = vec![*default];
                all.extend(targets.iter().copied());
                all
            }
            Insn::LookupSwitch { default, pairs } => {
                let mut all = vec![*default];
                all.extend(pairs.iter().map(|(_, label)| *label));
                all
            }
            _ => vec![],
        }
    }

    /// Can execution continue to the next instruction?
    pub fn falls_through(&self) -> bool {
        match self {
            Insn::Simple(opcode) => !is_return(*opcode) && *opcode != ATHROW,
            Insn::Jump { opcode, .. } => !matches!(*opcode, GOTO | GOTO_W),
            Insn::Var { opcode, .. } => *opcode != RET,
            Insn::TableSwitch { .. } | Insn::LookupSwitch { .. } => false,
            _ => true,
        }
    }

    /// Does this instruction end a basic block?
    pub fn ends_block(&self) -> bool {
        !self.falls_through() || matches!(self, Insn::Jump { .. })
    }

    /// Encoding picked for the instruction, if it has a choice of encodings
    pub fn encoding(&self) -> Option<Encoding> {
        match self {
            Insn::Var { encoding, .. } | Insn::Ldc { encoding, .. } | Insn::Iinc { encoding, .. } => {
                Some(*encoding)
            }
            _ => None,
        }
    }
}

/// How a local variable or constant instruction is laid out in the bytecode
///
/// Writers fall back to a longer form whenever the operands don't fit the requested one, so
/// `Compact` for local 300 still gets the `wide` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    /// Shortest form: `iload_2`, `ldc` for the first 256 constants, `wide` only when needed
    #[default]
    Compact,

    /// Opcode followed by its operand even when a shorter form exists: `iload 2`, `ldc_w #7`
    Explicit,

    /// `wide` prefix even when the operands fit in a byte
    Wide,
}

/// Constant loadable with `ldc` (and usable as a bootstrap method argument)
#[derive(Debug, Clone, PartialEq)]
pub enum LdcValue {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),

    /// Internal name or array descriptor
    Class(String),

    /// Method descriptor
    MethodType(String),
    MethodHandle(Handle),
    Dynamic(ConstantDynamic),
}

impl LdcValue {
    /// Does loading the value take two stack slots?
    pub fn is_wide(&self) -> bool {
        match self {
            LdcValue::Long(_) | LdcValue::Double(_) => true,
            LdcValue::Dynamic(dynamic) => matches!(dynamic.descriptor.as_str(), "J" | "D"),
            _ => false,
        }
    }
}

/// Dynamically-computed constant
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantDynamic {
    pub name: String,
    pub descriptor: String,
    pub bootstrap: Handle,
    pub arguments: Vec<LdcValue>,
}

/// Method handle, as used for `invokedynamic` bootstrap methods and `ldc`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
    pub kind: HandleKind,
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub is_interface: bool,
}

/// Method handle kinds
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-5.html#jvms-5.4.3.5
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl HandleKind {
    /// Tag used in `CONSTANT_MethodHandle_info`
    pub fn tag(&self) -> u8 {
        match self {
            HandleKind::GetField => 1,
            HandleKind::GetStatic => 2,
            HandleKind::PutField => 3,
            HandleKind::PutStatic => 4,
            HandleKind::InvokeVirtual => 5,
            HandleKind::InvokeStatic => 6,
            HandleKind::InvokeSpecial => 7,
            HandleKind::NewInvokeSpecial => 8,
            HandleKind::InvokeInterface => 9,
        }
    }

    pub fn from_tag(tag: u8) -> Option<HandleKind> {
        Some(match tag {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_transfer() {
        let label = Label::from_raw(0);
        let goto = Insn::Jump {
            opcode: GOTO,
            target: label,
        };
        let ifeq = Insn::Jump {
            opcode: IFEQ,
            target: label,
        };
        assert!(!goto.falls_through() && goto.ends_block());
        assert!(ifeq.falls_through() && ifeq.ends_block());
        assert!(!Insn::Simple(ATHROW).falls_through());
        assert!(!Insn::Simple(ARETURN).falls_through());
        assert!(!Insn::Simple(IADD).ends_block());
        assert_eq!(ifeq.targets(), vec![label]);

        let goto_w = Insn::Jump {
            opcode: GOTO_W,
            target: label,
        };
        assert!(!goto_w.falls_through() && goto_w.ends_block());
    }

    #[test]
    fn ldc_opcode_follows_width() {
        let ldc = |value: LdcValue, encoding: Encoding| Insn::Ldc { value, encoding }.opcode();
        assert_eq!(ldc(LdcValue::Integer(1), Encoding::Compact), LDC);
        assert_eq!(ldc(LdcValue::Double(1.0), Encoding::Compact), LDC2_W);
        assert_eq!(ldc(LdcValue::String("a".into()), Encoding::Explicit), LDC_W);
        assert_eq!(ldc(LdcValue::Long(1), Encoding::Explicit), LDC2_W);
    }
}

use crate::class_file::ConstantIndex;
use crate::code::Label;
use crate::tree::InsnId;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Fewer bytes remain than the structure being decoded needs
    TruncatedInput {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    /// The file does not start with `0xCAFEBABE`
    BadMagic(u32),

    /// The class file major version is newer than what we know how to decode
    UnsupportedVersion { major: u16, minor: u16 },

    /// Reference to index 0, past the end of the pool, onto the unusable slot after a
    /// `long`/`double`, or onto an entry with the wrong tag
    InvalidConstantIndex {
        index: ConstantIndex,
        expected: &'static str,
    },

    InvalidConstantTag { tag: u8, offset: usize },

    InvalidOpcode { opcode: u8, offset: usize },

    InvalidModifiedUtf8 { offset: usize },

    MalformedDescriptor(String),

    MalformedAttribute {
        name: &'static str,
        reason: String,
    },

    /// The operand stack has two different heights depending on the path taken into a block
    StackDepthMismatch {
        block_start: usize,
        first: usize,
        second: usize,
    },

    /// The constant pool ran out of 16-bit indices
    PoolOverflow { offset: usize },

    /// A relative jump does not fit in the width of its instruction
    OffsetOutOfRange { label: Label, delta: i64 },

    /// Method code exceeds the 65535 bytes the format allows
    CodeTooLarge(usize),

    /// A table with a 16-bit count (fields, methods, attributes) got more than 65535 entries
    TooManyEntries { table: &'static str, count: usize },

    /// A label was referenced in a method but never placed before the method ended
    UnresolvedLabel(Label),

    /// A label was placed a second time
    DoublePlacement(Label),

    /// Tried to read the offset of a label that has not been placed
    NotYetPlaced(Label),

    /// A visit method was called on a writer after `finish`
    AlreadyFinished,

    /// Replay found a reference to a label missing from the instruction list
    DanglingLabelReference(Label),

    /// Instruction handle does not refer to a live node (it was removed)
    NoSuchNode(InsnId),

    IoError(std::io::Error),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TruncatedInput {
                offset,
                needed,
                remaining,
            } => write!(
                f,
                "truncated input at byte {}: needed {} bytes but only {} remain",
                offset, needed, remaining
            ),
            Error::BadMagic(magic) => write!(f, "invalid magic 0x{:08x}", magic),
            Error::UnsupportedVersion { major, minor } => {
                write!(f, "unsupported class file version {}.{}", major, minor)
            }
            Error::InvalidConstantIndex { index, expected } => {
                write!(f, "invalid constant index #{} (expected {})", index.0, expected)
            }
            Error::InvalidConstantTag { tag, offset } => {
                write!(f, "invalid constant tag {} at byte {}", tag, offset)
            }
            Error::InvalidOpcode { opcode, offset } => {
                write!(f, "invalid opcode 0x{:02x} at code offset {}", opcode, offset)
            }
            Error::InvalidModifiedUtf8 { offset } => {
                write!(f, "invalid modified UTF-8 at byte {}", offset)
            }
            Error::MalformedDescriptor(desc) => write!(f, "malformed descriptor '{}'", desc),
            Error::MalformedAttribute { name, reason } => {
                write!(f, "malformed {} attribute: {}", name, reason)
            }
            Error::StackDepthMismatch {
                block_start,
                first,
                second,
            } => write!(
                f,
                "block at instruction {} entered with stack depths {} and {}",
                block_start, first, second
            ),
            Error::PoolOverflow { offset } => {
                write!(f, "constant pool overflow at index {}", offset)
            }
            Error::OffsetOutOfRange { label, delta } => {
                write!(f, "jump to {:?} has out of range offset {}", label, delta)
            }
            Error::CodeTooLarge(len) => write!(f, "method code is too large ({} bytes)", len),
            Error::TooManyEntries { table, count } => {
                write!(f, "{} has {} entries, more than 65535", table, count)
            }
            Error::UnresolvedLabel(label) => write!(f, "label {:?} was never placed", label),
            Error::DoublePlacement(label) => write!(f, "label {:?} placed twice", label),
            Error::NotYetPlaced(label) => write!(f, "label {:?} is not yet placed", label),
            Error::AlreadyFinished => write!(f, "writer is already finished"),
            Error::DanglingLabelReference(label) => {
                write!(f, "label {:?} is referenced but not in the instructions", label)
            }
            Error::NoSuchNode(id) => write!(f, "no instruction node {:?}", id),
            Error::IoError(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

/// Recoverable conditions found during analysis
///
/// These never abort: the analysis picks the conservative outcome and keeps going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A basic block is not reachable from the method entry, so no frame is computed for it
    UnreachableCodeIgnored { block_start: usize },

    /// Two incoming frames disagree on a slot and the slot was widened to `Top`
    InconsistentFrameMerge {
        block_start: usize,
        slot: FrameSlot,
    },
}

/// Position of a value in a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSlot {
    Local(usize),
    Stack(usize),
}

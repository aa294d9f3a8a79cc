//! Symbolic view of method code: labels, instructions, and frames

mod frame;
mod insn;
mod label;
pub mod opcodes;

pub use frame::*;
pub use insn::*;
pub use label::*;

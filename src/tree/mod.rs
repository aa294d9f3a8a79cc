//! Mutable in-memory model of a class
//!
//! A [`ClassNode`] is both a [`ClassVisitor`](crate::visitor::ClassVisitor) (it records the events
//! it receives) and a producer of events (see [`ClassNode::accept`]). In between, the members and
//! instruction lists can be freely edited.

mod class_node;
mod field_node;
mod insn_list;
mod method_node;

pub use class_node::*;
pub use field_node::*;
pub use insn_list::*;
pub use method_node::*;

//! Read, transform, and write JVM class files
//!
//! Everything is built around the structural events of [`visitor`]: a [`reader::ClassReader`]
//! produces them from bytes, a [`writer::ClassWriter`] turns them back into bytes, and a
//! [`tree::ClassNode`] records them into an editable model and replays them later. The
//! [`analysis`] module computes `max_stack`, `max_locals`, and stack map frames for method bodies.
//!
//! ### Simple example
//!
//! Consider the following simple Java class:
//!
//! ```java,ignore,no_run
//! public class Point {
//!     public Point() {
//!         super();
//!     }
//! }
//! ```
//!
//! Generating an analogous class file, then reading it back into a tree, can be done as follows:
//!
//! ```
//! use classweave::class_file::Version;
//! use classweave::code::opcodes::*;
//! use classweave::reader::{ClassReader, ReaderFlags};
//! use classweave::tree::ClassNode;
//! use classweave::visitor::{ClassVisitor, MethodVisitor};
//! use classweave::writer::{ClassWriter, WriterFlags};
//! use classweave::*;
//!
//! # fn generate_class() -> Result<(), Error> {
//! let mut writer = ClassWriter::new(WriterFlags::COMPUTE_MAXS);
//! writer.visit(
//!     Version::JAVA11,
//!     ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
//!     "me/alec/Point",
//!     Some("java/lang/Object"),
//!     &[],
//! )?;
//!
//! // Maximums given to `visit_maxs` are ignored, since the writer computes them
//! if let Some(mut method) = writer.visit_method(MethodAccessFlags::PUBLIC, "<init>", "()V", &[])? {
//!     method.visit_code()?;
//!     method.visit_var_insn(ALOAD, 0)?;
//!     method.visit_method_insn(INVOKESPECIAL, "java/lang/Object", "<init>", "()V", false)?;
//!     method.visit_insn(RETURN)?;
//!     method.visit_maxs(0, 0)?;
//!     method.visit_end()?;
//! }
//! writer.visit_end()?;
//! let class_bytes: Vec<u8> = writer.finish()?;
//!
//! // Read the class back into a tree
//! let mut class = ClassNode::new();
//! ClassReader::new(&class_bytes)?.accept(&mut class, ReaderFlags::empty())?;
//! let constructor = class.find_method("<init>", "()V").expect("constructor");
//! assert_eq!((constructor.max_stack, constructor.max_locals), (1, 1));
//! # Ok(())
//! # }
//! # generate_class().unwrap();
//! ```

mod access_flags;
pub mod analysis;
pub mod class_file;
pub mod code;
mod descriptors;
mod errors;
pub mod reader;
pub mod tree;
pub mod util;
pub mod visitor;
pub mod writer;

pub use access_flags::*;
pub use descriptors::*;
pub use errors::*;

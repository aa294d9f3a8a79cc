//! Decoding class files into structural events
//!
//! [`ClassReader`] validates the header and loads the constant pool up front, then every call
//! to [`ClassReader::accept`] makes a single pass over the rest of the class, resolving pool
//! references as they are encountered and handing events to a [`ClassVisitor`].
//!
//! [`ClassVisitor`]: crate::visitor::ClassVisitor

mod class_reader;
mod code_reader;

pub use class_reader::*;

use bitflags::bitflags;

bitflags! {
    /// Parts of the class the reader should leave out of the events it emits
    #[derive(Default)]
    pub struct ReaderFlags: u8 {
        /// Don't decode method bodies (no `visit_code` or anything after it)
        const SKIP_CODE = 0x01;

        /// Drop `SourceFile`, `LineNumberTable`, `LocalVariableTable`, and
        /// `LocalVariableTypeTable`
        const SKIP_DEBUG = 0x02;

        /// Don't emit `visit_frame` for the `StackMapTable`
        const SKIP_FRAMES = 0x04;
    }
}

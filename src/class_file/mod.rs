//! Low-level pieces of the [`class` file format of the JVM][0]
//!
//! Everything here deals in constant pool indices and raw bytes. The structural event layer
//! ([`crate::visitor`]) sits on top and deals in names and labels instead.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html

mod attribute;
mod bytes;
mod constants;
mod layout;
mod serialize;
mod version;

pub use attribute::*;
pub use bytes::*;
pub use constants::*;
pub use layout::*;
pub use serialize::*;
pub use version::*;

use crate::class_file::{ByteReader, Serialize};
use crate::code::{Handle, HandleKind};
use crate::util::{Offset, OffsetResult, OffsetVec, Width};
use crate::Error;
use byteorder::WriteBytesExt;
use std::collections::HashMap;

/// Class file constants pool
///
/// The pool is append only: indices handed out stay valid for the lifetime of the pool. Every
/// structurally distinct constant is stored exactly once, so asking for the same constant twice
/// returns the same index. Index 0 is never used (the format uses it to mean "absent").
#[derive(Debug, Clone)]
pub struct ConstantsPool {
    constants: OffsetVec<Constant>,
    indices: HashMap<Constant, ConstantIndex>,
}

impl Default for ConstantsPool {
    fn default() -> Self {
        ConstantsPool::new()
    }
}

impl ConstantsPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantsPool {
        ConstantsPool {
            constants: OffsetVec::new_starting_at(Offset(1)),
            indices: HashMap::new(),
        }
    }

    /// Decode the `constant_pool_count` and entries of a class file
    pub fn read(reader: &mut ByteReader) -> Result<ConstantsPool, Error> {
        let count = reader.read_u16()? as usize;
        if count == 0 {
            return Err(Error::MalformedAttribute {
                name: "ClassFile",
                reason: "constant_pool_count is 0".to_owned(),
            });
        }
        let mut pool = ConstantsPool::new();
        while pool.constants.offset_len().0 < count {
            let offset = reader.absolute_position();
            let constant = Constant::read(reader)?;
            let index = ConstantIndex(pool.constants.offset_len().0 as u16);
            if offset_overflows(pool.constants.offset_len().0, constant.width()) {
                return Err(Error::PoolOverflow { offset });
            }
            pool.constants.push(constant.clone());
            pool.indices.entry(constant).or_insert(index);
        }
        Ok(pool)
    }

    /// Number of entries in the pool (`long` and `double` count once)
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Value of `constant_pool_count` in the serialized class file
    pub fn count(&self) -> u16 {
        self.constants.offset_len().0 as u16
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConstantIndex, &Constant)> + '_ {
        self.constants
            .iter()
            .map(|(offset, _, constant)| (ConstantIndex(offset.0 as u16), constant))
    }

    /// Look up a constant by index
    pub fn get(&self, index: ConstantIndex) -> Result<&Constant, Error> {
        match self.constants.get_offset(Offset(index.0 as usize)) {
            OffsetResult::Ok(_, constant) => Ok(constant),
            OffsetResult::InvalidOffset(_) | OffsetResult::TooLarge => {
                Err(Error::InvalidConstantIndex {
                    index,
                    expected: "a constant",
                })
            }
        }
    }

    /// Push a constant into the constant pool, provided there is space for it
    ///
    /// Note: the largest valid index is 65534, indexing starts at 1, and some constants take two
    /// spaces.
    fn push_constant(&mut self, constant: Constant) -> Result<ConstantIndex, Error> {
        let offset = self.constants.offset_len().0;
        if offset_overflows(offset, constant.width()) {
            return Err(Error::PoolOverflow { offset });
        }
        self.constants.push(constant.clone());
        let index = ConstantIndex(offset as u16);
        self.indices.insert(constant, index);
        Ok(index)
    }

    /// Get or insert an already index-resolved constant
    pub fn get_or_insert(&mut self, constant: Constant) -> Result<ConstantIndex, Error> {
        match self.indices.get(&constant) {
            Some(index) => Ok(*index),
            None => self.push_constant(constant),
        }
    }

    /// Get or insert a symbolic constant, interning whatever it refers to first
    pub fn intern(&mut self, entry: &PoolEntry) -> Result<ConstantIndex, Error> {
        match entry {
            PoolEntry::Utf8(string) => Ok(self.get_utf8(string)?.0),
            PoolEntry::Integer(integer) => self.get_or_insert(Constant::Integer(*integer)),
            PoolEntry::Float(float) => self.get_or_insert(Constant::Float(float.to_bits())),
            PoolEntry::Long(long) => self.get_or_insert(Constant::Long(*long)),
            PoolEntry::Double(double) => self.get_or_insert(Constant::Double(double.to_bits())),
            PoolEntry::Class(name) => Ok(self.get_class(name)?.0),
            PoolEntry::String(string) => {
                let utf8 = self.get_utf8(string)?;
                self.get_or_insert(Constant::String(utf8))
            }
            PoolEntry::FieldRef {
                owner,
                name,
                descriptor,
            } => {
                let class = self.get_class(owner)?;
                let name_and_type = self.get_name_and_type(name, descriptor)?;
                self.get_or_insert(Constant::FieldRef(class, name_and_type))
            }
            PoolEntry::MethodRef {
                owner,
                name,
                descriptor,
                is_interface,
            } => {
                let class = self.get_class(owner)?;
                let name_and_type = self.get_name_and_type(name, descriptor)?;
                self.get_or_insert(Constant::MethodRef {
                    class,
                    name_and_type,
                    is_interface: *is_interface,
                })
            }
            PoolEntry::NameAndType { name, descriptor } => {
                Ok(self.get_name_and_type(name, descriptor)?.0)
            }
            PoolEntry::MethodType(descriptor) => {
                let descriptor = self.get_utf8(descriptor)?;
                self.get_or_insert(Constant::MethodType { descriptor })
            }
            PoolEntry::MethodHandle(handle) => {
                let member_entry = match handle.kind {
                    HandleKind::GetField
                    | HandleKind::GetStatic
                    | HandleKind::PutField
                    | HandleKind::PutStatic => PoolEntry::FieldRef {
                        owner: &handle.owner,
                        name: &handle.name,
                        descriptor: &handle.descriptor,
                    },
                    _ => PoolEntry::MethodRef {
                        owner: &handle.owner,
                        name: &handle.name,
                        descriptor: &handle.descriptor,
                        is_interface: handle.is_interface,
                    },
                };
                let member = self.intern(&member_entry)?;
                self.get_or_insert(Constant::MethodHandle {
                    handle_kind: handle.kind,
                    member,
                })
            }
            PoolEntry::Dynamic {
                bootstrap_method,
                name,
                descriptor,
            } => {
                let name_and_type = self.get_name_and_type(name, descriptor)?;
                self.get_or_insert(Constant::Dynamic {
                    bootstrap_method: *bootstrap_method,
                    name_and_type,
                })
            }
            PoolEntry::InvokeDynamic {
                bootstrap_method,
                name,
                descriptor,
            } => {
                let name_and_type = self.get_name_and_type(name, descriptor)?;
                self.get_or_insert(Constant::InvokeDynamic {
                    bootstrap_method: *bootstrap_method,
                    name_and_type,
                })
            }
        }
    }

    /// Get or insert a utf8 constant from the constant pool
    pub fn get_utf8(&mut self, utf8: &str) -> Result<Utf8ConstantIndex, Error> {
        let key = Constant::Utf8(utf8.to_owned());
        Ok(Utf8ConstantIndex(self.get_or_insert(key)?))
    }

    /// Get or insert a class constant from the constant pool
    pub fn get_class(&mut self, name: &str) -> Result<ClassConstantIndex, Error> {
        let utf8 = self.get_utf8(name)?;
        Ok(ClassConstantIndex(self.get_or_insert(Constant::Class(utf8))?))
    }

    /// Get or insert a name & type constant from the constant pool
    pub fn get_name_and_type(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> Result<NameAndTypeConstantIndex, Error> {
        let name = self.get_utf8(name)?;
        let descriptor = self.get_utf8(descriptor)?;
        let constant = Constant::NameAndType { name, descriptor };
        Ok(NameAndTypeConstantIndex(self.get_or_insert(constant)?))
    }

    /// Resolve a reference which must point at a `CONSTANT_Utf8_info`
    pub fn utf8_at(&self, index: u16) -> Result<&str, Error> {
        match self.get(ConstantIndex(index)) {
            Ok(Constant::Utf8(string)) => Ok(string),
            _ => Err(Error::InvalidConstantIndex {
                index: ConstantIndex(index),
                expected: "Utf8",
            }),
        }
    }

    /// Resolve a reference which must point at a `CONSTANT_Class_info`
    pub fn class_at(&self, index: u16) -> Result<&str, Error> {
        match self.get(ConstantIndex(index)) {
            Ok(Constant::Class(name)) => self.utf8_at(name.0 .0),
            _ => Err(Error::InvalidConstantIndex {
                index: ConstantIndex(index),
                expected: "Class",
            }),
        }
    }

    /// Resolve an optional class reference, where 0 means "none"
    pub fn optional_class_at(&self, index: u16) -> Result<Option<&str>, Error> {
        if index == 0 {
            Ok(None)
        } else {
            self.class_at(index).map(Some)
        }
    }

    /// Resolve a reference which must point at a `CONSTANT_NameAndType_info`
    pub fn name_and_type_at(&self, index: u16) -> Result<(&str, &str), Error> {
        match self.get(ConstantIndex(index)) {
            Ok(Constant::NameAndType { name, descriptor }) => {
                Ok((self.utf8_at(name.0 .0)?, self.utf8_at(descriptor.0 .0)?))
            }
            _ => Err(Error::InvalidConstantIndex {
                index: ConstantIndex(index),
                expected: "NameAndType",
            }),
        }
    }

    /// Resolve a field reference into its owner, name and descriptor
    pub fn field_ref_at(&self, index: u16) -> Result<(&str, &str, &str), Error> {
        match self.get(ConstantIndex(index)) {
            Ok(Constant::FieldRef(class, name_and_type)) => {
                let owner = self.class_at(class.0 .0)?;
                let (name, descriptor) = self.name_and_type_at(name_and_type.0 .0)?;
                Ok((owner, name, descriptor))
            }
            _ => Err(Error::InvalidConstantIndex {
                index: ConstantIndex(index),
                expected: "Fieldref",
            }),
        }
    }

    /// Resolve a method reference into its owner, name, descriptor, and whether the owner is an
    /// interface
    pub fn method_ref_at(&self, index: u16) -> Result<(&str, &str, &str, bool), Error> {
        match self.get(ConstantIndex(index)) {
            Ok(Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            }) => {
                let owner = self.class_at(class.0 .0)?;
                let (name, descriptor) = self.name_and_type_at(name_and_type.0 .0)?;
                Ok((owner, name, descriptor, *is_interface))
            }
            _ => Err(Error::InvalidConstantIndex {
                index: ConstantIndex(index),
                expected: "Methodref",
            }),
        }
    }

    /// Resolve a method handle into its symbolic form
    pub fn handle_at(&self, index: u16) -> Result<Handle, Error> {
        match self.get(ConstantIndex(index)) {
            Ok(Constant::MethodHandle {
                handle_kind,
                member,
            }) => {
                let (owner, name, descriptor, is_interface) = match self.get(*member)? {
                    Constant::FieldRef(..) => {
                        let (owner, name, descriptor) = self.field_ref_at(member.0)?;
                        (owner, name, descriptor, false)
                    }
                    _ => self.method_ref_at(member.0)?,
                };
                Ok(Handle {
                    kind: *handle_kind,
                    owner: owner.to_owned(),
                    name: name.to_owned(),
                    descriptor: descriptor.to_owned(),
                    is_interface,
                })
            }
            _ => Err(Error::InvalidConstantIndex {
                index: ConstantIndex(index),
                expected: "MethodHandle",
            }),
        }
    }
}

impl Serialize for ConstantsPool {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.count().serialize(writer)?;
        for (_, _, constant) in self.constants.iter() {
            constant.serialize(writer)?;
        }
        Ok(())
    }
}

fn offset_overflows(offset: usize, width: usize) -> bool {
    offset + width > u16::MAX as usize
}

/// Symbolic constant, as seen by code building a class
///
/// Interning one of these into a [`ConstantsPool`] recursively interns the constants it refers to
/// (eg. a field reference needs a class and a name & type).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PoolEntry<'a> {
    Utf8(&'a str),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(&'a str),
    String(&'a str),
    FieldRef {
        owner: &'a str,
        name: &'a str,
        descriptor: &'a str,
    },
    MethodRef {
        owner: &'a str,
        name: &'a str,
        descriptor: &'a str,
        is_interface: bool,
    },
    NameAndType {
        name: &'a str,
        descriptor: &'a str,
    },
    MethodType(&'a str),
    MethodHandle(&'a Handle),
    Dynamic {
        bootstrap_method: u16,
        name: &'a str,
        descriptor: &'a str,
    },
    InvokeDynamic {
        bootstrap_method: u16,
        name: &'a str,
        descriptor: &'a str,
    },
}

/// Constants as in the constant pool
///
/// Floating point values are kept as their raw IEEE 754 bits so that NaN payloads survive and
/// constants can be hashed.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Field
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// Method (this combines `Methodref` and `InterfaceMethodref`)
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    Integer(i32),

    /// Bits of an `f32`
    Float(u32),

    Long(i64),

    /// Bits of an `f64`
    Double(u64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (see [`encode_modified_utf8`]).
    Utf8(String),

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle {
        handle_kind: HandleKind,

        /// `FieldRef` for field handles and `MethodRef` for the rest
        member: ConstantIndex,
    },

    /// Method type
    MethodType { descriptor: Utf8ConstantIndex },

    /// Dynamically-computed constant
    Dynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    Module(Utf8ConstantIndex),

    Package(Utf8ConstantIndex),
}

impl Constant {
    fn read(reader: &mut ByteReader) -> Result<Constant, Error> {
        let offset = reader.absolute_position();
        let tag = reader.read_u8()?;
        let utf8 = |reader: &mut ByteReader| -> Result<Utf8ConstantIndex, Error> {
            Ok(Utf8ConstantIndex(ConstantIndex(reader.read_u16()?)))
        };
        let class = |reader: &mut ByteReader| -> Result<ClassConstantIndex, Error> {
            Ok(ClassConstantIndex(ConstantIndex(reader.read_u16()?)))
        };
        let name_and_type = |reader: &mut ByteReader| -> Result<NameAndTypeConstantIndex, Error> {
            Ok(NameAndTypeConstantIndex(ConstantIndex(reader.read_u16()?)))
        };
        Ok(match tag {
            1 => {
                let len = reader.read_u16()? as usize;
                let start = reader.absolute_position();
                let bytes = reader.read_bytes(len)?;
                Constant::Utf8(decode_modified_utf8(bytes, start)?)
            }
            3 => Constant::Integer(reader.read_i32()?),
            4 => Constant::Float(reader.read_u32()?),
            5 => Constant::Long(reader.read_u64()? as i64),
            6 => Constant::Double(reader.read_u64()?),
            7 => Constant::Class(utf8(reader)?),
            8 => Constant::String(utf8(reader)?),
            9 => Constant::FieldRef(class(reader)?, name_and_type(reader)?),
            10 | 11 => Constant::MethodRef {
                class: class(reader)?,
                name_and_type: name_and_type(reader)?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: utf8(reader)?,
                descriptor: utf8(reader)?,
            },
            15 => {
                let kind = reader.read_u8()?;
                let handle_kind = HandleKind::from_tag(kind)
                    .ok_or(Error::InvalidConstantTag { tag: kind, offset })?;
                Constant::MethodHandle {
                    handle_kind,
                    member: ConstantIndex(reader.read_u16()?),
                }
            }
            16 => Constant::MethodType {
                descriptor: utf8(reader)?,
            },
            17 => Constant::Dynamic {
                bootstrap_method: reader.read_u16()?,
                name_and_type: name_and_type(reader)?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: reader.read_u16()?,
                name_and_type: name_and_type(reader)?,
            },
            19 => Constant::Module(utf8(reader)?),
            20 => Constant::Package(utf8(reader)?),
            _ => return Err(Error::InvalidConstantTag { tag, offset }),
        })
    }
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Constant::Utf8(string) => {
                1u8.serialize(writer)?;
                let buffer: Vec<u8> = encode_modified_utf8(string);
                (buffer.len() as u16).serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::Integer(integer) => {
                3u8.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(bits) => {
                4u8.serialize(writer)?;
                bits.serialize(writer)?;
            }
            Constant::Long(long) => {
                5u8.serialize(writer)?;
                long.serialize(writer)?;
            }
            Constant::Double(bits) => {
                6u8.serialize(writer)?;
                bits.serialize(writer)?;
            }
            Constant::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(bytes) => {
                8u8.serialize(writer)?;
                bytes.serialize(writer)?;
            }
            Constant::FieldRef(class, name_and_type) => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                (if !is_interface { 10u8 } else { 11u8 }).serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                15u8.serialize(writer)?;
                handle_kind.tag().serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::MethodType { descriptor } => {
                16u8.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                17u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => {
                18u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::Module(name) => {
                19u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::Package(name) => {
                20u8.serialize(writer)?;
                name.serialize(writer)?;
            }
        };
        Ok(())
    }
}

/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double` (JVMS
/// §4.4.5):
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2. The constant_pool
/// > index n+1 must be valid but is considered unusable.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// Working through UTF-16 code units gets the surrogate pairs for free.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = Vec::with_capacity(string.len());
    for unit in string.encode_utf16() {
        match unit {
            0x0001..=0x007F => buffer.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                buffer.push((unit >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((unit & 0x3F) as u8 | 0b1000_0000);
            }
            _ => {
                buffer.push((unit >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((unit >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((unit & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Inverse of [`encode_modified_utf8`]
///
/// `offset` is the position of `bytes` in the class file (used for error reporting only).
pub fn decode_modified_utf8(bytes: &[u8], offset: usize) -> Result<String, Error> {
    let invalid = |at: usize| Error::InvalidModifiedUtf8 { offset: offset + at };
    let continuation = |at: usize| -> Result<u16, Error> {
        match bytes.get(at) {
            Some(byte) if byte & 0b1100_0000 == 0b1000_0000 => Ok((byte & 0x3F) as u16),
            _ => Err(invalid(at)),
        }
    };

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let byte = bytes[i];
        if byte & 0b1000_0000 == 0 {
            units.push(byte as u16);
            i += 1;
        } else if byte & 0b1110_0000 == 0b1100_0000 {
            units.push(((byte & 0x1F) as u16) << 6 | continuation(i + 1)?);
            i += 2;
        } else if byte & 0b1111_0000 == 0b1110_0000 {
            units.push(
                ((byte & 0x0F) as u16) << 12 | continuation(i + 1)? << 6 | continuation(i + 2)?,
            );
            i += 3;
        } else {
            return Err(invalid(i));
        }
    }
    String::from_utf16(&units).map_err(|_| invalid(0))
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug, PartialOrd, Ord)]
pub struct ConstantIndex(pub u16);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct Utf8ConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct NameAndTypeConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ClassConstantIndex(pub ConstantIndex);

impl From<Utf8ConstantIndex> for ConstantIndex {
    fn from(index: Utf8ConstantIndex) -> ConstantIndex {
        index.0
    }
}
impl From<NameAndTypeConstantIndex> for ConstantIndex {
    fn from(index: NameAndTypeConstantIndex) -> ConstantIndex {
        index.0
    }
}
impl From<ClassConstantIndex> for ConstantIndex {
    fn from(index: ClassConstantIndex) -> ConstantIndex {
        index.0
    }
}

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}
impl Serialize for Utf8ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}
impl Serialize for NameAndTypeConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}
impl Serialize for ClassConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

#[cfg(test)]
mod encode_modified_utf8_tests {
    use super::*;

    #[test]
    fn containing_null_byte() {
        assert_eq!(encode_modified_utf8("a\x00a"), vec![97, 192, 128, 97]);
    }

    #[test]
    fn simple_ascii() {
        assert_eq!(encode_modified_utf8("foo"), vec![102, 111, 111]);
        assert_eq!(
            encode_modified_utf8("hel10_World"),
            vec![104, 101, 108, 49, 48, 95, 87, 111, 114, 108, 100]
        );
    }

    #[test]
    fn two_and_three_byte_encodings() {
        assert_eq!(
            encode_modified_utf8("ĄǍǞǠǺȀȂȦȺӐӒ"),
            vec![
                196, 132, 199, 141, 199, 158, 199, 160, 199, 186, 200, 128, 200, 130, 200, 166,
                200, 186, 211, 144, 211, 146
            ]
        );
        assert_eq!(
            encode_modified_utf8("ऄअॲঅਅઅଅஅఅಅഅะະ༁ཨ"),
            vec![
                224, 164, 132, 224, 164, 133, 224, 165, 178, 224, 166, 133, 224, 168, 133, 224,
                170, 133, 224, 172, 133, 224, 174, 133, 224, 176, 133, 224, 178, 133, 224, 180,
                133, 224, 184, 176, 224, 186, 176, 224, 188, 129, 224, 189, 168
            ]
        );
    }

    #[test]
    fn supplementary_characters() {
        assert_eq!(
            encode_modified_utf8("\u{10000}\u{dffff}\u{10FFFF}"),
            vec![
                237, 160, 128, 237, 176, 128, 237, 172, 191, 237, 191, 191, 237, 175, 191, 237,
                191, 191
            ]
        );
    }

    #[test]
    fn decoding_inverts_encoding() {
        for s in ["", "a\x00a", "ऄअॲঅ", "\u{10000}\u{dffff}\u{10FFFF}", "java/lang/Object"] {
            assert_eq!(decode_modified_utf8(&encode_modified_utf8(s), 0).unwrap(), s);
        }
    }

    #[test]
    fn decoding_rejects_bad_continuation() {
        assert!(matches!(
            decode_modified_utf8(&[97, 0xC4, 0x41], 10),
            Err(Error::InvalidModifiedUtf8 { offset: 12 })
        ));
    }
}

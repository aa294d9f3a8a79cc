use crate::class_file::{
    ByteReader, ClassConstantIndex, ConstantIndex, Deserialize, Serialize, Utf8ConstantIndex,
};
use crate::util::Width;
use crate::Error;
use byteorder::WriteBytesExt;

/// Attributes (used in classes, fields, methods, and even on some attributes)
///
/// This is the raw form, with the name still an index into the constant pool. Attributes that
/// aren't understood are carried around as-is, so they can be re-emitted unchanged.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute {
    pub name_index: Utf8ConstantIndex,
    pub info: Vec<u8>,
}

impl Serialize for RawAttribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name_index.serialize(writer)?;

        // Attribute info length is 4 bytes
        (self.info.len() as u32).serialize(writer)?;
        writer.write_all(&self.info)?;

        Ok(())
    }
}

/// Attribute as it appears in structural events: resolved name, opaque payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub data: Vec<u8>,
}

/// Attributes are all stored in the same way (see `RawAttribute`), but internally they represent
/// very different things. This trait is implemented by things which can be turned into
/// attributes.
pub trait AttributeLike: Serialize + Deserialize {
    /// Name of the attribute
    const NAME: &'static str;

    /// Decode the attribute from its `info` bytes, requiring all of them to be consumed
    fn parse(mut reader: ByteReader<'_>) -> Result<Self, Error> {
        let attribute = Self::deserialize(&mut reader).map_err(|err| match err {
            Error::TruncatedInput { .. } => Error::MalformedAttribute {
                name: Self::NAME,
                reason: err.to_string(),
            },
            other => other,
        })?;
        if !reader.is_empty() {
            return Err(Error::MalformedAttribute {
                name: Self::NAME,
                reason: format!("{} trailing bytes", reader.remaining()),
            });
        }
        Ok(attribute)
    }

    /// Encode the attribute's `info` bytes
    fn to_info(&self) -> Vec<u8> {
        let mut info = vec![];
        // Writing into a `Vec` never fails
        let _ = self.serialize(&mut info);
        info
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantValue(pub ConstantIndex);

impl Serialize for ConstantValue {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for ConstantValue {
    fn deserialize(reader: &mut ByteReader<'_>) -> Result<Self, Error> {
        Ok(ConstantValue(ConstantIndex(reader.read_u16()?)))
    }
}

impl AttributeLike for ConstantValue {
    const NAME: &'static str = "ConstantValue";
}

/// Entry in the exception table of a `Code` attribute
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.3
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of exception handler range (inclusive)
    pub start_pc: u16,

    /// End of exception handler range (exclusive)
    pub end_pc: u16,

    /// Start of the exception handler
    pub handler_pc: u16,

    /// Class of exceptions caught, or 0 to catch everything
    pub catch_type: u16,
}

impl Serialize for ExceptionHandler {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.end_pc.serialize(writer)?;
        self.handler_pc.serialize(writer)?;
        self.catch_type.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for ExceptionHandler {
    fn deserialize(reader: &mut ByteReader<'_>) -> Result<Self, Error> {
        Ok(ExceptionHandler {
            start_pc: reader.read_u16()?,
            end_pc: reader.read_u16()?,
            handler_pc: reader.read_u16()?,
            catch_type: reader.read_u16()?,
        })
    }
}

/// Checked exceptions a method declares
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.5
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exceptions(pub Vec<u16>);

impl Serialize for Exceptions {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for Exceptions {
    fn deserialize(reader: &mut ByteReader<'_>) -> Result<Self, Error> {
        Ok(Exceptions(Vec::deserialize(reader)?))
    }
}

impl AttributeLike for Exceptions {
    const NAME: &'static str = "Exceptions";
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.10
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceFile(pub Utf8ConstantIndex);

impl Serialize for SourceFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for SourceFile {
    fn deserialize(reader: &mut ByteReader<'_>) -> Result<Self, Error> {
        Ok(SourceFile(Utf8ConstantIndex(ConstantIndex(
            reader.read_u16()?,
        ))))
    }
}

impl AttributeLike for SourceFile {
    const NAME: &'static str = "SourceFile";
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.12
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineNumberTable(pub Vec<LineNumber>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: u16,
    pub line_number: u16,
}

impl Serialize for LineNumberTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for LineNumberTable {
    fn deserialize(reader: &mut ByteReader<'_>) -> Result<Self, Error> {
        Ok(LineNumberTable(Vec::deserialize(reader)?))
    }
}

impl AttributeLike for LineNumberTable {
    const NAME: &'static str = "LineNumberTable";
}

impl Serialize for LineNumber {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.line_number.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for LineNumber {
    fn deserialize(reader: &mut ByteReader<'_>) -> Result<Self, Error> {
        Ok(LineNumber {
            start_pc: reader.read_u16()?,
            line_number: reader.read_u16()?,
        })
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.13
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableTable(pub Vec<LocalVariable>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: u16,
    pub length: u16,
    pub name: Utf8ConstantIndex,
    pub descriptor: Utf8ConstantIndex,
    pub index: u16,
}

impl Serialize for LocalVariableTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for LocalVariableTable {
    fn deserialize(reader: &mut ByteReader<'_>) -> Result<Self, Error> {
        Ok(LocalVariableTable(Vec::deserialize(reader)?))
    }
}

impl AttributeLike for LocalVariableTable {
    const NAME: &'static str = "LocalVariableTable";
}

impl Serialize for LocalVariable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.length.serialize(writer)?;
        self.name.serialize(writer)?;
        self.descriptor.serialize(writer)?;
        self.index.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for LocalVariable {
    fn deserialize(reader: &mut ByteReader<'_>) -> Result<Self, Error> {
        Ok(LocalVariable {
            start_pc: reader.read_u16()?,
            length: reader.read_u16()?,
            name: Utf8ConstantIndex(ConstantIndex(reader.read_u16()?)),
            descriptor: Utf8ConstantIndex(ConstantIndex(reader.read_u16()?)),
            index: reader.read_u16()?,
        })
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.4
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackMapTable(pub Vec<StackMapFrame>);

impl AttributeLike for StackMapTable {
    const NAME: &'static str = "StackMapTable";
}

impl Serialize for StackMapTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for StackMapTable {
    fn deserialize(reader: &mut ByteReader<'_>) -> Result<Self, Error> {
        Ok(StackMapTable(Vec::deserialize(reader)?))
    }
}

/// Verification type of a slot, in the form stored in a `StackMapTable`
pub type RawVerificationType = VerificationType<ClassConstantIndex, u16>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackMapFrame {
    /// Frame has the same locals as the previous frame and number of stack items is zero
    /// Tags: 0-63 or 251
    SameLocalsNoStack { offset_delta: u16 },

    /// Frame has the same locals as the previous frame and number of stack items is one
    /// Tags: 64-127 or 247
    SameLocalsOneStack {
        offset_delta: u16,
        stack: RawVerificationType,
    },

    /// Frame is like the previous frame, but without the last `chopped_k` locals
    ///
    /// Note: `chopped_k` must be in the range 1 to 3 inclusive
    /// Tags: 248-250
    ChopLocalsNoStack { offset_delta: u16, chopped_k: u8 },

    /// Frame is like the previous frame, but with extra locals
    /// Tags: 252-254
    AppendLocalsNoStack {
        offset_delta: u16,
        locals: Vec<RawVerificationType>,
    },

    /// Frame has exactly the locals and stack specified
    /// Tag: 255
    Full {
        offset_delta: u16,
        locals: Vec<RawVerificationType>,
        stack: Vec<RawVerificationType>,
    },
}

impl StackMapFrame {
    pub fn offset_delta(&self) -> u16 {
        match self {
            StackMapFrame::SameLocalsNoStack { offset_delta }
            | StackMapFrame::SameLocalsOneStack { offset_delta, .. }
            | StackMapFrame::ChopLocalsNoStack { offset_delta, .. }
            | StackMapFrame::AppendLocalsNoStack { offset_delta, .. }
            | StackMapFrame::Full { offset_delta, .. } => *offset_delta,
        }
    }
}

impl Serialize for StackMapFrame {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            // `same_frame` and `same_frame_extended`
            StackMapFrame::SameLocalsNoStack { offset_delta } => {
                if *offset_delta <= 63 {
                    (*offset_delta as u8).serialize(writer)?;
                } else {
                    251u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
            }

            // `same_locals_1_stack_item_frame` and `same_locals_1_stack_item_frame_extended`
            StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack,
            } => {
                if *offset_delta <= 63 {
                    (*offset_delta as u8 + 64).serialize(writer)?;
                } else {
                    247u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
                stack.serialize(writer)?;
            }

            // `chop_frame`
            StackMapFrame::ChopLocalsNoStack {
                offset_delta,
                chopped_k,
            } => {
                (251 - chopped_k).serialize(writer)?;
                offset_delta.serialize(writer)?;
            }

            // `append_frame`
            StackMapFrame::AppendLocalsNoStack {
                offset_delta,
                locals,
            } => {
                (251 + locals.len() as u8).serialize(writer)?;
                offset_delta.serialize(writer)?;
                for local in locals {
                    local.serialize(writer)?;
                }
            }

            // `full_frame`
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => {
                255u8.serialize(writer)?;
                offset_delta.serialize(writer)?;
                locals.serialize(writer)?;
                stack.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Deserialize for StackMapFrame {
    fn deserialize(reader: &mut ByteReader<'_>) -> Result<Self, Error> {
        let tag = reader.read_u8()?;
        Ok(match tag {
            0..=63 => StackMapFrame::SameLocalsNoStack {
                offset_delta: tag as u16,
            },
            64..=127 => StackMapFrame::SameLocalsOneStack {
                offset_delta: tag as u16 - 64,
                stack: VerificationType::deserialize(reader)?,
            },
            247 => StackMapFrame::SameLocalsOneStack {
                offset_delta: reader.read_u16()?,
                stack: VerificationType::deserialize(reader)?,
            },
            248..=250 => StackMapFrame::ChopLocalsNoStack {
                offset_delta: reader.read_u16()?,
                chopped_k: 251 - tag,
            },
            251 => StackMapFrame::SameLocalsNoStack {
                offset_delta: reader.read_u16()?,
            },
            252..=254 => {
                let offset_delta = reader.read_u16()?;
                let mut locals = vec![];
                for _ in 0..(tag - 251) {
                    locals.push(VerificationType::deserialize(reader)?);
                }
                StackMapFrame::AppendLocalsNoStack {
                    offset_delta,
                    locals,
                }
            }
            255 => StackMapFrame::Full {
                offset_delta: reader.read_u16()?,
                locals: Vec::deserialize(reader)?,
                stack: Vec::deserialize(reader)?,
            },
            _ => {
                return Err(Error::MalformedAttribute {
                    name: StackMapTable::NAME,
                    reason: format!("reserved frame type {}", tag),
                })
            }
        })
    }
}

/// These types are from [this hierarchy][0]
///
/// The class and uninitialized payloads are generic: in the class file they are a class constant
/// and a bytecode offset, in structural events they are a class name and a label.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType<Cls, U> {
    /// Unusable slot (unset local, second half of a wide value, or a merge of conflicting types)
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,

    /// In the constructor, the `this` parameter starts with this type then turns into an object
    /// type after `<init>` is called
    UninitializedThis,

    /// Object type
    Object(Cls),

    /// State of an object after `new` has been called but `<init>` has not been called. The
    /// payload identifies the `new` instruction.
    Uninitialized(U),
}

impl<Cls, U> VerificationType<Cls, U> {
    /// Is this type is a reference type?
    pub fn is_reference(&self) -> bool {
        match self {
            VerificationType::Top
            | VerificationType::Integer
            | VerificationType::Float
            | VerificationType::Double
            | VerificationType::Long => false,

            VerificationType::Null
            | VerificationType::UninitializedThis
            | VerificationType::Object(_)
            | VerificationType::Uninitialized(_) => true,
        }
    }

    /// Convert the class and uninitialized payloads
    pub fn try_map<Cls2, U2, E>(
        &self,
        map_class: impl FnOnce(&Cls) -> Result<Cls2, E>,
        map_uninitialized: impl FnOnce(&U) -> Result<U2, E>,
    ) -> Result<VerificationType<Cls2, U2>, E> {
        Ok(match self {
            VerificationType::Top => VerificationType::Top,
            VerificationType::Integer => VerificationType::Integer,
            VerificationType::Float => VerificationType::Float,
            VerificationType::Double => VerificationType::Double,
            VerificationType::Long => VerificationType::Long,
            VerificationType::Null => VerificationType::Null,
            VerificationType::UninitializedThis => VerificationType::UninitializedThis,
            VerificationType::Object(cls) => VerificationType::Object(map_class(cls)?),
            VerificationType::Uninitialized(u) => {
                VerificationType::Uninitialized(map_uninitialized(u)?)
            }
        })
    }
}

impl Serialize for RawVerificationType {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            VerificationType::Top => 0u8.serialize(writer)?,
            VerificationType::Integer => 1u8.serialize(writer)?,
            VerificationType::Float => 2u8.serialize(writer)?,
            VerificationType::Double => 3u8.serialize(writer)?,
            VerificationType::Long => 4u8.serialize(writer)?,
            VerificationType::Null => 5u8.serialize(writer)?,
            VerificationType::UninitializedThis => 6u8.serialize(writer)?,
            VerificationType::Object(cls) => {
                7u8.serialize(writer)?;
                cls.serialize(writer)?;
            }
            VerificationType::Uninitialized(off) => {
                8u8.serialize(writer)?;
                off.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Deserialize for RawVerificationType {
    fn deserialize(reader: &mut ByteReader<'_>) -> Result<Self, Error> {
        let tag = reader.read_u8()?;
        Ok(match tag {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object(ClassConstantIndex(ConstantIndex(reader.read_u16()?))),
            8 => VerificationType::Uninitialized(reader.read_u16()?),
            _ => {
                return Err(Error::MalformedAttribute {
                    name: StackMapTable::NAME,
                    reason: format!("invalid verification type tag {}", tag),
                })
            }
        })
    }
}

impl<Cls, A> Width for VerificationType<Cls, A> {
    fn width(&self) -> usize {
        match self {
            VerificationType::Double | VerificationType::Long => 2,
            _ => 1,
        }
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.23
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapMethods(pub Vec<BootstrapMethod>);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BootstrapMethod {
    pub bootstrap_method: ConstantIndex,
    pub bootstrap_arguments: Vec<ConstantIndex>,
}

impl AttributeLike for BootstrapMethods {
    const NAME: &'static str = "BootstrapMethods";
}

impl Serialize for BootstrapMethods {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for BootstrapMethods {
    fn deserialize(reader: &mut ByteReader<'_>) -> Result<Self, Error> {
        Ok(BootstrapMethods(Vec::deserialize(reader)?))
    }
}

impl Serialize for BootstrapMethod {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.bootstrap_method.serialize(writer)?;
        self.bootstrap_arguments.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for BootstrapMethod {
    fn deserialize(reader: &mut ByteReader<'_>) -> Result<Self, Error> {
        let bootstrap_method = ConstantIndex(reader.read_u16()?);
        let arguments: Vec<u16> = Vec::deserialize(reader)?;
        Ok(BootstrapMethod {
            bootstrap_method,
            bootstrap_arguments: arguments.into_iter().map(ConstantIndex).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_frame_encodings() {
        let frames = StackMapTable(vec![
            StackMapFrame::SameLocalsNoStack { offset_delta: 3 },
            StackMapFrame::SameLocalsNoStack { offset_delta: 300 },
            StackMapFrame::SameLocalsOneStack {
                offset_delta: 2,
                stack: VerificationType::Integer,
            },
            StackMapFrame::ChopLocalsNoStack {
                offset_delta: 1,
                chopped_k: 2,
            },
            StackMapFrame::AppendLocalsNoStack {
                offset_delta: 4,
                locals: vec![VerificationType::Long, VerificationType::Top],
            },
        ]);
        let info = frames.to_info();
        assert_eq!(
            info,
            vec![0, 5, 3, 251, 1, 44, 66, 1, 249, 0, 1, 253, 0, 4, 4, 0]
        );
        assert_eq!(StackMapTable::parse(ByteReader::new(&info)).unwrap(), frames);
    }

    #[test]
    fn full_frame_with_objects() {
        let frame = StackMapFrame::Full {
            offset_delta: 10,
            locals: vec![
                VerificationType::Object(ClassConstantIndex(ConstantIndex(7))),
                VerificationType::Uninitialized(4),
            ],
            stack: vec![VerificationType::UninitializedThis],
        };
        let mut bytes = vec![];
        frame.serialize(&mut bytes).unwrap();
        assert_eq!(bytes, vec![255, 0, 10, 0, 2, 7, 0, 7, 8, 0, 4, 0, 1, 6]);
        assert_eq!(
            StackMapFrame::deserialize(&mut ByteReader::new(&bytes)).unwrap(),
            frame
        );
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        assert!(matches!(
            SourceFile::parse(ByteReader::new(&[0, 1, 0])),
            Err(Error::MalformedAttribute { name: "SourceFile", .. })
        ));
        assert!(matches!(
            ConstantValue::parse(ByteReader::new(&[0])),
            Err(Error::MalformedAttribute {
                name: "ConstantValue",
                ..
            })
        ));
    }
}

//! Field and method descriptors
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.3

use crate::util::Width;
use crate::Error;
use std::iter::Peekable;
use std::str::Chars;

/// Utility trait for converting descriptors to and from string representations
pub trait RenderDescriptor {
    /// Turn the descriptor into a string
    fn render(&self) -> String {
        let mut string = String::new();
        self.render_to(&mut string);
        string
    }

    /// Write the descriptor to a string
    fn render_to(&self, write_to: &mut String);
}

pub trait ParseDescriptor: Sized {
    /// Parse a descriptor from a string
    fn parse(source: &str) -> Result<Self, Error> {
        let mut chars = source.chars().peekable();
        let malformed = |msg: String| Error::MalformedDescriptor(format!("{}: {}", source, msg));
        let ret = Self::parse_from(&mut chars).map_err(malformed)?;
        match chars.next() {
            None => Ok(ret),
            Some(c) => Err(malformed(format!("unexpected leftover input '{}'", c))),
        }
    }

    /// Read the descriptor from a character buffer
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, String>;
}

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl Width for BaseType {
    fn width(&self) -> usize {
        match self {
            BaseType::Byte
            | BaseType::Char
            | BaseType::Float
            | BaseType::Int
            | BaseType::Short
            | BaseType::Boolean => 1,
            BaseType::Double | BaseType::Long => 2,
        }
    }
}

impl RenderDescriptor for BaseType {
    fn render_to(&self, write_to: &mut String) {
        let c = match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        };
        write_to.push(c);
    }
}

impl ParseDescriptor for BaseType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, String> {
        let typ = match source.next() {
            Some('B') => BaseType::Byte,
            Some('C') => BaseType::Char,
            Some('D') => BaseType::Double,
            Some('F') => BaseType::Float,
            Some('I') => BaseType::Int,
            Some('J') => BaseType::Long,
            Some('S') => BaseType::Short,
            Some('Z') => BaseType::Boolean,
            Some(c) => return Err(format!("invalid base type character '{}'", c)),
            None => return Err("missing base type character".to_owned()),
        };
        Ok(typ)
    }
}

/// Reference type
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum RefType {
    /// Class or interface, by internal name (eg. `java/lang/Object`)
    Object(String),

    /// Array with the given element type
    Array(Box<FieldType>),
}

impl RefType {
    /// Name used for this type in instruction operands and stack map frames
    ///
    /// This is the internal name for classes and the descriptor for arrays (`[I`,
    /// `[Ljava/lang/String;`).
    pub fn internal_name(&self) -> String {
        match self {
            RefType::Object(name) => name.clone(),
            RefType::Array(_) => self.render(),
        }
    }

    /// Inverse of [`RefType::internal_name`]
    pub fn from_internal_name(name: &str) -> Result<RefType, Error> {
        if name.starts_with('[') {
            RefType::parse(name)
        } else {
            Ok(RefType::Object(name.to_owned()))
        }
    }
}

impl RenderDescriptor for RefType {
    fn render_to(&self, write_to: &mut String) {
        match self {
            RefType::Object(name) => {
                write_to.push('L');
                write_to.push_str(name);
                write_to.push(';');
            }
            RefType::Array(element) => {
                write_to.push('[');
                element.render_to(write_to);
            }
        }
    }
}

impl ParseDescriptor for RefType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, String> {
        match source.next() {
            Some('L') => {
                let mut class_name = String::new();
                loop {
                    match source.next() {
                        Some(';') if !class_name.is_empty() => {
                            return Ok(RefType::Object(class_name))
                        }
                        Some(';') => return Err("empty class name".to_owned()),
                        Some(c) => class_name.push(c),
                        None => return Err(format!("missing terminator for 'L{}'", class_name)),
                    }
                }
            }
            Some('[') => Ok(RefType::Array(Box::new(FieldType::parse_from(source)?))),
            Some(c) => Err(format!("invalid reference type character '{}'", c)),
            None => Err("missing reference type".to_owned()),
        }
    }
}

/// Type of a class, instance, or local variable
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType {
    Base(BaseType),
    Ref(RefType),
}

impl Width for FieldType {
    fn width(&self) -> usize {
        match self {
            FieldType::Base(base_type) => base_type.width(),
            FieldType::Ref(_) => 1,
        }
    }
}

impl FieldType {
    pub fn array(field_type: FieldType) -> FieldType {
        FieldType::Ref(RefType::Array(Box::new(field_type)))
    }

    pub fn object(class_name: impl Into<String>) -> FieldType {
        FieldType::Ref(RefType::Object(class_name.into()))
    }

    pub const fn int() -> FieldType {
        FieldType::Base(BaseType::Int)
    }

    pub const fn long() -> FieldType {
        FieldType::Base(BaseType::Long)
    }

    pub const fn double() -> FieldType {
        FieldType::Base(BaseType::Double)
    }
}

impl RenderDescriptor for FieldType {
    fn render_to(&self, write_to: &mut String) {
        match self {
            FieldType::Base(base_type) => base_type.render_to(write_to),
            FieldType::Ref(reference_type) => reference_type.render_to(write_to),
        }
    }
}

impl ParseDescriptor for FieldType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, String> {
        match source.peek().copied() {
            None => Err("missing field type".to_owned()),
            Some('L' | '[') => RefType::parse_from(source).map(FieldType::Ref),
            Some(_) => BaseType::parse_from(source).map(FieldType::Base),
        }
    }
}

/// Signature of a method
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,

    /// `None` is for `void` (ie. no return)
    pub return_type: Option<FieldType>,
}

impl MethodDescriptor {
    /// Total length of parameters (not the same as the length of the vector),
    /// which must be 255 or less for it to be valid
    pub fn parameter_length(&self, has_this_param: bool) -> usize {
        let this_len = if has_this_param { 1 } else { 0 };
        this_len + self.parameters.iter().map(Width::width).sum::<usize>()
    }

    /// Number of stack slots taken by the return value
    pub fn return_width(&self) -> usize {
        self.return_type.as_ref().map_or(0, Width::width)
    }
}

impl RenderDescriptor for MethodDescriptor {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('(');
        for parameter in &self.parameters {
            parameter.render_to(write_to);
        }
        write_to.push(')');
        match &self.return_type {
            None => write_to.push('V'),
            Some(typ) => typ.render_to(write_to),
        };
    }
}

impl ParseDescriptor for MethodDescriptor {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, String> {
        if source.next() != Some('(') {
            return Err("expected '(' for method".to_owned());
        }

        let mut parameters = vec![];
        loop {
            match source.peek().copied() {
                Some(')') => break,
                None => return Err("expected ')' for method".to_owned()),
                Some(_) => parameters.push(FieldType::parse_from(source)?),
            }
        }
        let _ = source.next();

        let return_type = if source.next_if_eq(&'V').is_some() {
            None
        } else {
            Some(FieldType::parse_from(source)?)
        };

        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}

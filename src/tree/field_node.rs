use crate::access_flags::FieldAccessFlags;
use crate::class_file::Attribute;
use crate::code::LdcValue;
use crate::visitor::FieldVisitor;
use crate::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    pub access_flags: FieldAccessFlags,
    pub name: String,
    pub descriptor: String,

    /// Initial value from the `ConstantValue` attribute
    pub value: Option<LdcValue>,
    pub attributes: Vec<Attribute>,
}

impl FieldNode {
    pub fn new(
        access_flags: FieldAccessFlags,
        name: impl Into<String>,
        descriptor: impl Into<String>,
        value: Option<LdcValue>,
    ) -> FieldNode {
        FieldNode {
            access_flags,
            name: name.into(),
            descriptor: descriptor.into(),
            value,
            attributes: vec![],
        }
    }

    /// Replay the field contents (everything after `visit_field`) into a visitor
    pub fn accept(&self, visitor: &mut dyn FieldVisitor) -> Result<(), Error> {
        for attribute in &self.attributes {
            visitor.visit_attribute(attribute)?;
        }
        visitor.visit_end()
    }
}

impl FieldVisitor for FieldNode {
    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<(), Error> {
        self.attributes.push(attribute.clone());
        Ok(())
    }
}

use crate::access_flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
use crate::class_file::{Attribute, Version};
use crate::code::LdcValue;
use crate::tree::{FieldNode, MethodNode};
use crate::visitor::{ClassVisitor, FieldVisitor, MethodVisitor};
use crate::Error;

#[derive(Debug, Clone)]
pub struct ClassNode {
    pub version: Version,
    pub access_flags: ClassAccessFlags,

    /// Internal name (eg. `java/lang/String`)
    pub name: String,

    /// Internal name of the superclass (only `java/lang/Object` has none)
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub source_file: Option<String>,

    /// Class attributes which are not otherwise decoded
    pub attributes: Vec<Attribute>,
    pub fields: Vec<FieldNode>,
    pub methods: Vec<MethodNode>,

    /// Number of attributes which were visited before the source file
    attributes_before_source: usize,
}

impl Default for ClassNode {
    fn default() -> ClassNode {
        ClassNode {
            version: Version::JAVA8,
            access_flags: ClassAccessFlags::empty(),
            name: String::new(),
            super_name: None,
            interfaces: vec![],
            source_file: None,
            attributes: vec![],
            fields: vec![],
            methods: vec![],
            attributes_before_source: 0,
        }
    }
}

impl ClassNode {
    pub fn new() -> ClassNode {
        ClassNode::default()
    }

    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MethodNode> {
        self.methods
            .iter()
            .find(|method| method.name == name && method.descriptor == descriptor)
    }

    pub fn find_method_mut(&mut self, name: &str, descriptor: &str) -> Option<&mut MethodNode> {
        self.methods
            .iter_mut()
            .find(|method| method.name == name && method.descriptor == descriptor)
    }

    /// Replay the whole class into a visitor
    pub fn accept(&self, visitor: &mut dyn ClassVisitor) -> Result<(), Error> {
        visitor.visit(
            self.version,
            self.access_flags,
            &self.name,
            self.super_name.as_deref(),
            &self.interfaces,
        )?;

        let split = self.attributes_before_source.min(self.attributes.len());
        for attribute in &self.attributes[..split] {
            visitor.visit_attribute(attribute)?;
        }
        if let Some(source_file) = &self.source_file {
            visitor.visit_source(source_file)?;
        }
        for attribute in &self.attributes[split..] {
            visitor.visit_attribute(attribute)?;
        }

        for field in &self.fields {
            let field_visitor = visitor.visit_field(
                field.access_flags,
                &field.name,
                &field.descriptor,
                field.value.as_ref(),
            )?;
            if let Some(mut field_visitor) = field_visitor {
                field.accept(field_visitor.as_mut())?;
            }
        }

        for method in &self.methods {
            let method_visitor = visitor.visit_method(
                method.access_flags,
                &method.name,
                &method.descriptor,
                &method.exceptions,
            )?;
            if let Some(mut method_visitor) = method_visitor {
                method.accept(method_visitor.as_mut())?;
            }
        }

        visitor.visit_end()
    }
}

impl ClassVisitor for ClassNode {
    fn visit(
        &mut self,
        version: Version,
        access_flags: ClassAccessFlags,
        name: &str,
        super_name: Option<&str>,
        interfaces: &[String],
    ) -> Result<(), Error> {
        self.version = version;
        self.access_flags = access_flags;
        self.name = name.to_owned();
        self.super_name = super_name.map(str::to_owned);
        self.interfaces = interfaces.to_vec();
        Ok(())
    }

    fn visit_source(&mut self, source_file: &str) -> Result<(), Error> {
        self.source_file = Some(source_file.to_owned());
        self.attributes_before_source = self.attributes.len();
        Ok(())
    }

    fn visit_field(
        &mut self,
        access_flags: FieldAccessFlags,
        name: &str,
        descriptor: &str,
        value: Option<&LdcValue>,
    ) -> Result<Option<Box<dyn FieldVisitor + '_>>, Error> {
        self.fields.push(FieldNode::new(
            access_flags,
            name,
            descriptor,
            value.cloned(),
        ));
        Ok(self
            .fields
            .last_mut()
            .map(|field| Box::new(field) as Box<dyn FieldVisitor + '_>))
    }

    fn visit_method(
        &mut self,
        access_flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        exceptions: &[String],
    ) -> Result<Option<Box<dyn MethodVisitor + '_>>, Error> {
        self.methods.push(MethodNode::new(
            access_flags,
            name,
            descriptor,
            exceptions.to_vec(),
        ));
        Ok(self
            .methods
            .last_mut()
            .map(|method| Box::new(method) as Box<dyn MethodVisitor + '_>))
    }

    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<(), Error> {
        self.attributes.push(attribute.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::opcodes::*;
    use crate::code::Insn;
    use crate::tree::InsnNode;

    fn sample() -> ClassNode {
        let mut class = ClassNode::new();
        class
            .visit(
                Version::JAVA8,
                ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
                "Sample",
                Some("java/lang/Object"),
                &[],
            )
            .unwrap();
        class
            .visit_attribute(&Attribute {
                name: "Custom".to_owned(),
                data: vec![1, 2],
            })
            .unwrap();
        class.visit_source("Sample.java").unwrap();
        {
            let mut method = class
                .visit_method(MethodAccessFlags::STATIC, "f", "()V", &[])
                .unwrap()
                .unwrap();
            method.visit_code().unwrap();
            method.visit_insn(RETURN).unwrap();
            method.visit_maxs(0, 0).unwrap();
            method.visit_end().unwrap();
        }
        class.visit_end().unwrap();
        class
    }

    #[test]
    fn records_members() {
        let class = sample();
        assert_eq!(class.name, "Sample");
        assert_eq!(class.source_file.as_deref(), Some("Sample.java"));
        let method = class.find_method("f", "()V").unwrap();
        assert!(method.has_code);
        assert_eq!(method.instructions.len(), 1);
    }

    #[test]
    fn replay_into_another_tree() {
        let mut class = sample();
        let method = class.find_method_mut("f", "()V").unwrap();
        let ret = method.instructions.first().unwrap();
        method
            .instructions
            .insert_before(ret, Insn::Simple(NOP))
            .unwrap();

        let mut copy = ClassNode::new();
        class.accept(&mut copy).unwrap();
        assert_eq!(copy.attributes, class.attributes);
        assert_eq!(copy.attributes_before_source, 1);
        let nodes: Vec<&InsnNode> = copy.methods[0]
            .instructions
            .iter()
            .map(|(_, node)| node)
            .collect();
        assert_eq!(
            nodes,
            vec![
                &InsnNode::Insn(Insn::Simple(NOP)),
                &InsnNode::Insn(Insn::Simple(RETURN))
            ]
        );
    }
}

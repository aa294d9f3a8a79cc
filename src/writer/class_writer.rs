use super::method_writer::MethodWriter;
use super::{arrange_attributes, table_count, SegmentBuffer, WriterFlags};
use crate::access_flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
use crate::analysis::{ObjectHierarchy, TypeHierarchy};
use crate::class_file::{
    Attribute, AttributeLayout, AttributeLike, BootstrapMethod, BootstrapMethods,
    ClassConstantIndex, ConstantIndex, ConstantValue, ConstantsPool, PoolEntry, Serialize,
    SourceFile, Version,
};
use crate::code::{Handle, LdcValue};
use crate::errors::Diagnostic;
use crate::reader::{ClassReader, MAGIC};
use crate::visitor::{ClassVisitor, FieldVisitor, MethodVisitor};
use crate::Error;
use std::collections::HashMap;

/// Constant pool along with the bootstrap methods table, which is indexed much like the pool
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    pub pool: ConstantsPool,
    bootstrap_methods: Vec<BootstrapMethod>,
    bootstrap_indices: HashMap<BootstrapMethod, u16>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    /// Start from the constants and bootstrap methods of an existing class
    pub fn from_reader(reader: &ClassReader<'_>) -> Result<SymbolTable, Error> {
        let mut table = SymbolTable {
            pool: reader.pool().clone(),
            bootstrap_methods: vec![],
            bootstrap_indices: HashMap::new(),
        };
        for bootstrap_method in reader.bootstrap_methods()? {
            table.push_bootstrap_method(bootstrap_method)?;
        }
        Ok(table)
    }

    pub fn bootstrap_methods(&self) -> &[BootstrapMethod] {
        &self.bootstrap_methods
    }

    fn push_bootstrap_method(&mut self, bootstrap_method: BootstrapMethod) -> Result<u16, Error> {
        let index = u16::try_from(self.bootstrap_methods.len()).map_err(|_| {
            Error::MalformedAttribute {
                name: BootstrapMethods::NAME,
                reason: "more than 65535 bootstrap methods".to_owned(),
            }
        })?;
        self.bootstrap_indices
            .entry(bootstrap_method.clone())
            .or_insert(index);
        self.bootstrap_methods.push(bootstrap_method);
        Ok(index)
    }

    /// Get or insert a bootstrap method entry
    pub fn bootstrap_method(
        &mut self,
        handle: &Handle,
        arguments: &[LdcValue],
    ) -> Result<u16, Error> {
        let bootstrap_method = self.pool.intern(&PoolEntry::MethodHandle(handle))?;
        let bootstrap_arguments = arguments
            .iter()
            .map(|argument| self.loadable(argument))
            .collect::<Result<Vec<_>, Error>>()?;
        let entry = BootstrapMethod {
            bootstrap_method,
            bootstrap_arguments,
        };
        match self.bootstrap_indices.get(&entry) {
            Some(index) => Ok(*index),
            None => self.push_bootstrap_method(entry),
        }
    }

    /// Get or insert a constant loadable with `ldc`
    pub fn loadable(&mut self, value: &LdcValue) -> Result<ConstantIndex, Error> {
        let entry = match value {
            LdcValue::Integer(value) => PoolEntry::Integer(*value),
            LdcValue::Float(value) => PoolEntry::Float(*value),
            LdcValue::Long(value) => PoolEntry::Long(*value),
            LdcValue::Double(value) => PoolEntry::Double(*value),
            LdcValue::String(value) => PoolEntry::String(value),
            LdcValue::Class(name) => PoolEntry::Class(name),
            LdcValue::MethodType(descriptor) => PoolEntry::MethodType(descriptor),
            LdcValue::MethodHandle(handle) => PoolEntry::MethodHandle(handle),
            LdcValue::Dynamic(dynamic) => {
                let bootstrap_method =
                    self.bootstrap_method(&dynamic.bootstrap, &dynamic.arguments)?;
                return self.pool.intern(&PoolEntry::Dynamic {
                    bootstrap_method,
                    name: &dynamic.name,
                    descriptor: &dynamic.descriptor,
                });
            }
        };
        self.pool.intern(&entry)
    }

    /// Get or insert an `invokedynamic` call site
    pub fn invoke_dynamic(
        &mut self,
        name: &str,
        descriptor: &str,
        bootstrap: &Handle,
        arguments: &[LdcValue],
    ) -> Result<ConstantIndex, Error> {
        let bootstrap_method = self.bootstrap_method(bootstrap, arguments)?;
        self.pool.intern(&PoolEntry::InvokeDynamic {
            bootstrap_method,
            name,
            descriptor,
        })
    }
}

/// Class attribute, in the position it was visited
#[derive(Debug)]
enum ClassAttribute {
    Raw { name: ConstantIndex, info: Vec<u8> },

    /// Where the regenerated `BootstrapMethods` goes
    BootstrapMethods,
}

#[derive(Debug)]
struct Header {
    version: Version,
    access_flags: ClassAccessFlags,
    name: String,
    this_class: ClassConstantIndex,
    super_class: Option<ClassConstantIndex>,
    interfaces: Vec<ClassConstantIndex>,
}

/// Class visitor which produces the bytes of a class file
///
/// Members are encoded as soon as they end, so the writer holds on to bytes rather than
/// structure. Call [`ClassWriter::finish`] after `visit_end` to get the class file.
pub struct ClassWriter {
    flags: WriterFlags,
    pub(super) symbols: SymbolTable,
    pub(super) hierarchy: Box<dyn TypeHierarchy>,
    header: Option<Header>,
    fields: SegmentBuffer,
    field_count: usize,
    pub(super) methods: SegmentBuffer,
    pub(super) method_count: usize,
    attributes: Vec<ClassAttribute>,
    pub(super) diagnostics: Vec<Diagnostic>,
    finished: bool,
}

impl ClassWriter {
    pub fn new(flags: WriterFlags) -> ClassWriter {
        ClassWriter::with_symbols(SymbolTable::new(), flags)
    }

    /// Writer whose constant pool starts out as a copy of the pool of the class being read
    ///
    /// Replaying the reader into this writer unchanged produces the original bytes.
    pub fn from_reader(reader: &ClassReader<'_>, flags: WriterFlags) -> Result<ClassWriter, Error> {
        Ok(ClassWriter::with_symbols(
            SymbolTable::from_reader(reader)?,
            flags,
        ))
    }

    fn with_symbols(symbols: SymbolTable, flags: WriterFlags) -> ClassWriter {
        ClassWriter {
            flags,
            symbols,
            hierarchy: Box::new(ObjectHierarchy),
            header: None,
            fields: SegmentBuffer::new(),
            field_count: 0,
            methods: SegmentBuffer::new(),
            method_count: 0,
            attributes: vec![],
            diagnostics: vec![],
            finished: false,
        }
    }

    /// Use a class hierarchy for merging types when computing frames
    pub fn with_hierarchy(mut self, hierarchy: Box<dyn TypeHierarchy>) -> ClassWriter {
        self.hierarchy = hierarchy;
        self
    }

    pub fn flags(&self) -> WriterFlags {
        self.flags
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Problems found and worked around while computing frames
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Class file version, once `visit` has been called
    pub fn version(&self) -> Option<Version> {
        self.header.as_ref().map(|header| header.version)
    }

    /// Internal name of the class being written, once `visit` has been called
    pub fn class_name(&self) -> Option<&str> {
        self.header.as_ref().map(|header| header.name.as_str())
    }

    pub(super) fn check_not_finished(&self) -> Result<(), Error> {
        if self.finished {
            Err(Error::AlreadyFinished)
        } else {
            Ok(())
        }
    }

    /// Bytes of the class file
    ///
    /// Any field or method visitors handed out must have been driven to `visit_end` first.
    pub fn finish(&mut self) -> Result<Vec<u8>, Error> {
        self.check_not_finished()?;
        let header = self.header.take().ok_or_else(|| Error::MalformedAttribute {
            name: "ClassFile",
            reason: "class header was never visited".to_owned(),
        })?;
        self.finished = true;

        // Names of attributes have to be in the pool before it gets written out
        let bootstrap_table = BootstrapMethods(self.symbols.bootstrap_methods.clone());
        let needs_bootstrap_methods = !bootstrap_table.0.is_empty();
        let has_placeholder = self
            .attributes
            .iter()
            .any(|attribute| matches!(attribute, ClassAttribute::BootstrapMethods));
        if needs_bootstrap_methods && !has_placeholder {
            self.attributes.push(ClassAttribute::BootstrapMethods);
        }
        let bootstrap_name = if needs_bootstrap_methods {
            Some(self.symbols.pool.get_utf8(BootstrapMethods::NAME)?.0)
        } else {
            None
        };

        let mut class = SegmentBuffer::new();
        class.push(MAGIC)?;
        class.push(header.version)?;
        self.symbols.pool.serialize(&mut class)?;
        class.push(header.access_flags)?;
        class.push(header.this_class)?;
        class.push(header.super_class.map_or(0, |class| class.0 .0))?;
        header.interfaces.serialize(&mut class)?;

        class.push(table_count("fields", self.field_count)?)?;
        class.extend_from_slice(&std::mem::take(&mut self.fields).finish()?);
        class.push(table_count("methods", self.method_count)?)?;
        class.extend_from_slice(&std::mem::take(&mut self.methods).finish()?);

        let attributes: Vec<(ConstantIndex, Vec<u8>)> = self
            .attributes
            .drain(..)
            .filter_map(|attribute| match attribute {
                ClassAttribute::Raw { name, info } => Some((name, info)),
                ClassAttribute::BootstrapMethods => {
                    bootstrap_name.map(|name| (name, bootstrap_table.to_info()))
                }
            })
            .collect();
        class.push(table_count("class attributes", attributes.len())?)?;
        for (name, info) in attributes {
            class.push(name)?;
            class.begin_length();
            class.extend_from_slice(&info);
            class.end_length();
        }

        log::debug!(
            "wrote class {} ({} constants, {} fields, {} methods)",
            header.name,
            self.symbols.pool.len(),
            self.field_count,
            self.method_count
        );
        class.finish()
    }

    fn push_attribute(&mut self, name: &str, info: Vec<u8>) -> Result<(), Error> {
        let name = self.symbols.pool.get_utf8(name)?.0;
        self.attributes.push(ClassAttribute::Raw { name, info });
        Ok(())
    }
}

impl ClassVisitor for ClassWriter {
    fn visit(
        &mut self,
        version: Version,
        access_flags: ClassAccessFlags,
        name: &str,
        super_name: Option<&str>,
        interfaces: &[String],
    ) -> Result<(), Error> {
        self.check_not_finished()?;
        let pool = &mut self.symbols.pool;
        let this_class = pool.get_class(name)?;
        let super_class = match super_name {
            Some(super_name) => Some(pool.get_class(super_name)?),
            None => None,
        };
        let interfaces = interfaces
            .iter()
            .map(|interface| pool.get_class(interface))
            .collect::<Result<_, _>>()?;
        self.header = Some(Header {
            version,
            access_flags,
            name: name.to_owned(),
            this_class,
            super_class,
            interfaces,
        });
        log::trace!("writing class {}", name);
        Ok(())
    }

    fn visit_source(&mut self, source_file: &str) -> Result<(), Error> {
        self.check_not_finished()?;
        let source_file = SourceFile(self.symbols.pool.get_utf8(source_file)?);
        self.push_attribute(SourceFile::NAME, source_file.to_info())
    }

    fn visit_field(
        &mut self,
        access_flags: FieldAccessFlags,
        name: &str,
        descriptor: &str,
        value: Option<&LdcValue>,
    ) -> Result<Option<Box<dyn FieldVisitor + '_>>, Error> {
        self.check_not_finished()?;
        Ok(Some(Box::new(FieldWriter {
            class: self,
            access_flags,
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            value: value.cloned(),
            attributes: vec![],
        })))
    }

    fn visit_method(
        &mut self,
        access_flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        exceptions: &[String],
    ) -> Result<Option<Box<dyn MethodVisitor + '_>>, Error> {
        self.check_not_finished()?;
        let compute = self.flags;
        Ok(Some(Box::new(MethodWriter::new(
            self,
            compute,
            access_flags,
            name,
            descriptor,
            exceptions,
        ))))
    }

    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<(), Error> {
        self.check_not_finished()?;
        if attribute.name == BootstrapMethods::NAME {
            if !self
                .attributes
                .iter()
                .any(|attribute| matches!(attribute, ClassAttribute::BootstrapMethods))
            {
                self.attributes.push(ClassAttribute::BootstrapMethods);
            }
            Ok(())
        } else {
            self.push_attribute(&attribute.name, attribute.data.clone())
        }
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        self.check_not_finished()
    }
}

/// Field visitor which encodes the field into its class writer when it ends
struct FieldWriter<'w> {
    class: &'w mut ClassWriter,
    access_flags: FieldAccessFlags,
    name: String,
    descriptor: String,
    value: Option<LdcValue>,
    attributes: Vec<Attribute>,
}

impl<'w> FieldVisitor for FieldWriter<'w> {
    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<(), Error> {
        self.class.check_not_finished()?;
        self.attributes.push(attribute.clone());
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        self.class.check_not_finished()?;
        let symbols = &mut self.class.symbols;
        let name = symbols.pool.get_utf8(&self.name)?;
        let descriptor = symbols.pool.get_utf8(&self.descriptor)?;

        let mut generated = vec![];
        if let Some(value) = &self.value {
            let constant_value = ConstantValue(symbols.loadable(value)?);
            generated.push((ConstantValue::NAME, constant_value.to_info()));
        }
        let attributes = arrange_attributes(
            AttributeLayout::FIELD,
            &mut symbols.pool,
            generated,
            &self.attributes,
        )?;

        let fields = &mut self.class.fields;
        fields.push(self.access_flags)?;
        fields.push(name)?;
        fields.push(descriptor)?;
        fields.push(table_count("field attributes", attributes.len())?)?;
        for (attribute_name, info) in attributes {
            fields.push(attribute_name)?;
            fields.begin_length();
            fields.extend_from_slice(&info);
            fields.end_length();
        }
        self.class.field_count += 1;
        log::trace!("wrote field {} {}", self.name, self.descriptor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visiting_after_finish_fails() {
        let mut writer = ClassWriter::new(WriterFlags::empty());
        writer
            .visit(
                Version::JAVA8,
                ClassAccessFlags::PUBLIC,
                "Empty",
                Some("java/lang/Object"),
                &[],
            )
            .unwrap();
        writer.visit_end().unwrap();
        let bytes = writer.finish().unwrap();
        assert_eq!(&bytes[0..4], &[0xCA, 0xFE, 0xBA, 0xBE]);

        assert!(matches!(writer.finish(), Err(Error::AlreadyFinished)));
        assert!(matches!(
            writer.visit_source("Empty.java"),
            Err(Error::AlreadyFinished)
        ));
        assert!(matches!(
            writer.visit_method(MethodAccessFlags::PUBLIC, "m", "()V", &[]),
            Err(Error::AlreadyFinished)
        ));
    }

    #[test]
    fn bootstrap_methods_are_shared() {
        let mut symbols = SymbolTable::new();
        let bootstrap = Handle {
            kind: crate::code::HandleKind::InvokeStatic,
            owner: "java/lang/invoke/StringConcatFactory".to_owned(),
            name: "makeConcatWithConstants".to_owned(),
            descriptor: "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/invoke/CallSite;".to_owned(),
            is_interface: false,
        };
        let arguments = [LdcValue::String("\u{1}!".to_owned())];

        let first = symbols
            .invoke_dynamic("concat", "(I)Ljava/lang/String;", &bootstrap, &arguments)
            .unwrap();
        let second = symbols
            .invoke_dynamic("concat", "(J)Ljava/lang/String;", &bootstrap, &arguments)
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(symbols.bootstrap_methods().len(), 1);
    }
}

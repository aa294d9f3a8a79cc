use super::code_reader::CodeReader;
use super::ReaderFlags;
use crate::access_flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
use crate::class_file::{
    Attribute, AttributeLayout, AttributeLike, BootstrapMethod, BootstrapMethods, ByteReader,
    Constant, ConstantIndex, ConstantValue, ConstantsPool, Deserialize, Exceptions, SourceFile,
    Version,
};
use crate::code::{ConstantDynamic, Handle, LdcValue};
use crate::visitor::ClassVisitor;
use crate::Error;

/// Magic number at the start of every class file
pub const MAGIC: u32 = 0xCAFE_BABE;

/// Dynamic constants whose bootstrap arguments nest deeper than this are rejected
const MAX_DYNAMIC_NESTING: usize = 64;

/// Parsed class file header, ready to replay the rest of the class as events
///
/// Building the reader checks the magic number and version and decodes the constant pool. The
/// pool is kept around so that a writer can start from it (see
/// [`ClassWriter::from_reader`](crate::writer::ClassWriter::from_reader)).
#[derive(Debug)]
pub struct ClassReader<'a> {
    bytes: &'a [u8],
    version: Version,
    pool: ConstantsPool,

    /// Offset of the access flags, just past the constant pool
    header_end: usize,
}

impl<'a> ClassReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<ClassReader<'a>, Error> {
        let mut reader = ByteReader::new(bytes);

        let magic = reader.read_u32()?;
        if magic != MAGIC {
            return Err(Error::BadMagic(magic));
        }

        let minor = reader.read_u16()?;
        let major = reader.read_u16()?;
        if major > Version::LATEST_SUPPORTED.major {
            return Err(Error::UnsupportedVersion { major, minor });
        }

        let pool = ConstantsPool::read(&mut reader)?;
        log::trace!("read {} constants", pool.len());

        Ok(ClassReader {
            bytes,
            version: Version::new(major, minor),
            pool,
            header_end: reader.position(),
        })
    }

    /// Decode a whole class into a visitor
    pub fn decode(bytes: &'a [u8], visitor: &mut dyn ClassVisitor) -> Result<(), Error> {
        ClassReader::new(bytes)?.accept(visitor, ReaderFlags::empty())
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn pool(&self) -> &ConstantsPool {
        &self.pool
    }

    /// Internal name of the class
    pub fn class_name(&self) -> Result<&str, Error> {
        let mut reader = ByteReader::new(self.bytes);
        reader.seek(self.header_end + 2)?;
        self.pool.class_at(reader.read_u16()?)
    }

    /// Entries of the `BootstrapMethods` attribute (empty if there is none)
    pub fn bootstrap_methods(&self) -> Result<Vec<BootstrapMethod>, Error> {
        let mut reader = ByteReader::new(self.bytes);
        reader.seek(self.header_end + 6)?;
        let interfaces = reader.read_u16()? as usize;
        reader.skip(2 * interfaces)?;
        skip_members(&mut reader)?;
        skip_members(&mut reader)?;
        let attributes = read_attributes(&self.pool, &mut reader)?;
        bootstrap_table(&attributes)
    }

    /// Replay the class into a visitor
    pub fn accept(&self, visitor: &mut dyn ClassVisitor, flags: ReaderFlags) -> Result<(), Error> {
        let pool = &self.pool;
        let mut reader = ByteReader::new(self.bytes);
        reader.seek(self.header_end)?;

        let access_flags = ClassAccessFlags::deserialize(&mut reader)?;
        let name = pool.class_at(reader.read_u16()?)?;
        let super_name = pool.optional_class_at(reader.read_u16()?)?;
        let interfaces = Vec::<u16>::deserialize(&mut reader)?
            .into_iter()
            .map(|index| pool.class_at(index).map(str::to_owned))
            .collect::<Result<Vec<String>, Error>>()?;

        // Class attributes come after the members, but the bootstrap methods are needed first
        let members = reader;
        skip_members(&mut reader)?;
        skip_members(&mut reader)?;
        let class_attributes = read_attributes(pool, &mut reader)?;
        if !reader.is_empty() {
            return Err(Error::MalformedAttribute {
                name: "ClassFile",
                reason: format!("{} trailing bytes", reader.remaining()),
            });
        }
        let bootstrap_methods = bootstrap_table(&class_attributes)?;
        let resolver = Resolver {
            pool,
            bootstrap_methods: &bootstrap_methods,
        };

        log::trace!("reading class {}", name);
        visitor.visit(self.version, access_flags, name, super_name, &interfaces)?;
        for attribute in &class_attributes {
            if attribute.name == SourceFile::NAME {
                if !flags.contains(ReaderFlags::SKIP_DEBUG) {
                    let source_file = SourceFile::parse(attribute.info)?;
                    visitor.visit_source(pool.utf8_at(source_file.0 .0 .0)?)?;
                }
            } else {
                visitor.visit_attribute(&attribute.to_attribute())?;
            }
        }

        let mut reader = members;
        for _ in 0..reader.read_u16()? {
            self.read_field(&mut reader, &resolver, visitor)?;
        }
        for _ in 0..reader.read_u16()? {
            self.read_method(&mut reader, &resolver, visitor, flags)?;
        }

        visitor.visit_end()
    }

    fn read_field(
        &self,
        reader: &mut ByteReader<'a>,
        resolver: &Resolver<'_>,
        visitor: &mut dyn ClassVisitor,
    ) -> Result<(), Error> {
        let access_flags = FieldAccessFlags::deserialize(reader)?;
        let name = self.pool.utf8_at(reader.read_u16()?)?;
        let descriptor = self.pool.utf8_at(reader.read_u16()?)?;

        let attributes = read_attributes(&self.pool, reader)?;
        let mut value = None;
        for attribute in &attributes {
            if attribute.name == ConstantValue::NAME {
                let constant_value = ConstantValue::parse(attribute.info)?;
                value = Some(resolver.loadable(constant_value.0)?);
            }
        }

        log::trace!("reading field {} {}", name, descriptor);
        if let Some(mut field_visitor) =
            visitor.visit_field(access_flags, name, descriptor, value.as_ref())?
        {
            for attribute in visited_attributes(AttributeLayout::FIELD, &attributes, &[]) {
                field_visitor.visit_attribute(&attribute)?;
            }
            field_visitor.visit_end()?;
        }
        Ok(())
    }

    fn read_method(
        &self,
        reader: &mut ByteReader<'a>,
        resolver: &Resolver<'_>,
        visitor: &mut dyn ClassVisitor,
        flags: ReaderFlags,
    ) -> Result<(), Error> {
        let access_flags = MethodAccessFlags::deserialize(reader)?;
        let name = self.pool.utf8_at(reader.read_u16()?)?;
        let descriptor = self.pool.utf8_at(reader.read_u16()?)?;

        let attributes = read_attributes(&self.pool, reader)?;
        let mut code = None;
        let mut exceptions = vec![];
        for attribute in &attributes {
            if attribute.name == "Code" {
                code = Some(attribute.info);
            } else if attribute.name == Exceptions::NAME {
                for index in Exceptions::parse(attribute.info)?.0 {
                    exceptions.push(self.pool.class_at(index)?.to_owned());
                }
            }
        }
        let skip_code = flags.contains(ReaderFlags::SKIP_CODE);
        let dropped: &[&str] = if skip_code { &["Code"] } else { &[] };

        log::trace!("reading method {}{}", name, descriptor);
        if let Some(mut method_visitor) =
            visitor.visit_method(access_flags, name, descriptor, &exceptions)?
        {
            for attribute in visited_attributes(AttributeLayout::METHOD, &attributes, dropped) {
                method_visitor.visit_attribute(&attribute)?;
            }
            if let Some(code) = code {
                if !skip_code {
                    CodeReader::new(resolver, code, flags)?.accept(method_visitor.as_mut())?;
                }
            }
            method_visitor.visit_end()?;
        }
        Ok(())
    }
}

/// Attribute whose name has been resolved but whose contents haven't been decoded yet
pub(super) struct AttributeSlice<'p, 'a> {
    pub name: &'p str,
    pub info: ByteReader<'a>,
}

impl<'p, 'a> AttributeSlice<'p, 'a> {
    pub fn to_attribute(&self) -> Attribute {
        let mut info = self.info;
        Attribute {
            name: self.name.to_owned(),
            data: info.read_bytes(info.remaining()).unwrap_or_default().to_vec(),
        }
    }
}

/// Attributes to report through `visit_attribute`, in file order
///
/// Those `layout` generates are reported through other events instead. They only show up here,
/// as empty placeholders, when the attributes are not in the default layout. Attributes named in
/// `dropped` are left out entirely.
pub(super) fn visited_attributes(
    layout: AttributeLayout,
    attributes: &[AttributeSlice<'_, '_>],
    dropped: &[&str],
) -> Vec<Attribute> {
    let kept: Vec<&AttributeSlice<'_, '_>> = attributes
        .iter()
        .filter(|attribute| !dropped.iter().any(|name| *name == attribute.name))
        .collect();
    let names: Vec<&str> = kept.iter().map(|attribute| attribute.name).collect();
    let placeholders = !layout.is_default_order(&names);

    kept.into_iter()
        .filter_map(|attribute| {
            if !layout.generates(attribute.name) {
                Some(attribute.to_attribute())
            } else if placeholders {
                Some(Attribute {
                    name: attribute.name.to_owned(),
                    data: vec![],
                })
            } else {
                None
            }
        })
        .collect()
}

pub(super) fn read_attributes<'p, 'a>(
    pool: &'p ConstantsPool,
    reader: &mut ByteReader<'a>,
) -> Result<Vec<AttributeSlice<'p, 'a>>, Error> {
    let count = reader.read_u16()?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = pool.utf8_at(reader.read_u16()?)?;
        let length = reader.read_u32()? as usize;
        let info = reader.split(length)?;
        attributes.push(AttributeSlice { name, info });
    }
    Ok(attributes)
}

/// Skip over the fields or the methods table
fn skip_members(reader: &mut ByteReader<'_>) -> Result<(), Error> {
    for _ in 0..reader.read_u16()? {
        reader.skip(6)?;
        for _ in 0..reader.read_u16()? {
            reader.skip(2)?;
            let length = reader.read_u32()? as usize;
            reader.skip(length)?;
        }
    }
    Ok(())
}

fn bootstrap_table(attributes: &[AttributeSlice<'_, '_>]) -> Result<Vec<BootstrapMethod>, Error> {
    match attributes
        .iter()
        .find(|attribute| attribute.name == BootstrapMethods::NAME)
    {
        Some(attribute) => Ok(BootstrapMethods::parse(attribute.info)?.0),
        None => Ok(vec![]),
    }
}

/// Turns pool indices into the symbolic values carried by events
pub(super) struct Resolver<'r> {
    pub pool: &'r ConstantsPool,
    pub bootstrap_methods: &'r [BootstrapMethod],
}

impl<'r> Resolver<'r> {
    /// Value of a constant loadable with `ldc` or usable as a bootstrap argument
    pub fn loadable(&self, index: ConstantIndex) -> Result<LdcValue, Error> {
        self.loadable_nested(index, 0)
    }

    fn loadable_nested(&self, index: ConstantIndex, depth: usize) -> Result<LdcValue, Error> {
        let pool = self.pool;
        Ok(match pool.get(index)? {
            Constant::Integer(value) => LdcValue::Integer(*value),
            Constant::Float(bits) => LdcValue::Float(f32::from_bits(*bits)),
            Constant::Long(value) => LdcValue::Long(*value),
            Constant::Double(bits) => LdcValue::Double(f64::from_bits(*bits)),
            Constant::String(utf8) => LdcValue::String(pool.utf8_at(utf8.0 .0)?.to_owned()),
            Constant::Class(utf8) => LdcValue::Class(pool.utf8_at(utf8.0 .0)?.to_owned()),
            Constant::MethodType { descriptor } => {
                LdcValue::MethodType(pool.utf8_at(descriptor.0 .0)?.to_owned())
            }
            Constant::MethodHandle { .. } => LdcValue::MethodHandle(pool.handle_at(index.0)?),
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                let (name, descriptor) = pool.name_and_type_at(name_and_type.0 .0)?;
                let (bootstrap, arguments) = self.bootstrap_nested(*bootstrap_method, depth)?;
                LdcValue::Dynamic(ConstantDynamic {
                    name: name.to_owned(),
                    descriptor: descriptor.to_owned(),
                    bootstrap,
                    arguments,
                })
            }
            _ => {
                return Err(Error::InvalidConstantIndex {
                    index,
                    expected: "loadable constant",
                })
            }
        })
    }

    /// Bootstrap method handle and arguments of an entry of the `BootstrapMethods` table
    pub fn bootstrap(&self, bootstrap_method: u16) -> Result<(Handle, Vec<LdcValue>), Error> {
        self.bootstrap_nested(bootstrap_method, 0)
    }

    fn bootstrap_nested(
        &self,
        bootstrap_method: u16,
        depth: usize,
    ) -> Result<(Handle, Vec<LdcValue>), Error> {
        if depth >= MAX_DYNAMIC_NESTING {
            return Err(Error::MalformedAttribute {
                name: BootstrapMethods::NAME,
                reason: "dynamic constants nest too deeply".to_owned(),
            });
        }
        let entry = self
            .bootstrap_methods
            .get(bootstrap_method as usize)
            .ok_or_else(|| Error::MalformedAttribute {
                name: BootstrapMethods::NAME,
                reason: format!("no bootstrap method {}", bootstrap_method),
            })?;
        let handle = self.pool.handle_at(entry.bootstrap_method.0)?;
        let arguments = entry
            .bootstrap_arguments
            .iter()
            .map(|argument| self.loadable_nested(*argument, depth + 1))
            .collect::<Result<Vec<_>, Error>>()?;
        Ok((handle, arguments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_validated() {
        assert!(matches!(
            ClassReader::new(&[0xCA, 0xFE, 0xBA, 0xBF, 0, 0, 0, 52]),
            Err(Error::BadMagic(0xCAFE_BABF))
        ));
        assert!(matches!(
            ClassReader::new(&[0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 70, 0, 1]),
            Err(Error::UnsupportedVersion {
                major: 70,
                minor: 0
            })
        ));
        assert!(matches!(
            ClassReader::new(&[0xCA, 0xFE, 0xBA, 0xBE, 0, 0]),
            Err(Error::TruncatedInput { offset: 6, .. })
        ));
    }

    #[test]
    fn nested_dynamic_constants_are_bounded() {
        let mut pool = ConstantsPool::new();
        let bootstrap = Handle {
            kind: crate::code::HandleKind::InvokeStatic,
            owner: "Bsm".to_owned(),
            name: "make".to_owned(),
            descriptor: "()V".to_owned(),
            is_interface: false,
        };
        let handle = pool
            .intern(&crate::class_file::PoolEntry::MethodHandle(&bootstrap))
            .unwrap();
        let dynamic = pool
            .intern(&crate::class_file::PoolEntry::Dynamic {
                bootstrap_method: 0,
                name: "x",
                descriptor: "I",
            })
            .unwrap();

        // The only bootstrap method takes the constant being bootstrapped as an argument
        let table = vec![BootstrapMethod {
            bootstrap_method: handle,
            bootstrap_arguments: vec![dynamic],
        }];
        let resolver = Resolver {
            pool: &pool,
            bootstrap_methods: &table,
        };
        assert!(matches!(
            resolver.loadable(dynamic),
            Err(Error::MalformedAttribute {
                name: "BootstrapMethods",
                ..
            })
        ));
    }
}

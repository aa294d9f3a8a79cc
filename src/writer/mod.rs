//! Encoding structural events into class files
//!
//! [`ClassWriter`] is a [`ClassVisitor`] which serializes everything it is told about. Constants
//! are interned as they show up. Jumps inside a method are written with placeholder offsets and
//! patched when the method ends, and the lengths of attributes are patched in one last pass when
//! the class is finished.
//!
//! [`ClassVisitor`]: crate::visitor::ClassVisitor

mod class_writer;
mod code_buffer;
mod method_writer;

pub use class_writer::*;
pub use code_buffer::{CodeBuffer, JumpWidth, SegmentBuffer, MAX_CODE_LENGTH};
pub use method_writer::MethodWriter;

use crate::class_file::{Attribute, AttributeLayout, ConstantIndex, ConstantsPool, Placement};
use crate::Error;
use bitflags::bitflags;

bitflags! {
    /// What the writer should compute instead of taking from the events
    #[derive(Default)]
    pub struct WriterFlags: u8 {
        /// Ignore `visit_maxs` and compute the maximum stack and locals
        const COMPUTE_MAXS = 0x01;

        /// Ignore `visit_frame` and compute stack map frames (implies `COMPUTE_MAXS`)
        const COMPUTE_FRAMES = 0x02;
    }
}

impl WriterFlags {
    /// Does the writer need to analyze method bodies?
    pub fn analyzes_code(&self) -> bool {
        self.intersects(WriterFlags::COMPUTE_MAXS | WriterFlags::COMPUTE_FRAMES)
    }
}

/// Attribute ready to be written out: name and contents
type EncodedAttribute = (ConstantIndex, Vec<u8>);

/// Lay out generated attributes among visited ones
///
/// A visited attribute which `layout` generates marks where the generated one goes, and its own
/// contents are dropped. So is a marker for an attribute that was not generated this time.
/// Generated attributes nothing marked get their default placement.
fn arrange_attributes(
    layout: AttributeLayout,
    pool: &mut ConstantsPool,
    generated: Vec<(&'static str, Vec<u8>)>,
    visited: &[Attribute],
) -> Result<Vec<EncodedAttribute>, Error> {
    let mut generated: Vec<(&str, Vec<u8>)> = generated;
    let mut marked: Vec<(&str, Vec<u8>)> = vec![];
    for attribute in visited {
        if !layout.generates(&attribute.name) {
            marked.push((&attribute.name, attribute.data.clone()));
        } else if let Some(position) = generated
            .iter()
            .position(|(name, _)| *name == attribute.name)
        {
            marked.push(generated.remove(position));
        }
    }
    let (leading, trailing): (Vec<_>, Vec<_>) = generated
        .into_iter()
        .partition(|(name, _)| layout.placement(name) == Some(Placement::Leading));

    let mut arranged = Vec::with_capacity(leading.len() + marked.len() + trailing.len());
    for (name, info) in leading.into_iter().chain(marked).chain(trailing) {
        arranged.push((pool.get_utf8(name)?.0, info));
    }
    Ok(arranged)
}

/// Count of a table whose length is written as a `u16`
fn table_count(table: &'static str, count: usize) -> Result<u16, Error> {
    u16::try_from(count).map_err(|_| Error::TooManyEntries { table, count })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attribute(name: &str, data: &[u8]) -> Attribute {
        Attribute {
            name: name.to_owned(),
            data: data.to_vec(),
        }
    }

    fn names(pool: &ConstantsPool, arranged: &[EncodedAttribute]) -> Vec<String> {
        arranged
            .iter()
            .map(|(name, _)| pool.utf8_at(name.0).unwrap().to_owned())
            .collect()
    }

    #[test]
    fn markers_place_generated_attributes() {
        let mut pool = ConstantsPool::new();
        let generated = vec![
            ("LineNumberTable", vec![1]),
            ("StackMapTable", vec![2]),
        ];
        let visited = [
            attribute("StackMapTable", &[]),
            attribute("Custom", &[3]),
            attribute("LocalVariableTable", &[]),
        ];
        let arranged =
            arrange_attributes(AttributeLayout::CODE, &mut pool, generated, &visited).unwrap();
        assert_eq!(
            names(&pool, &arranged),
            vec!["LineNumberTable", "StackMapTable", "Custom"]
        );
        let contents: Vec<Vec<u8>> = arranged.into_iter().map(|(_, info)| info).collect();
        assert_eq!(contents, vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn default_placement() {
        let mut pool = ConstantsPool::new();
        let generated = vec![
            ("LineNumberTable", vec![]),
            ("StackMapTable", vec![]),
        ];
        let visited = [attribute("Custom", &[])];
        let arranged =
            arrange_attributes(AttributeLayout::CODE, &mut pool, generated, &visited).unwrap();
        assert_eq!(
            names(&pool, &arranged),
            vec!["LineNumberTable", "Custom", "StackMapTable"]
        );
    }

    #[test]
    fn counts_must_fit() {
        assert_eq!(table_count("fields", 65535).unwrap(), 65535);
        assert!(matches!(
            table_count("fields", 65536),
            Err(Error::TooManyEntries {
                table: "fields",
                count: 65536
            })
        ));
    }
}

use crate::Error;
use std::collections::HashMap;
use std::fmt;

/// Opaque label for a position in the code of one method
///
/// Labels are plain handles: jumps, switches, exception ranges and debug tables refer to them by
/// value, and nothing owns them. The position they stand for is tracked separately (see
/// [`LabelResolver`]).
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Label(u32);

impl Label {
    pub const fn from_raw(raw: u32) -> Label {
        Label(raw)
    }

    pub const fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("L{}", self.0))
    }
}

/// Generates new labels
pub trait LabelGenerator {
    /// Generate a fresh label
    fn fresh_label(&mut self) -> Label;
}

/// Label generator counting up from a starting label
///
/// Cloning does not split the generator source - the cloned generator will produce the same
/// sequence of labels as the original.
///
/// # Panics
///
/// Generating a label once `Label::from_raw(u32::MAX)` has been handed out or skipped past
/// panics, since every later label would collide with one already in use.
#[derive(Clone, Debug, Default)]
pub struct SequentialLabels(u64);

impl SequentialLabels {
    pub fn new() -> SequentialLabels {
        SequentialLabels(0)
    }

    /// Make sure labels generated from now on come strictly after `label`
    pub fn skip_past(&mut self, label: Label) {
        self.0 = self.0.max(label.0 as u64 + 1);
    }

    /// Are there labels left to generate?
    pub fn has_next(&self) -> bool {
        self.0 <= u32::MAX as u64
    }
}

impl LabelGenerator for SequentialLabels {
    fn fresh_label(&mut self) -> Label {
        let to_return = match u32::try_from(self.0) {
            Ok(raw) => Label(raw),
            Err(_) => panic!("all {} labels are in use", self.0),
        };
        self.0 += 1;
        to_return
    }
}

/// Maps labels to the bytecode offset they have been placed at
///
/// A label starts out unplaced, and can be placed exactly once. Labels minted elsewhere (eg. by a
/// reader or a tree) can be placed too, and are never handed out again by
/// [`LabelResolver::new_label`].
#[derive(Clone, Debug, Default)]
pub struct LabelResolver {
    offsets: HashMap<Label, usize>,
    generator: SequentialLabels,
}

impl LabelResolver {
    pub fn new() -> LabelResolver {
        LabelResolver::default()
    }

    /// Fresh unplaced label
    pub fn new_label(&mut self) -> Label {
        self.generator.fresh_label()
    }

    /// Bind a label to an offset
    pub fn place(&mut self, label: Label, offset: usize) -> Result<(), Error> {
        if self.offsets.contains_key(&label) {
            return Err(Error::DoublePlacement(label));
        }
        self.generator.skip_past(label);
        self.offsets.insert(label, offset);
        Ok(())
    }

    /// Offset at which a label was placed
    pub fn offset_of(&self, label: Label) -> Result<usize, Error> {
        self.offsets
            .get(&label)
            .copied()
            .ok_or(Error::NotYetPlaced(label))
    }

    pub fn is_placed(&self, label: Label) -> bool {
        self.offsets.contains_key(&label)
    }

    /// Forget all placements (labels are scoped to one method)
    pub fn clear(&mut self) {
        self.offsets.clear();
    }
}

impl LabelGenerator for LabelResolver {
    fn fresh_label(&mut self) -> Label {
        self.new_label()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_lifecycle() {
        let mut resolver = LabelResolver::new();
        let label = resolver.new_label();
        assert!(!resolver.is_placed(label));
        assert!(matches!(resolver.offset_of(label), Err(Error::NotYetPlaced(l)) if l == label));

        resolver.place(label, 17).unwrap();
        assert!(resolver.is_placed(label));
        assert_eq!(resolver.offset_of(label).unwrap(), 17);

        assert!(matches!(resolver.place(label, 18), Err(Error::DoublePlacement(l)) if l == label));
        assert_eq!(resolver.offset_of(label).unwrap(), 17);
    }

    #[test]
    fn skipping_past_the_last_label() {
        let mut labels = SequentialLabels::new();
        labels.skip_past(Label::from_raw(u32::MAX - 1));
        assert_eq!(labels.fresh_label(), Label::from_raw(u32::MAX));
        assert!(!labels.has_next());

        let mut labels = SequentialLabels::new();
        labels.skip_past(Label::from_raw(u32::MAX));
        labels.skip_past(Label::from_raw(3));
        assert!(!labels.has_next());
    }

    #[test]
    #[should_panic]
    fn exhausted_generator_panics() {
        let mut labels = SequentialLabels::new();
        labels.skip_past(Label::from_raw(u32::MAX));
        labels.fresh_label();
    }

    #[test]
    fn foreign_labels_are_not_reissued() {
        let mut resolver = LabelResolver::new();
        resolver.place(Label::from_raw(5), 0).unwrap();
        let fresh = resolver.new_label();
        assert_eq!(fresh, Label::from_raw(6));
    }
}

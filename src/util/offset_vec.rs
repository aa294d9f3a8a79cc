use std::fmt;
use std::iter::{Enumerate, FromIterator};
use std::slice;

/// Number of slots a value occupies
///
/// Category 2 values (`long` and `double`) take two constant pool indices, two local variable
/// slots, and two operand stack slots. Everything else takes one.
pub trait Width {
    fn width(&self) -> usize;
}

/// Position measured in slots rather than in elements
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Offset(pub usize);

/// Vector addressed by slot offsets, where each element covers `width()` slots
///
/// Used for the constant pool (which starts at offset 1) and for the locals and stack of frames.
#[derive(Clone)]
pub struct OffsetVec<T> {
    /// Elements along with the offset of their first slot
    entries: Vec<(Offset, T)>,

    /// Offset the next element will land at
    next_offset: Offset,
}

/// Outcome of looking an element up by offset
pub enum OffsetResult<'a, T> {
    /// Element at this position, starting exactly at the offset
    Ok(usize, &'a T),

    /// Offset points into the second slot of the element at this position (or before the start)
    InvalidOffset(usize),

    /// Offset is past the last element
    TooLarge,
}

impl<'a, T> OffsetResult<'a, T> {
    pub fn ok(&self) -> Option<&'a T> {
        match self {
            OffsetResult::Ok(_, found) => Some(found),
            OffsetResult::InvalidOffset(_) | OffsetResult::TooLarge => None,
        }
    }
}

impl<T: Width> OffsetVec<T> {
    pub fn new() -> OffsetVec<T> {
        OffsetVec::new_starting_at(Offset(0))
    }

    pub fn new_starting_at(first_offset: Offset) -> OffsetVec<T> {
        OffsetVec {
            entries: vec![],
            next_offset: first_offset,
        }
    }

    /// Number of elements (not slots)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offset the next element will land at
    pub fn offset_len(&self) -> Offset {
        self.next_offset
    }

    /// Append an element, returning its offset
    pub fn push(&mut self, element: T) -> Offset {
        let offset = self.next_offset;
        self.next_offset.0 += element.width();
        self.entries.push((offset, element));
        offset
    }

    /// Find the element starting at an offset (binary search, offsets are increasing)
    pub fn get_offset(&self, offset: Offset) -> OffsetResult<'_, T> {
        match self.entries.binary_search_by_key(&offset, |(start, _)| *start) {
            Ok(position) => OffsetResult::Ok(position, &self.entries[position].1),
            Err(position) if position == self.entries.len() => OffsetResult::TooLarge,
            Err(position) => OffsetResult::InvalidOffset(position),
        }
    }

    /// Elements as `(offset, position, element)`
    pub fn iter(&self) -> Entries<'_, T> {
        Entries(self.entries.iter().enumerate())
    }
}

pub struct Entries<'a, T>(Enumerate<slice::Iter<'a, (Offset, T)>>);

impl<'a, T> Iterator for Entries<'a, T> {
    type Item = (Offset, usize, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let (position, (offset, element)) = self.0.next()?;
        Some((*offset, position, element))
    }
}

impl<T: Width> FromIterator<T> for OffsetVec<T> {
    fn from_iter<I: IntoIterator<Item = T>>(elements: I) -> OffsetVec<T> {
        let mut vec = OffsetVec::new();
        for element in elements {
            vec.push(element);
        }
        vec
    }
}

impl<T: Width> Default for OffsetVec<T> {
    fn default() -> OffsetVec<T> {
        OffsetVec::new()
    }
}

impl<T: PartialEq> PartialEq for OffsetVec<T> {
    fn eq(&self, other: &OffsetVec<T>) -> bool {
        self.entries == other.entries
    }
}

impl<T: Eq> Eq for OffsetVec<T> {}

impl<T: fmt::Debug> fmt::Debug for OffsetVec<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_list()
            .entries(
                self.entries
                    .iter()
                    .map(|(offset, element)| format!("#{} = {:?}", offset.0, element)),
            )
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    enum Slot {
        Narrow(u8),
        Wide(u8),
    }

    impl Width for Slot {
        fn width(&self) -> usize {
            match self {
                Slot::Narrow(_) => 1,
                Slot::Wide(_) => 2,
            }
        }
    }

    #[test]
    fn offsets_account_for_width() {
        let slots: OffsetVec<Slot> = vec![Slot::Narrow(1), Slot::Wide(2), Slot::Narrow(3)]
            .into_iter()
            .collect();
        assert_eq!(
            slots.iter().map(|(off, idx, s)| (off, idx, *s)).collect::<Vec<_>>(),
            vec![
                (Offset(0), 0, Slot::Narrow(1)),
                (Offset(1), 1, Slot::Wide(2)),
                (Offset(3), 2, Slot::Narrow(3)),
            ]
        );
        assert_eq!(slots.offset_len(), Offset(4));
    }

    #[test]
    fn lookup_by_offset() {
        let mut pool: OffsetVec<Slot> = OffsetVec::new_starting_at(Offset(1));
        pool.push(Slot::Wide(7));
        pool.push(Slot::Narrow(8));

        assert_eq!(pool.get_offset(Offset(1)).ok(), Some(&Slot::Wide(7)));
        assert!(matches!(
            pool.get_offset(Offset(2)),
            OffsetResult::InvalidOffset(1)
        ));
        assert_eq!(pool.get_offset(Offset(3)).ok(), Some(&Slot::Narrow(8)));
        assert!(matches!(pool.get_offset(Offset(4)), OffsetResult::TooLarge));
        assert!(matches!(pool.get_offset(Offset(0)), OffsetResult::InvalidOffset(0)));
    }
}

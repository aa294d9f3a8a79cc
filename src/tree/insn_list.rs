use crate::code::{FrameKind, FrameType, Insn, Label};
use crate::Error;

/// Stable handle to a node in an [`InsnList`]
///
/// Handles stay valid across insertions and removals of other nodes. Once the node itself is
/// removed, the handle is dead for good: its storage may be reused, but under a new generation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InsnId {
    index: usize,
    generation: u32,
}

/// Element of a method's instruction sequence
#[derive(Debug, Clone, PartialEq)]
pub enum InsnNode {
    Insn(Insn),

    /// Position marker that jumps, switches, exception ranges, and debug info can refer to
    Label(Label),

    /// Stack map frame describing the position it is placed at
    Frame(FrameNode),
}

impl InsnNode {
    pub fn as_insn(&self) -> Option<&Insn> {
        match self {
            InsnNode::Insn(insn) => Some(insn),
            _ => None,
        }
    }
}

impl From<Insn> for InsnNode {
    fn from(insn: Insn) -> InsnNode {
        InsnNode::Insn(insn)
    }
}

/// Stack map frame as received from a `visit_frame` event
#[derive(Debug, Clone, PartialEq)]
pub struct FrameNode {
    pub kind: FrameKind,
    pub locals: Vec<FrameType>,
    pub stack: Vec<FrameType>,
}

#[derive(Debug, Clone)]
struct Slot {
    node: InsnNode,
    prev: Option<InsnId>,
    next: Option<InsnId>,
}

/// Storage cell, bumped to a new generation every time its node is removed
#[derive(Debug, Clone)]
struct Cell {
    generation: u32,
    slot: Option<Slot>,
}

/// Doubly linked sequence of instruction nodes
///
/// Nodes live in an arena and link to their neighbours by handle, so edits are addressed by node
/// identity rather than by position.
#[derive(Debug, Clone, Default)]
pub struct InsnList {
    cells: Vec<Cell>,

    /// Indices of empty cells
    free: Vec<usize>,
    first: Option<InsnId>,
    last: Option<InsnId>,
    len: usize,
}

impl InsnList {
    pub fn new() -> InsnList {
        InsnList::default()
    }

    /// Number of nodes currently in the list
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn first(&self) -> Option<InsnId> {
        self.first
    }

    pub fn last(&self) -> Option<InsnId> {
        self.last
    }

    pub fn contains(&self, id: InsnId) -> bool {
        self.slot(id).is_ok()
    }

    fn slot(&self, id: InsnId) -> Result<&Slot, Error> {
        self.cells
            .get(id.index)
            .filter(|cell| cell.generation == id.generation)
            .and_then(|cell| cell.slot.as_ref())
            .ok_or(Error::NoSuchNode(id))
    }

    fn slot_mut(&mut self, id: InsnId) -> Result<&mut Slot, Error> {
        self.cells
            .get_mut(id.index)
            .filter(|cell| cell.generation == id.generation)
            .and_then(|cell| cell.slot.as_mut())
            .ok_or(Error::NoSuchNode(id))
    }

    /// Number of cells allocated, live or free
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    pub fn get(&self, id: InsnId) -> Result<&InsnNode, Error> {
        Ok(&self.slot(id)?.node)
    }

    pub fn get_mut(&mut self, id: InsnId) -> Result<&mut InsnNode, Error> {
        Ok(&mut self.slot_mut(id)?.node)
    }

    /// Node following `id`, if any
    pub fn next(&self, id: InsnId) -> Result<Option<InsnId>, Error> {
        Ok(self.slot(id)?.next)
    }

    /// Node preceding `id`, if any
    pub fn prev(&self, id: InsnId) -> Result<Option<InsnId>, Error> {
        Ok(self.slot(id)?.prev)
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: self.first,
        }
    }

    fn alloc(&mut self, node: InsnNode, prev: Option<InsnId>, next: Option<InsnId>) -> InsnId {
        let slot = Some(Slot { node, prev, next });
        let id = match self.free.pop() {
            Some(index) => {
                let cell = &mut self.cells[index];
                cell.slot = slot;
                InsnId {
                    index,
                    generation: cell.generation,
                }
            }
            None => {
                self.cells.push(Cell {
                    generation: 0,
                    slot,
                });
                InsnId {
                    index: self.cells.len() - 1,
                    generation: 0,
                }
            }
        };
        self.len += 1;

        match prev {
            Some(prev) => self.link_next(prev, Some(id)),
            None => self.first = Some(id),
        }
        match next {
            Some(next) => self.link_prev(next, Some(id)),
            None => self.last = Some(id),
        }
        id
    }

    // Only called with live handles
    fn link_next(&mut self, id: InsnId, next: Option<InsnId>) {
        if let Ok(slot) = self.slot_mut(id) {
            slot.next = next;
        }
    }

    fn link_prev(&mut self, id: InsnId, prev: Option<InsnId>) {
        if let Ok(slot) = self.slot_mut(id) {
            slot.prev = prev;
        }
    }

    pub fn push_back(&mut self, node: impl Into<InsnNode>) -> InsnId {
        let last = self.last;
        self.alloc(node.into(), last, None)
    }

    pub fn push_front(&mut self, node: impl Into<InsnNode>) -> InsnId {
        let first = self.first;
        self.alloc(node.into(), None, first)
    }

    /// Insert a node right before an existing one
    pub fn insert_before(
        &mut self,
        before: InsnId,
        node: impl Into<InsnNode>,
    ) -> Result<InsnId, Error> {
        let prev = self.slot(before)?.prev;
        Ok(self.alloc(node.into(), prev, Some(before)))
    }

    /// Insert a node right after an existing one
    pub fn insert_after(
        &mut self,
        after: InsnId,
        node: impl Into<InsnNode>,
    ) -> Result<InsnId, Error> {
        let next = self.slot(after)?.next;
        Ok(self.alloc(node.into(), Some(after), next))
    }

    /// Remove a node, returning it
    ///
    /// Removing a label does not touch anything that still refers to it.
    pub fn remove(&mut self, id: InsnId) -> Result<InsnNode, Error> {
        self.slot(id)?;
        let cell = &mut self.cells[id.index];
        let slot = cell.slot.take().ok_or(Error::NoSuchNode(id))?;
        cell.generation = cell.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;

        match slot.prev {
            Some(prev) => self.link_next(prev, slot.next),
            None => self.first = slot.next,
        }
        match slot.next {
            Some(next) => self.link_prev(next, slot.prev),
            None => self.last = slot.prev,
        }
        Ok(slot.node)
    }

    /// Swap the node at `id` for another one, returning the old node
    ///
    /// The handle keeps pointing at the same position.
    pub fn replace(&mut self, id: InsnId, node: impl Into<InsnNode>) -> Result<InsnNode, Error> {
        let slot = self.slot_mut(id)?;
        Ok(std::mem::replace(&mut slot.node, node.into()))
    }
}

/// Iterator over the nodes of an [`InsnList`], in order
pub struct Iter<'a> {
    list: &'a InsnList,
    cursor: Option<InsnId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (InsnId, &'a InsnNode);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let slot = self.list.slot(id).ok()?;
        self.cursor = slot.next;
        Some((id, &slot.node))
    }
}

impl<'a> IntoIterator for &'a InsnList {
    type Item = (InsnId, &'a InsnNode);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::opcodes::*;
    use crate::code::Encoding;

    fn opcodes(list: &InsnList) -> Vec<u8> {
        list.iter()
            .filter_map(|(_, node)| node.as_insn().map(Insn::opcode))
            .collect()
    }

    #[test]
    fn edits_by_identity() {
        let mut list = InsnList::new();
        let load = list.push_back(Insn::Var {
            opcode: ALOAD,
            var: 0,
            encoding: Encoding::Compact,
        });
        let ret = list.push_back(Insn::Simple(ARETURN));
        list.insert_after(load, Insn::Simple(DUP)).unwrap();
        let nop = list.push_front(Insn::Simple(NOP));
        list.insert_before(ret, Insn::Simple(POP)).unwrap();
        assert_eq!(opcodes(&list), vec![NOP, ALOAD, DUP, POP, ARETURN]);

        assert!(matches!(list.remove(nop).unwrap(), InsnNode::Insn(Insn::Simple(NOP))));
        assert_eq!(list.first(), Some(load));
        assert_eq!(list.prev(load).unwrap(), None);

        list.replace(ret, Insn::Simple(RETURN)).unwrap();
        assert_eq!(list.last(), Some(ret));
        assert_eq!(opcodes(&list), vec![ALOAD, DUP, POP, RETURN]);
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn stale_handles_are_rejected() {
        let mut list = InsnList::new();
        let only = list.push_back(Insn::Simple(NOP));
        list.remove(only).unwrap();
        assert!(list.is_empty());
        assert_eq!(list.first(), None);
        assert_eq!(list.last(), None);

        assert!(matches!(list.get(only), Err(Error::NoSuchNode(id)) if id == only));
        assert!(matches!(list.remove(only), Err(Error::NoSuchNode(_))));
        assert!(matches!(
            list.insert_after(only, Insn::Simple(NOP)),
            Err(Error::NoSuchNode(_))
        ));

        // The storage gets reused, the handle does not
        let fresh = list.push_back(Insn::Simple(NOP));
        assert_ne!(fresh, only);
        assert!(matches!(list.get(only), Err(Error::NoSuchNode(_))));
        assert!(list.get(fresh).is_ok());
    }

    #[test]
    fn removed_storage_is_reused() {
        let mut list = InsnList::new();
        let first = list.push_back(Insn::Simple(NOP));
        for _ in 0..1000 {
            let added = list.insert_after(first, Insn::Simple(POP)).unwrap();
            list.remove(added).unwrap();
        }
        assert_eq!(list.len(), 1);
        assert_eq!(list.capacity(), 2);
        assert_eq!(opcodes(&list), vec![NOP]);
    }
}

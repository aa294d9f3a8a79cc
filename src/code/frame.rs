use crate::class_file::VerificationType;
use crate::code::Label;
use crate::util::OffsetVec;

/// Verification type in structural events: classes by internal name, uninitialized objects by
/// the label of their `new` instruction
pub type FrameType = VerificationType<String, Label>;

/// How a stack map frame relates to the frame before it
///
/// The locals and stack that come along with a frame event are interpreted according to the kind:
///
///   - `Full`: all locals and all stack entries
///   - `Append`: the 1 to 3 locals added to the previous frame, stack is empty
///   - `Chop(k)`: no locals or stack, the last `k` locals of the previous frame are removed
///   - `Same`: no locals or stack
///   - `SameLocals1StackItem`: no locals, exactly one stack entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Full,
    Append,
    Chop(u8),
    Same,
    SameLocals1StackItem,
}

/// Snapshot of the stack and local variables at a point in the bytecode
///
/// Like in the class file, a `long` or `double` is one entry that takes two slots.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Frame {
    /// Local variables in scope
    pub locals: OffsetVec<FrameType>,

    /// Types of values on the stack
    pub stack: OffsetVec<FrameType>,
}

impl Frame {
    /// Compute the most compact frame kind that describes this frame given the previous one
    ///
    /// Returns the kind along with the locals and stack entries that go with it.
    pub fn compress(&self, previous_frame: &Frame) -> (FrameKind, Vec<FrameType>, Vec<FrameType>) {
        let this_locals: Vec<&FrameType> = self.locals.iter().map(|(_, _, t)| t).collect();
        let prev_locals: Vec<&FrameType> = previous_frame.locals.iter().map(|(_, _, t)| t).collect();

        match self.stack.len() {
            0 => {
                if this_locals.len() <= prev_locals.len() {
                    let len_difference = prev_locals.len() - this_locals.len();
                    let this_is_prefix_of_prev = this_locals
                        .iter()
                        .zip(prev_locals.iter())
                        .all(|(t1, t2)| t1 == t2);

                    if len_difference < 4 && this_is_prefix_of_prev {
                        if len_difference == 0 {
                            return (FrameKind::Same, vec![], vec![]);
                        } else {
                            return (FrameKind::Chop(len_difference as u8), vec![], vec![]);
                        }
                    }
                } else if this_locals.len() - prev_locals.len() < 4 {
                    let prev_is_prefix_of_this = prev_locals
                        .iter()
                        .zip(this_locals.iter())
                        .all(|(t1, t2)| t1 == t2);

                    if prev_is_prefix_of_this {
                        let added = this_locals[prev_locals.len()..]
                            .iter()
                            .map(|t| (*t).clone())
                            .collect();
                        return (FrameKind::Append, added, vec![]);
                    }
                }
            }
            1 if this_locals == prev_locals => {
                let stack = self.stack.iter().map(|(_, _, t)| t.clone()).collect();
                return (FrameKind::SameLocals1StackItem, vec![], stack);
            }
            _ => (),
        }

        self.full()
    }

    /// Describe the frame with a `Full` frame kind
    pub fn full(&self) -> (FrameKind, Vec<FrameType>, Vec<FrameType>) {
        (
            FrameKind::Full,
            self.locals.iter().map(|(_, _, t)| t.clone()).collect(),
            self.stack.iter().map(|(_, _, t)| t.clone()).collect(),
        )
    }
}

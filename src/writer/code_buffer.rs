use crate::class_file::Serialize;
use crate::code::{Label, LabelResolver};
use crate::Error;
use byteorder::{BigEndian, ByteOrder};
use std::io;

/// Largest `code_length` the format allows
pub const MAX_CODE_LENGTH: usize = 65535;

/// Width of the relative offset a jump instruction encodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpWidth {
    /// `i16`, used by conditional jumps, `goto`, and `jsr`
    Narrow,

    /// `i32`, used by switches
    Wide,
}

/// Label reference waiting for the label to be placed
#[derive(Debug, Clone, Copy)]
struct Fixup {
    /// Where the offset goes in the code
    position: usize,

    /// Offset of the instruction the jump is relative to
    base: usize,
    label: Label,
    width: JumpWidth,
}

/// Bytecode of one method, with forward label references left as holes until the end
#[derive(Debug, Default)]
pub struct CodeBuffer {
    bytes: Vec<u8>,
    labels: LabelResolver,
    fixups: Vec<Fixup>,
}

impl CodeBuffer {
    pub fn new() -> CodeBuffer {
        CodeBuffer::default()
    }

    /// Offset the next instruction will be at
    pub fn offset(&self) -> usize {
        self.bytes.len()
    }

    pub fn push<S: Serialize>(&mut self, value: S) -> Result<(), Error> {
        value.serialize(&mut self.bytes)?;
        Ok(())
    }

    /// Zero bytes up to the next multiple of 4 (switch operands are aligned)
    pub fn pad_to_4(&mut self) {
        while self.bytes.len() % 4 != 0 {
            self.bytes.push(0);
        }
    }

    /// Mark the current offset with a label
    pub fn place_label(&mut self, label: Label) -> Result<(), Error> {
        let offset = self.offset();
        self.labels.place(label, offset)
    }

    /// Offset of a placed label, or `UnresolvedLabel`
    pub fn offset_of(&self, label: Label) -> Result<usize, Error> {
        self.labels
            .offset_of(label)
            .map_err(|_| Error::UnresolvedLabel(label))
    }

    /// Leave room for the offset from `base` to `label`
    pub fn push_jump_offset(&mut self, base: usize, label: Label, width: JumpWidth) {
        self.fixups.push(Fixup {
            position: self.bytes.len(),
            base,
            label,
            width,
        });
        let hole: &[u8] = match width {
            JumpWidth::Narrow => &[0; 2],
            JumpWidth::Wide => &[0; 4],
        };
        self.bytes.extend_from_slice(hole);
    }

    /// Fill in every jump offset, now that all labels should be placed
    pub fn resolve(&mut self) -> Result<&[u8], Error> {
        if self.bytes.len() > MAX_CODE_LENGTH {
            return Err(Error::CodeTooLarge(self.bytes.len()));
        }
        for fixup in std::mem::take(&mut self.fixups) {
            let target = self.offset_of(fixup.label)?;
            let delta = target as i64 - fixup.base as i64;
            let out_of_range = || Error::OffsetOutOfRange {
                label: fixup.label,
                delta,
            };
            match fixup.width {
                JumpWidth::Narrow => {
                    let delta = i16::try_from(delta).map_err(|_| out_of_range())?;
                    BigEndian::write_i16(&mut self.bytes[fixup.position..], delta);
                }
                JumpWidth::Wide => {
                    let delta = i32::try_from(delta).map_err(|_| out_of_range())?;
                    BigEndian::write_i32(&mut self.bytes[fixup.position..], delta);
                }
            }
        }
        log::trace!("resolved {} bytes of code", self.bytes.len());
        Ok(&self.bytes)
    }
}

/// Output buffer whose `u32` length fields get filled in after the content they measure
///
/// Lengths of attributes precede their contents, and the contents of a `Code` attribute aren't
/// final until its jumps are resolved. So lengths are left as holes, and patched in a separate
/// pass once everything has been written.
#[derive(Debug, Default)]
pub struct SegmentBuffer {
    bytes: Vec<u8>,

    /// Length holes for segments still being written
    open: Vec<usize>,

    /// Length holes along with the end of the segment they measure
    closed: Vec<(usize, usize)>,
}

impl SegmentBuffer {
    pub fn new() -> SegmentBuffer {
        SegmentBuffer::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn push<S: Serialize>(&mut self, value: S) -> Result<(), Error> {
        value.serialize(&mut self.bytes)?;
        Ok(())
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// Leave a `u32` hole for the length of what gets written until the matching `end_length`
    pub fn begin_length(&mut self) {
        self.open.push(self.bytes.len());
        self.bytes.extend_from_slice(&[0; 4]);
    }

    pub fn end_length(&mut self) {
        if let Some(hole) = self.open.pop() {
            self.closed.push((hole, self.bytes.len()));
        }
    }

    /// Patch all length holes and return the bytes
    pub fn finish(mut self) -> Result<Vec<u8>, Error> {
        for (hole, end) in std::mem::take(&mut self.closed) {
            let length = end - hole - 4;
            let length = u32::try_from(length).map_err(|_| Error::MalformedAttribute {
                name: "ClassFile",
                reason: format!("segment of {} bytes is too long", length),
            })?;
            BigEndian::write_u32(&mut self.bytes[hole..], length);
        }
        Ok(self.bytes)
    }
}

impl io::Write for SegmentBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

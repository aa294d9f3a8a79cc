use crate::Error;
use byteorder::{BigEndian, ByteOrder};

/// Cursor for decoding big-endian class file data out of an immutable buffer
///
/// Every read checks that enough bytes remain, so decoding malformed input fails with
/// [`Error::TruncatedInput`] instead of panicking. Sub-readers created with [`ByteReader::split`]
/// remember where they sit in the original buffer so error offsets stay meaningful.
#[derive(Clone, Copy, Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    position: usize,

    /// Offset of `data[0]` in the outermost buffer
    origin: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> ByteReader<'a> {
        ByteReader {
            data,
            position: 0,
            origin: 0,
        }
    }

    /// Position relative to the start of this reader
    pub fn position(&self) -> usize {
        self.position
    }

    /// Position relative to the start of the outermost buffer
    pub fn absolute_position(&self) -> usize {
        self.origin + self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Move to a position relative to the start of this reader
    pub fn seek(&mut self, position: usize) -> Result<(), Error> {
        if position > self.data.len() {
            return Err(Error::TruncatedInput {
                offset: self.origin + position,
                needed: position - self.data.len(),
                remaining: 0,
            });
        }
        self.position = position;
        Ok(())
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], Error> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(Error::TruncatedInput {
                offset: self.absolute_position(),
                needed,
                remaining,
            });
        }
        let start = self.position;
        self.position += needed;
        Ok(&self.data[start..self.position])
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, Error> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16, Error> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    pub fn read_i16(&mut self) -> Result<i16, Error> {
        Ok(BigEndian::read_i16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, Error> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    pub fn read_i32(&mut self) -> Result<i32, Error> {
        Ok(BigEndian::read_i32(self.take(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64, Error> {
        Ok(BigEndian::read_u64(self.take(8)?))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], Error> {
        self.take(len)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), Error> {
        self.take(len).map(|_| ())
    }

    /// Split off the next `len` bytes into their own reader, advancing past them
    pub fn split(&mut self, len: usize) -> Result<ByteReader<'a>, Error> {
        let origin = self.absolute_position();
        let data = self.take(len)?;
        Ok(ByteReader {
            data,
            position: 0,
            origin,
        })
    }
}

/// Counterpart of [`Serialize`](crate::class_file::Serialize) for decoding
///
/// Sequences are prefixed with a `u16` count, same as when serializing.
pub trait Deserialize: Sized {
    fn deserialize(reader: &mut ByteReader<'_>) -> Result<Self, Error>;
}

impl Deserialize for u8 {
    fn deserialize(reader: &mut ByteReader<'_>) -> Result<Self, Error> {
        reader.read_u8()
    }
}

impl Deserialize for u16 {
    fn deserialize(reader: &mut ByteReader<'_>) -> Result<Self, Error> {
        reader.read_u16()
    }
}

impl Deserialize for u32 {
    fn deserialize(reader: &mut ByteReader<'_>) -> Result<Self, Error> {
        reader.read_u32()
    }
}

impl<A: Deserialize> Deserialize for Vec<A> {
    fn deserialize(reader: &mut ByteReader<'_>) -> Result<Self, Error> {
        let len = reader.read_u16()? as usize;
        let mut elems = Vec::with_capacity(len.min(reader.remaining()));
        for _ in 0..len {
            elems.push(A::deserialize(reader)?);
        }
        Ok(elems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian() {
        let mut reader = ByteReader::new(&[0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x34, 0xFF]);
        assert_eq!(reader.read_u32().unwrap(), 0xCAFEBABE);
        assert_eq!(reader.read_u16().unwrap(), 52);
        assert_eq!(reader.read_i8().unwrap(), -1);
        assert!(reader.is_empty());
    }

    #[test]
    fn truncation_is_reported_with_absolute_offset() {
        let mut reader = ByteReader::new(&[0, 1, 2, 3, 4]);
        reader.skip(1).unwrap();
        let mut sub = reader.split(3).unwrap();
        sub.skip(2).unwrap();
        match sub.read_u16() {
            Err(Error::TruncatedInput {
                offset,
                needed,
                remaining,
            }) => {
                assert_eq!(offset, 3);
                assert_eq!(needed, 2);
                assert_eq!(remaining, 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}

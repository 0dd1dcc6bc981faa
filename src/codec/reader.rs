use std::io::Read;

use byteorder::{ByteOrder, LittleEndian};
use flate2::read::ZlibDecoder;

use crate::error::{Error, Result};
use super::types::Tag;

/// Binary reader for plugin data
///
/// `base` is the absolute file offset of `data[0]`. Readers over record
/// bodies and inflated buffers keep it so errors still point into the file.
pub struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0, base: 0 }
    }

    pub fn with_base(data: &'a [u8], base: usize) -> Self {
        Self { data, pos: 0, base }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn remaining_slice(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Position relative to the start of this reader's buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Absolute offset of the cursor.
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn truncated(&self, needed: usize) -> Error {
        Error::Truncation {
            offset: self.offset(),
            needed,
            available: self.remaining(),
        }
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        if self.remaining() < n {
            return Err(self.truncated(n));
        }
        self.pos += n;
        Ok(())
    }

    /// Push the cursor back by `n` bytes so they are read again.
    ///
    /// Used to back out of a header lookahead that turned out to belong to
    /// the next sibling.
    pub fn unread(&mut self, n: usize) -> Result<()> {
        if n > self.pos {
            return Err(Error::corrupt(
                self.offset(),
                format!("cannot unread {n} bytes, only {} consumed", self.pos),
            ));
        }
        self.pos -= n;
        Ok(())
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(self.truncated(n));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.read_bytes(2)?))
    }

    pub fn read_i16_le(&mut self) -> Result<i16> {
        Ok(self.read_u16_le()? as i16)
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.read_bytes(4)?))
    }

    pub fn read_i32_le(&mut self) -> Result<i32> {
        Ok(self.read_u32_le()? as i32)
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.read_bytes(8)?))
    }

    pub fn read_f32_le(&mut self) -> Result<f32> {
        Ok(LittleEndian::read_f32(self.read_bytes(4)?))
    }

    /// Read a record or subrecord tag (stored byte-swapped relative to the
    /// little-endian integers around it).
    pub fn read_tag(&mut self) -> Result<Tag> {
        Ok(Tag::from_le_u32(self.read_u32_le()?))
    }

    pub fn peek_tag(&self) -> Result<Tag> {
        if self.remaining() < 4 {
            return Err(self.truncated(4));
        }
        let bytes = &self.data[self.pos..self.pos + 4];
        Ok(Tag::new(&[bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a NUL-terminated string, consuming the terminator.
    ///
    /// Strings are single-byte code page text; each byte maps to the char
    /// with the same code point so writing it back is lossless.
    pub fn read_zstring(&mut self) -> Result<String> {
        let rest = self.remaining_slice();
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| self.truncated(rest.len() + 1))?;
        let text = decode_latin1(&rest[..end]);
        self.pos += end + 1;
        Ok(text)
    }

    /// Inflate a compressed block of `len` bytes laid out as
    /// `{decompressed_size: u32, zlib stream}`.
    pub fn inflate(&mut self, len: usize) -> Result<InflatedBuffer> {
        let start = self.offset();
        if len < 4 {
            return Err(Error::corrupt(start, format!("compressed block of {len} bytes has no size prefix")));
        }
        let expected = self.read_u32_le()? as usize;
        let compressed = self.read_bytes(len - 4)?;

        let mut data = Vec::new();
        ZlibDecoder::new(compressed)
            .take(expected as u64 + 1)
            .read_to_end(&mut data)
            .map_err(|e| Error::corrupt(start, format!("zlib error: {e}")))?;
        if data.len() != expected {
            return Err(Error::corrupt(
                start,
                format!("inflated {} bytes, header declared {expected}", data.len()),
            ));
        }
        Ok(InflatedBuffer { data, base: start })
    }
}

/// Owned output of [`BinaryReader::inflate`]; lives for one record load.
#[derive(Debug)]
pub struct InflatedBuffer {
    data: Vec<u8>,
    base: usize,
}

impl InflatedBuffer {
    /// Reader over the inflated bytes. Offsets inside are reported relative
    /// to the compressed block's position in the file.
    pub fn reader(&self) -> BinaryReader<'_> {
        BinaryReader::with_base(&self.data, self.base)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

pub(crate) fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{Error, Result};
use super::types::Tag;

/// Binary writer for plugin data
pub struct BinaryWriter {
    data: Vec<u8>,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { data: Vec::with_capacity(capacity) }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.data.push(v);
    }

    pub fn write_u16_le(&mut self, v: u16) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i16_le(&mut self, v: i16) {
        self.write_u16_le(v as u16);
    }

    pub fn write_u32_le(&mut self, v: u32) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i32_le(&mut self, v: i32) {
        self.write_u32_le(v as u32);
    }

    pub fn write_u32_be(&mut self, v: u32) {
        self.data.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u64_le(&mut self, v: u64) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f32_le(&mut self, v: f32) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_tag(&mut self, tag: Tag) {
        self.data.extend_from_slice(&tag.to_bytes());
    }

    /// Write a NUL-terminated single-byte string.
    pub fn write_zstring(&mut self, s: &str) -> Result<()> {
        let bytes = encode_latin1(s)?;
        self.write_bytes(&bytes);
        self.write_u8(0);
        Ok(())
    }

    /// Compress `body` as `{decompressed_size: u32, zlib stream}`.
    pub fn deflate(&mut self, body: &[u8], level: Compression) -> Result<()> {
        let size = u32::try_from(body.len()).map_err(|_| {
            Error::InvalidArgument(format!("{} bytes is too large to compress", body.len()))
        })?;
        self.write_u32_le(size);
        let mut encoder = ZlibEncoder::new(&mut self.data, level);
        encoder.write_all(body)?;
        encoder.finish()?;
        Ok(())
    }
}

impl Default for BinaryWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl From<BinaryWriter> for Vec<u8> {
    fn from(writer: BinaryWriter) -> Self {
        writer.into_vec()
    }
}

/// Encode text for a NUL-terminated field. Rejects embedded NULs and chars
/// outside the single-byte range.
pub(crate) fn encode_latin1(s: &str) -> Result<Vec<u8>> {
    s.chars()
        .map(|c| match u8::try_from(u32::from(c)) {
            Ok(0) => Err(Error::InvalidArgument(format!("string {s:?} contains NUL"))),
            Ok(b) => Ok(b),
            Err(_) => Err(Error::InvalidArgument(format!(
                "character {c:?} in {s:?} has no single-byte encoding"
            ))),
        })
        .collect()
}

//! Subrecord scanning and emission.
//!
//! A record body is a run of `{tag: [u8; 4], size: u16, payload}` units.
//! [`SubrecordScanner`] walks one body; the byte count consumed is always the
//! reader position, so there is no per-field size arithmetic to drift.
//! [`SubrecordSink`] is the writing mirror.

use crate::codec::{BinaryReader, BinaryWriter, Tag};
use crate::error::{Error, Result};

/// Header of one subrecord.
///
/// `size` is 16-bit on disk; it is widened here because an `XXXX` marker can
/// carry the real size of the subrecord that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubrecordHeader {
    pub tag: Tag,
    pub size: u32,
}

impl SubrecordHeader {
    pub const SIZE: usize = 6;
}

/// A subrecord kept verbatim because no field of its record models it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSubrecord {
    pub tag: Tag,
    pub data: Vec<u8>,
    /// Position among all subrecords of the record it was read from.
    pub(crate) ordinal: usize,
}

impl RawSubrecord {
    pub fn new(tag: Tag, data: Vec<u8>) -> Self {
        Self { tag, data, ordinal: usize::MAX }
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }
}

/// Walks the subrecords of one record body.
///
/// The reader handed in is bounded to exactly the record's data size, so a
/// field can never read into the next record.
pub struct SubrecordScanner<'a> {
    reader: BinaryReader<'a>,
    count: usize,
    localized: bool,
}

impl<'a> SubrecordScanner<'a> {
    pub fn new(body: BinaryReader<'a>, localized: bool) -> Self {
        Self { reader: body, count: 0, localized }
    }

    /// Bytes consumed from the body so far.
    pub fn consumed(&self) -> usize {
        self.reader.position()
    }

    pub fn data_size(&self) -> usize {
        self.reader.len()
    }

    /// Number of subrecord headers read so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Whether name fields hold string-table ids instead of inline text.
    pub fn localized(&self) -> bool {
        self.localized
    }

    pub fn reader(&mut self) -> &mut BinaryReader<'a> {
        &mut self.reader
    }

    /// Next subrecord header, or `None` once the body is used up exactly.
    pub fn next_header(&mut self) -> Result<Option<SubrecordHeader>> {
        if self.reader.is_empty() {
            return Ok(None);
        }
        self.read_header().map(Some)
    }

    /// Read a companion subrecord that must directly follow the current one.
    pub fn expect(&mut self, tag: Tag) -> Result<SubrecordHeader> {
        let offset = self.reader.offset();
        if self.reader.is_empty() {
            return Err(Error::corrupt(offset, format!("missing {tag} subrecord")));
        }
        let header = self.read_header()?;
        if header.tag != tag {
            return Err(Error::corrupt(
                offset,
                format!("expected {tag} subrecord, found {}", header.tag),
            ));
        }
        Ok(header)
    }

    fn read_header(&mut self) -> Result<SubrecordHeader> {
        let offset = self.reader.offset();
        let mut tag = self.reader.read_tag()?;
        let mut size = self.reader.read_u16_le()? as u32;
        if tag == Tag::XXXX {
            if size != 4 {
                return Err(Error::corrupt(offset, format!("XXXX subrecord of size {size}")));
            }
            let real_size = self.reader.read_u32_le()?;
            tag = self.reader.read_tag()?;
            let _ = self.reader.read_u16_le()?;
            size = real_size;
        }
        self.count += 1;
        Ok(SubrecordHeader { tag, size })
    }

    /// Take the payload of `header` verbatim, advancing by its declared size.
    pub fn capture(&mut self, header: SubrecordHeader) -> Result<RawSubrecord> {
        let data = self.reader.read_bytes(header.size as usize)?.to_vec();
        Ok(RawSubrecord {
            tag: header.tag,
            data,
            ordinal: self.count - 1,
        })
    }

    /// Skip the payload of `header` without looking at it.
    pub fn skip(&mut self, header: SubrecordHeader) -> Result<()> {
        self.reader.skip(header.size as usize)
    }

    /// Read the whole payload as raw bytes.
    pub fn payload(&mut self, header: SubrecordHeader) -> Result<&'a [u8]> {
        self.reader.read_bytes(header.size as usize)
    }
}

/// Writes subrecords back out, putting captured raw subrecords back at the
/// positions they were read from.
pub struct SubrecordSink<'a> {
    out: BinaryWriter,
    pending: &'a [RawSubrecord],
    next_pending: usize,
    written: usize,
}

impl<'a> SubrecordSink<'a> {
    /// `extra` must be ordered by ordinal, as the scanner produces it.
    pub fn new(extra: &'a [RawSubrecord]) -> Self {
        Self {
            out: BinaryWriter::new(),
            pending: extra,
            next_pending: 0,
            written: 0,
        }
    }

    /// Write one modeled subrecord; `write` fills in the payload.
    pub fn field<F>(&mut self, tag: Tag, write: F) -> Result<()>
    where
        F: FnOnce(&mut BinaryWriter) -> Result<()>,
    {
        self.flush_pending(false)?;
        let mut payload = BinaryWriter::new();
        write(&mut payload)?;
        self.emit(tag, payload.as_slice())
    }

    /// Write a raw subrecord immediately.
    pub fn raw(&mut self, raw: &RawSubrecord) -> Result<()> {
        self.emit(raw.tag, &raw.data)
    }

    fn flush_pending(&mut self, all: bool) -> Result<()> {
        let pending = self.pending;
        while let Some(raw) = pending.get(self.next_pending) {
            if !all && raw.ordinal > self.written {
                break;
            }
            self.next_pending += 1;
            self.emit(raw.tag, &raw.data)?;
        }
        Ok(())
    }

    fn emit(&mut self, tag: Tag, data: &[u8]) -> Result<()> {
        match u16::try_from(data.len()) {
            Ok(size) => {
                self.out.write_tag(tag);
                self.out.write_u16_le(size);
            }
            Err(_) => {
                let size = u32::try_from(data.len()).map_err(|_| {
                    Error::InvalidArgument(format!("{tag} payload of {} bytes", data.len()))
                })?;
                self.out.write_tag(Tag::XXXX);
                self.out.write_u16_le(4);
                self.out.write_u32_le(size);
                self.out.write_tag(tag);
                self.out.write_u16_le(0);
            }
        }
        self.out.write_bytes(data);
        self.written += 1;
        Ok(())
    }

    /// Flush remaining raw subrecords and return the encoded body.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        self.flush_pending(true)?;
        Ok(self.out.into_vec())
    }
}

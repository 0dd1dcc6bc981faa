//! Records ("forms"): a fixed header followed by a run of subrecords.
//!
//! # Record layout
//!
//! ```text
//! [0x00] type      tag (4 ASCII bytes)
//! [0x04] dataSize  u32 LE - bytes of subrecord data after the header
//! [0x08] flags     u32 LE - bit 0x00040000 = body is zlib compressed
//! [0x0C] id        u32 LE - form id
//! [0x10] revision  u32 LE
//! [0x14] version   u16 LE  (24-byte layout only)
//! [0x16] unknown   u16 LE  (24-byte layout only)
//! ```
//!
//! A compressed body is `{decompressed_size: u32, zlib stream}` and the
//! subrecords live inside the inflated bytes.

mod color;
pub mod factory;
mod game_setting;
mod header;
mod object;
mod opaque;
pub mod subrecord;

pub use color::{Color, ColorForm};
pub use game_setting::{GameSettingForm, GameSettingValue};
pub use header::{HeaderData, HeaderForm};
pub use object::ObjectForm;
pub use opaque::OpaqueForm;
pub use subrecord::{RawSubrecord, SubrecordHeader, SubrecordScanner, SubrecordSink};

use tracing::{trace, warn};

use crate::codec::{BinaryReader, BinaryWriter, FormFlags, HeaderLayout, Tag};
use crate::config::{ReadContext, WriteContext};
use crate::error::{Error, Result};

/// Fixed header in front of every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormHeader {
    pub tag: Tag,
    pub data_size: u32,
    pub flags: FormFlags,
    pub id: u32,
    pub revision: u32,
    pub version: u16,
    pub unknown: u16,
}

impl FormHeader {
    pub fn new(tag: Tag, id: u32) -> Self {
        Self {
            tag,
            data_size: 0,
            flags: FormFlags::empty(),
            id,
            revision: 0,
            version: 0,
            unknown: 0,
        }
    }

    pub fn read(reader: &mut BinaryReader<'_>, layout: HeaderLayout) -> Result<Self> {
        let tag = reader.read_tag()?;
        let data_size = reader.read_u32_le()?;
        let flags = FormFlags::from_bits_retain(reader.read_u32_le()?);
        let id = reader.read_u32_le()?;
        let revision = reader.read_u32_le()?;
        let (version, unknown) = match layout {
            HeaderLayout::Oblivion => (0, 0),
            HeaderLayout::Skyrim => (reader.read_u16_le()?, reader.read_u16_le()?),
        };
        Ok(Self { tag, data_size, flags, id, revision, version, unknown })
    }

    pub fn write(&self, writer: &mut BinaryWriter, layout: HeaderLayout) {
        writer.write_tag(self.tag);
        writer.write_u32_le(self.data_size);
        writer.write_u32_le(self.flags.bits());
        writer.write_u32_le(self.id);
        writer.write_u32_le(self.revision);
        if layout == HeaderLayout::Skyrim {
            writer.write_u16_le(self.version);
            writer.write_u16_le(self.unknown);
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.flags.contains(FormFlags::COMPRESSED)
    }

    /// Set the body size, rejecting values the on-disk `u32` cannot hold.
    pub fn set_data_size(&mut self, size: usize) -> Result<()> {
        self.data_size = u32::try_from(size).map_err(|_| {
            Error::InvalidArgument(format!("record body of {size} bytes exceeds u32"))
        })?;
        Ok(())
    }
}

/// Per-kind subrecord codec.
pub trait FormCodec {
    /// Decode one subrecord. Returns `false` for tags this kind does not
    /// model; the scanner then keeps the payload verbatim.
    fn load_subrecord(
        &mut self,
        sub: SubrecordHeader,
        scanner: &mut SubrecordScanner<'_>,
    ) -> Result<bool>;

    /// Emit modeled subrecords in field-definition order.
    fn save_subrecords(&self, sink: &mut SubrecordSink<'_>) -> Result<()>;

    fn editor_id(&self) -> Option<&str> {
        None
    }
}

/// Decoded body of a record, one variant per record kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Form {
    Header(HeaderForm),
    Object(ObjectForm),
    GameSetting(GameSettingForm),
    Color(ColorForm),
    Opaque(OpaqueForm),
}

impl Form {
    fn codec(&self) -> &dyn FormCodec {
        match self {
            Form::Header(f) => f,
            Form::Object(f) => f,
            Form::GameSetting(f) => f,
            Form::Color(f) => f,
            Form::Opaque(f) => f,
        }
    }

    fn codec_mut(&mut self) -> &mut dyn FormCodec {
        match self {
            Form::Header(f) => f,
            Form::Object(f) => f,
            Form::GameSetting(f) => f,
            Form::Color(f) => f,
            Form::Opaque(f) => f,
        }
    }

    pub fn editor_id(&self) -> Option<&str> {
        self.codec().editor_id()
    }

    pub fn as_header(&self) -> Option<&HeaderForm> {
        match self {
            Form::Header(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_header_mut(&mut self) -> Option<&mut HeaderForm> {
        match self {
            Form::Header(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectForm> {
        match self {
            Form::Object(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_game_setting(&self) -> Option<&GameSettingForm> {
        match self {
            Form::GameSetting(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<&ColorForm> {
        match self {
            Form::Color(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_opaque(&self) -> Option<&OpaqueForm> {
        match self {
            Form::Opaque(f) => Some(f),
            _ => None,
        }
    }
}

/// Name field that is inline text, or a string-table id in localized files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalizedString {
    Inline(String),
    Id(u32),
}

impl LocalizedString {
    pub(crate) fn read(sub: SubrecordHeader, scanner: &mut SubrecordScanner<'_>) -> Result<Self> {
        if scanner.localized() && sub.size == 4 {
            Ok(Self::Id(scanner.reader().read_u32_le()?))
        } else {
            Ok(Self::Inline(scanner.reader().read_zstring()?))
        }
    }

    pub(crate) fn write(&self, writer: &mut BinaryWriter) -> Result<()> {
        match self {
            Self::Inline(s) => writer.write_zstring(s),
            Self::Id(id) => {
                writer.write_u32_le(*id);
                Ok(())
            }
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Inline(s) => Some(s),
            Self::Id(_) => None,
        }
    }
}

/// One record: header, decoded form, and any subrecords kept verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    header: FormHeader,
    form: Form,
    extra: Vec<RawSubrecord>,
    file_index: u8,
    offset: usize,
}

impl Record {
    /// Empty record of the kind registered for `header.tag`.
    pub fn new(header: FormHeader) -> Self {
        Self {
            header,
            form: factory::create(header.tag),
            extra: Vec::new(),
            file_index: 0,
            offset: 0,
        }
    }

    pub fn with_form(header: FormHeader, form: Form) -> Self {
        Self { header, form, extra: Vec::new(), file_index: 0, offset: 0 }
    }

    /// Read header and body. Exactly `data_size` bytes follow the header;
    /// any disagreement between that and the subrecords is corruption.
    pub fn read(reader: &mut BinaryReader<'_>, ctx: &ReadContext) -> Result<Self> {
        let offset = reader.offset();
        let header = FormHeader::read(reader, ctx.layout)?;
        let body_offset = reader.offset();
        let body = reader.read_bytes(header.data_size as usize)?;

        let mut record = Record {
            header,
            form: factory::create(header.tag),
            extra: Vec::new(),
            file_index: ctx.file_index,
            offset,
        };
        record
            .load_body(BinaryReader::with_base(body, body_offset), ctx.localized)
            .map_err(|e| e.in_record(header.tag, header.id, offset))?;
        trace!(tag = %header.tag, id = header.id, offset, size = header.data_size, "record");
        Ok(record)
    }

    fn load_body(&mut self, mut body: BinaryReader<'_>, localized: bool) -> Result<()> {
        if self.header.is_compressed() {
            let len = body.remaining();
            let inflated = body.inflate(len)?;
            self.scan(inflated.reader(), localized)
        } else {
            self.scan(body, localized)
        }
    }

    fn scan(&mut self, body: BinaryReader<'_>, localized: bool) -> Result<()> {
        let mut scanner = SubrecordScanner::new(body, localized);
        self.scan_subrecords(&mut scanner).map_err(|e| match e {
            Error::Truncation { offset, needed, available } => Error::corrupt(
                offset,
                format!(
                    "subrecord overruns record data: {needed} bytes needed, {available} left of {}",
                    scanner.data_size()
                ),
            ),
            other => other,
        })
    }

    fn scan_subrecords(&mut self, scanner: &mut SubrecordScanner<'_>) -> Result<()> {
        while let Some(sub) = scanner.next_header()? {
            let start = scanner.consumed();
            let count = scanner.count();
            if self.form.codec_mut().load_subrecord(sub, scanner)? {
                let used = scanner.consumed() - start;
                if scanner.count() == count && used != sub.size as usize {
                    warn!(
                        record = %self.header.tag,
                        subrecord = %sub.tag,
                        declared = sub.size,
                        used,
                        "subrecord size disagrees with its contents"
                    );
                }
            } else {
                self.extra.push(scanner.capture(sub)?);
            }
        }
        Ok(())
    }

    /// Encode the subrecords (uncompressed).
    pub fn body_bytes(&self) -> Result<Vec<u8>> {
        let mut sink = SubrecordSink::new(&self.extra);
        self.form.codec().save_subrecords(&mut sink)?;
        sink.finish()
    }

    /// Write header and body, recomputing `data_size` and compressing when
    /// the header is flagged.
    pub fn write(&self, writer: &mut BinaryWriter, ctx: &WriteContext) -> Result<()> {
        let body = self.body_bytes()?;
        let data = if self.header.is_compressed() {
            let mut packed = BinaryWriter::new();
            packed.deflate(&body, ctx.compression)?;
            packed.into_vec()
        } else {
            body
        };

        let mut header = self.header;
        header.set_data_size(data.len())?;
        header.write(writer, ctx.layout);
        writer.write_bytes(&data);
        Ok(())
    }

    pub fn header(&self) -> &FormHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut FormHeader {
        &mut self.header
    }

    pub fn tag(&self) -> Tag {
        self.header.tag
    }

    pub fn id(&self) -> u32 {
        self.header.id
    }

    pub fn flags(&self) -> FormFlags {
        self.header.flags
    }

    pub fn form(&self) -> &Form {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut Form {
        &mut self.form
    }

    /// Subrecords kept verbatim, in the order they were read.
    pub fn extra(&self) -> &[RawSubrecord] {
        &self.extra
    }

    pub fn editor_id(&self) -> Option<&str> {
        self.form.editor_id()
    }

    pub fn file_index(&self) -> u8 {
        self.file_index
    }

    /// File offset of the record header (0 for records built in memory).
    pub fn offset(&self) -> usize {
        self.offset
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a record with a hand-assembled body, bypassing the codecs.
    pub(crate) fn raw_record(tag: Tag, id: u32, flags: u32, body: &[u8]) -> Vec<u8> {
        let mut header = FormHeader::new(tag, id);
        header.flags = FormFlags::from_bits_retain(flags);
        header.set_data_size(body.len()).unwrap();
        let mut w = BinaryWriter::new();
        header.write(&mut w, HeaderLayout::Skyrim);
        w.write_bytes(body);
        w.into_vec()
    }

    pub(crate) fn subrecord(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = tag.to_vec();
        out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn read(bytes: &[u8]) -> Result<Record> {
        let mut reader = BinaryReader::new(bytes);
        Record::read(&mut reader, &ReadContext::new(HeaderLayout::Skyrim))
    }

    fn write(record: &Record) -> Vec<u8> {
        let mut w = BinaryWriter::new();
        record.write(&mut w, &WriteContext::new(HeaderLayout::Skyrim)).unwrap();
        w.into_vec()
    }

    #[test]
    fn test_form_header_layouts() {
        let mut header = FormHeader::new(Tag::new(b"STAT"), 0x0001_0203);
        header.revision = 9;
        header.version = 44;
        header.unknown = 1;

        let mut w = BinaryWriter::new();
        header.write(&mut w, HeaderLayout::Skyrim);
        assert_eq!(w.len(), 24);
        let bytes = w.into_vec();
        let back = FormHeader::read(&mut BinaryReader::new(&bytes), HeaderLayout::Skyrim).unwrap();
        assert_eq!(back, header);

        let mut w = BinaryWriter::new();
        header.write(&mut w, HeaderLayout::Oblivion);
        assert_eq!(w.len(), 20);
    }

    #[test]
    fn test_set_data_size_rejects_overflow() {
        let mut header = FormHeader::new(Tag::new(b"STAT"), 1);
        if usize::BITS > 32 {
            let err = header.set_data_size(u32::MAX as usize + 1).unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)));
        }
        header.set_data_size(12).unwrap();
        assert_eq!(header.data_size, 12);
    }

    #[test]
    fn test_object_roundtrip_with_unknown_subrecords() {
        let mut body = subrecord(b"EDID", b"IronSword\0");
        body.extend(subrecord(b"OBND", &[1; 12]));
        body.extend(subrecord(b"FULL", b"Iron Sword\0"));
        body.extend(subrecord(b"DATA", &[0, 0, 0, 0, 5, 0, 0, 0]));
        let bytes = raw_record(Tag::new(b"WEAP"), 0x0001_2EB7, 0, &body);

        let record = read(&bytes).unwrap();
        assert_eq!(record.editor_id(), Some("IronSword"));
        assert_eq!(record.extra().len(), 2);
        assert_eq!(write(&record), bytes);
    }

    #[test]
    fn test_data_size_one_byte_short() {
        let body = subrecord(b"EDID", b"Rock\0");
        let mut bytes = raw_record(Tag::new(b"STAT"), 5, 0, &body);
        bytes[4..8].copy_from_slice(&((body.len() - 1) as u32).to_le_bytes());

        let err = read(&bytes).unwrap_err();
        assert!(err.is_corrupt(), "{err}");
        assert_eq!(err.form_id(), Some(5));
    }

    #[test]
    fn test_data_size_one_byte_long() {
        let body = subrecord(b"EDID", b"Rock\0");
        let mut bytes = raw_record(Tag::new(b"STAT"), 5, 0, &body);
        bytes[4..8].copy_from_slice(&((body.len() + 1) as u32).to_le_bytes());
        // the extra byte belongs to whatever follows the record
        bytes.push(b'G');

        let err = read(&bytes).unwrap_err();
        assert!(err.is_corrupt(), "{err}");
        assert_eq!(err.form_id(), Some(5));
    }

    #[test]
    fn test_body_past_end_of_file_is_truncation() {
        let body = subrecord(b"EDID", b"Rock\0");
        let bytes = raw_record(Tag::new(b"STAT"), 5, 0, &body);
        let err = read(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(err.is_truncation(), "{err}");
    }

    #[test]
    fn test_compressed_record_roundtrip() {
        let mut body = subrecord(b"EDID", b"Whiterun\0");
        body.extend(subrecord(b"FULL", b"Whiterun Hold\0"));
        body.extend(subrecord(b"XCLL", &[3; 92]));
        let mut packed = BinaryWriter::new();
        packed.deflate(&body, flate2::Compression::default()).unwrap();
        let bytes = raw_record(Tag::new(b"CELL"), 0x3C, 0x0004_0000, packed.as_slice());

        let record = read(&bytes).unwrap();
        assert!(record.header().is_compressed());
        assert_eq!(record.editor_id(), Some("Whiterun"));
        assert_eq!(record.body_bytes().unwrap(), body);

        let again = read(&write(&record)).unwrap();
        assert_eq!(again.form(), record.form());
        assert_eq!(again.extra(), record.extra());
    }

    #[test]
    fn test_unknown_tag_is_opaque() {
        let mut body = subrecord(b"EDID", b"Thing\0");
        body.extend(subrecord(b"ZZZZ", &[1, 2, 3]));
        let bytes = raw_record(Tag::new(b"QQQQ"), 77, 0, &body);

        let record = read(&bytes).unwrap();
        let opaque = record.form().as_opaque().unwrap();
        assert_eq!(opaque.subrecords().len(), 2);
        assert!(record.extra().is_empty());
        assert_eq!(write(&record), bytes);
    }
}

//! TES4 file header record.
//!
//! ```text
//! HEDR  f32 version, u32 record count, u32 next object id
//! CNAM  author, NUL-terminated
//! SNAM  description, NUL-terminated
//! MAST  master file name, NUL-terminated   } repeated, one pair per master
//! DATA  u64 load-order tag                  }
//! ONAM  u32 overridden form ids, size / 4 of them
//! INTV  u32
//! INCC  u32
//! ```

use indexmap::IndexMap;
use tracing::warn;

use super::{FormCodec, SubrecordHeader, SubrecordScanner, SubrecordSink};
use crate::codec::Tag;
use crate::codec::writer::encode_latin1;
use crate::error::{Error, Result};

const HEDR: Tag = Tag::new(b"HEDR");
const CNAM: Tag = Tag::new(b"CNAM");
const SNAM: Tag = Tag::new(b"SNAM");
const MAST: Tag = Tag::new(b"MAST");
const DATA: Tag = Tag::new(b"DATA");
const ONAM: Tag = Tag::new(b"ONAM");
const INTV: Tag = Tag::new(b"INTV");
const INCC: Tag = Tag::new(b"INCC");

/// Contents of the HEDR subrecord.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeaderData {
    pub version: f32,
    pub record_count: u32,
    pub next_id: u32,
}

/// The TES4 record: file version, authorship and master list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderForm {
    hedr: Option<HeaderData>,
    author: Option<String>,
    description: Option<String>,
    masters: IndexMap<String, u64>,
    overrides: Option<Vec<u32>>,
    intv: Option<u32>,
    incc: Option<u32>,
}

impl HeaderForm {
    pub fn header_data(&self) -> Option<HeaderData> {
        self.hedr
    }

    pub fn version(&self) -> f32 {
        self.hedr.map_or(0.0, |h| h.version)
    }

    pub fn record_count(&self) -> u32 {
        self.hedr.map_or(0, |h| h.record_count)
    }

    pub fn next_id(&self) -> u32 {
        self.hedr.map_or(0, |h| h.next_id)
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Master files in load order, each with its 8-byte DATA tag.
    pub fn masters(&self) -> &IndexMap<String, u64> {
        &self.masters
    }

    pub fn overrides(&self) -> &[u32] {
        self.overrides.as_deref().unwrap_or(&[])
    }

    pub fn intv(&self) -> Option<u32> {
        self.intv
    }

    pub fn incc(&self) -> Option<u32> {
        self.incc
    }

    pub fn set_header_data(&mut self, data: HeaderData) {
        self.hedr = Some(data);
    }

    pub fn set_version(&mut self, version: f32) {
        self.hedr.get_or_insert(HeaderData { version, record_count: 0, next_id: 0 }).version = version;
    }

    pub fn set_record_count(&mut self, count: u32) {
        let version = self.version();
        self.hedr.get_or_insert(HeaderData { version, record_count: 0, next_id: 0 }).record_count = count;
    }

    pub fn set_next_id(&mut self, id: u32) {
        let version = self.version();
        self.hedr.get_or_insert(HeaderData { version, record_count: 0, next_id: 0 }).next_id = id;
    }

    pub fn set_author(&mut self, author: Option<&str>) -> Result<()> {
        self.author = checked(author)?;
        Ok(())
    }

    pub fn set_description(&mut self, description: Option<&str>) -> Result<()> {
        self.description = checked(description)?;
        Ok(())
    }

    /// Append a master, or update its tag if already listed.
    pub fn add_master(&mut self, name: &str, tag: u64) -> Result<()> {
        encode_latin1(name)?;
        if name.is_empty() {
            return Err(Error::InvalidArgument("empty master name".into()));
        }
        self.masters.insert(name.to_string(), tag);
        Ok(())
    }

    pub fn set_masters(&mut self, masters: IndexMap<String, u64>) -> Result<()> {
        for name in masters.keys() {
            encode_latin1(name)?;
        }
        self.masters = masters;
        Ok(())
    }

    pub fn set_overrides(&mut self, overrides: Vec<u32>) {
        self.overrides = Some(overrides);
    }

    pub fn set_intv(&mut self, value: Option<u32>) {
        self.intv = value;
    }

    pub fn set_incc(&mut self, value: Option<u32>) {
        self.incc = value;
    }
}

fn checked(text: Option<&str>) -> Result<Option<String>> {
    match text {
        Some(s) => {
            encode_latin1(s)?;
            Ok(Some(s.to_string()))
        }
        None => Ok(None),
    }
}

impl FormCodec for HeaderForm {
    fn load_subrecord(
        &mut self,
        sub: SubrecordHeader,
        scanner: &mut SubrecordScanner<'_>,
    ) -> Result<bool> {
        // a repeat of a single-valued field is kept raw so it is written back
        let repeated = match sub.tag {
            HEDR => self.hedr.is_some(),
            CNAM => self.author.is_some(),
            SNAM => self.description.is_some(),
            ONAM => self.overrides.is_some(),
            INTV => self.intv.is_some(),
            INCC => self.incc.is_some(),
            _ => false,
        };
        if repeated {
            return Ok(false);
        }

        let reader = scanner.reader();
        match sub.tag {
            HEDR => {
                self.hedr = Some(HeaderData {
                    version: reader.read_f32_le()?,
                    record_count: reader.read_u32_le()?,
                    next_id: reader.read_u32_le()?,
                });
            }
            CNAM => self.author = Some(reader.read_zstring()?),
            SNAM => self.description = Some(reader.read_zstring()?),
            MAST => {
                let start = reader.position();
                let name = reader.read_zstring()?;
                if self.masters.contains_key(&name) {
                    // MAST and its DATA are both kept raw, in place
                    let used = reader.position() - start;
                    reader.unread(used)?;
                    warn!(master = %name, "master listed twice");
                    return Ok(false);
                }
                scanner.expect(DATA)?;
                let tag = scanner.reader().read_u64_le()?;
                self.masters.insert(name, tag);
            }
            ONAM => {
                if sub.size % 4 != 0 {
                    return Err(Error::corrupt(
                        reader.offset(),
                        format!("ONAM size {} is not a multiple of 4", sub.size),
                    ));
                }
                let mut overrides = Vec::with_capacity(sub.size as usize / 4);
                for _ in 0..sub.size / 4 {
                    overrides.push(reader.read_u32_le()?);
                }
                self.overrides = Some(overrides);
            }
            INTV => self.intv = Some(reader.read_u32_le()?),
            INCC => self.incc = Some(reader.read_u32_le()?),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn save_subrecords(&self, sink: &mut SubrecordSink<'_>) -> Result<()> {
        if let Some(hedr) = self.hedr {
            sink.field(HEDR, |w| {
                w.write_f32_le(hedr.version);
                w.write_u32_le(hedr.record_count);
                w.write_u32_le(hedr.next_id);
                Ok(())
            })?;
        }
        if let Some(author) = &self.author {
            sink.field(CNAM, |w| w.write_zstring(author))?;
        }
        if let Some(description) = &self.description {
            sink.field(SNAM, |w| w.write_zstring(description))?;
        }
        for (name, tag) in &self.masters {
            sink.field(MAST, |w| w.write_zstring(name))?;
            sink.field(DATA, |w| {
                w.write_u64_le(*tag);
                Ok(())
            })?;
        }
        if let Some(overrides) = &self.overrides {
            sink.field(ONAM, |w| {
                for id in overrides {
                    w.write_u32_le(*id);
                }
                Ok(())
            })?;
        }
        if let Some(intv) = self.intv {
            sink.field(INTV, |w| {
                w.write_u32_le(intv);
                Ok(())
            })?;
        }
        if let Some(incc) = self.incc {
            sink.field(INCC, |w| {
                w.write_u32_le(incc);
                Ok(())
            })?;
        }
        Ok(())
    }
}

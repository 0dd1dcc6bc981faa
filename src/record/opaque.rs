use super::{FormCodec, RawSubrecord, SubrecordHeader, SubrecordScanner, SubrecordSink};
use crate::codec::Tag;
use crate::error::Result;

const EDID: Tag = Tag::new(b"EDID");

/// Record of a type this crate does not model. Every subrecord is kept as
/// read and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpaqueForm {
    subrecords: Vec<RawSubrecord>,
}

impl OpaqueForm {
    pub fn subrecords(&self) -> &[RawSubrecord] {
        &self.subrecords
    }

    pub fn push(&mut self, subrecord: RawSubrecord) {
        self.subrecords.push(subrecord);
    }
}

impl FormCodec for OpaqueForm {
    fn load_subrecord(
        &mut self,
        sub: SubrecordHeader,
        scanner: &mut SubrecordScanner<'_>,
    ) -> Result<bool> {
        self.subrecords.push(scanner.capture(sub)?);
        Ok(true)
    }

    fn save_subrecords(&self, sink: &mut SubrecordSink<'_>) -> Result<()> {
        for sub in &self.subrecords {
            sink.raw(sub)?;
        }
        Ok(())
    }

    /// Editor id, when the leading `EDID` is well formed.
    fn editor_id(&self) -> Option<&str> {
        let first = self.subrecords.first().filter(|s| s.tag == EDID)?;
        let (last, text) = first.data.split_last()?;
        if *last != 0 {
            return None;
        }
        std::str::from_utf8(text).ok()
    }
}

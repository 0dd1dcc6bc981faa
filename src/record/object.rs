use super::{FormCodec, LocalizedString, SubrecordHeader, SubrecordScanner, SubrecordSink};
use crate::codec::Tag;
use crate::codec::writer::encode_latin1;
use crate::error::Result;

const EDID: Tag = Tag::new(b"EDID");
const FULL: Tag = Tag::new(b"FULL");

/// Generic game object: editor id and display name. Every other subrecord
/// is kept verbatim on the record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectForm {
    editor_id: Option<String>,
    name: Option<LocalizedString>,
}

impl ObjectForm {
    pub fn name(&self) -> Option<&LocalizedString> {
        self.name.as_ref()
    }

    pub fn set_editor_id(&mut self, editor_id: Option<&str>) -> Result<()> {
        if let Some(id) = editor_id {
            encode_latin1(id)?;
        }
        self.editor_id = editor_id.map(str::to_string);
        Ok(())
    }

    pub fn set_name(&mut self, name: Option<LocalizedString>) -> Result<()> {
        if let Some(LocalizedString::Inline(text)) = &name {
            encode_latin1(text)?;
        }
        self.name = name;
        Ok(())
    }
}

impl FormCodec for ObjectForm {
    fn load_subrecord(
        &mut self,
        sub: SubrecordHeader,
        scanner: &mut SubrecordScanner<'_>,
    ) -> Result<bool> {
        match sub.tag {
            EDID if self.editor_id.is_none() => {
                self.editor_id = Some(scanner.reader().read_zstring()?)
            }
            FULL if self.name.is_none() => self.name = Some(LocalizedString::read(sub, scanner)?),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn save_subrecords(&self, sink: &mut SubrecordSink<'_>) -> Result<()> {
        if let Some(editor_id) = &self.editor_id {
            sink.field(EDID, |w| w.write_zstring(editor_id))?;
        }
        if let Some(name) = &self.name {
            sink.field(FULL, |w| name.write(w))?;
        }
        Ok(())
    }

    fn editor_id(&self) -> Option<&str> {
        self.editor_id.as_deref()
    }
}

use serde::Serialize;

use super::{FormCodec, LocalizedString, SubrecordHeader, SubrecordScanner, SubrecordSink};
use crate::codec::writer::encode_latin1;
use crate::codec::Tag;
use crate::error::Result;

const EDID: Tag = Tag::new(b"EDID");
const FULL: Tag = Tag::new(b"FULL");
const CNAM: Tag = Tag::new(b"CNAM");
const FNAM: Tag = Tag::new(b"FNAM");

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// CLFM: a named color, selectable in character creation when playable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorForm {
    editor_id: Option<String>,
    name: Option<LocalizedString>,
    color: Option<Color>,
    playable: Option<u32>,
}

impl ColorForm {
    pub fn name(&self) -> Option<&LocalizedString> {
        self.name.as_ref()
    }

    pub fn color(&self) -> Option<Color> {
        self.color
    }

    pub fn is_playable(&self) -> bool {
        self.playable.is_some_and(|f| f & 1 != 0)
    }

    pub fn set_editor_id(&mut self, editor_id: &str) -> Result<()> {
        encode_latin1(editor_id)?;
        self.editor_id = Some(editor_id.to_string());
        Ok(())
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = Some(color);
    }

    pub fn set_playable(&mut self, playable: bool) {
        self.playable = Some(u32::from(playable));
    }
}

impl FormCodec for ColorForm {
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
            CNAM if sub.size == 4 && self.color.is_none() => {
                let [r, g, b, a] = scanner.reader().read_array::<4>()?;
                self.color = Some(Color { r, g, b, a });
            }
            FNAM if sub.size == 4 && self.playable.is_none() => {
                self.playable = Some(scanner.reader().read_u32_le()?)
            }
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
        if let Some(c) = self.color {
            sink.field(CNAM, |w| {
                w.write_bytes(&[c.r, c.g, c.b, c.a]);
                Ok(())
            })?;
        }
        if let Some(flags) = self.playable {
            sink.field(FNAM, |w| {
                w.write_u32_le(flags);
                Ok(())
            })?;
        }
        Ok(())
    }

    fn editor_id(&self) -> Option<&str> {
        self.editor_id.as_deref()
    }
}

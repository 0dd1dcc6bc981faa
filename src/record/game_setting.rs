//! GMST: a named engine tunable.
//!
//! The type of `DATA` is not stored anywhere; it follows from the first
//! letter of the editor id (`bAllowX`, `iMaxY`, `uSeed`, `fScale`, `sName`).

use super::{FormCodec, LocalizedString, SubrecordHeader, SubrecordScanner, SubrecordSink};
use crate::codec::reader::decode_latin1;
use crate::codec::writer::encode_latin1;
use crate::codec::Tag;
use crate::error::{Error, Result};

const EDID: Tag = Tag::new(b"EDID");
const DATA: Tag = Tag::new(b"DATA");

#[derive(Debug, Clone, PartialEq)]
pub enum GameSettingValue {
    Bool(bool),
    Int(i32),
    Unsigned(u32),
    Float(f32),
    String(LocalizedString),
    /// Payload that does not match the type implied by the editor id.
    Raw(Vec<u8>),
}

impl GameSettingValue {
    /// Type prefix this value expects on the editor id, if any.
    pub fn prefix(&self) -> Option<char> {
        match self {
            Self::Bool(_) => Some('b'),
            Self::Int(_) => Some('i'),
            Self::Unsigned(_) => Some('u'),
            Self::Float(_) => Some('f'),
            Self::String(_) => Some('s'),
            Self::Raw(_) => None,
        }
    }

    fn decode(prefix: Option<char>, payload: &[u8], localized: bool) -> Self {
        let word = <[u8; 4]>::try_from(payload).ok();
        let value = match (prefix, word) {
            (Some('b'), Some(w)) => match u32::from_le_bytes(w) {
                0 => Some(Self::Bool(false)),
                1 => Some(Self::Bool(true)),
                _ => None,
            },
            (Some('i'), Some(w)) => Some(Self::Int(i32::from_le_bytes(w))),
            (Some('u'), Some(w)) => Some(Self::Unsigned(u32::from_le_bytes(w))),
            (Some('f'), Some(w)) => Some(Self::Float(f32::from_le_bytes(w))),
            (Some('s'), Some(w)) if localized => {
                Some(Self::String(LocalizedString::Id(u32::from_le_bytes(w))))
            }
            (Some('s'), _) => match payload.split_last() {
                Some((0, text)) if !text.contains(&0) => {
                    Some(Self::String(LocalizedString::Inline(decode_latin1(text))))
                }
                _ => None,
            },
            _ => None,
        };
        value.unwrap_or_else(|| Self::Raw(payload.to_vec()))
    }

    fn encode(&self, w: &mut crate::codec::BinaryWriter) -> Result<()> {
        match self {
            Self::Bool(v) => w.write_u32_le(u32::from(*v)),
            Self::Int(v) => w.write_i32_le(*v),
            Self::Unsigned(v) => w.write_u32_le(*v),
            Self::Float(v) => w.write_f32_le(*v),
            Self::String(s) => s.write(w)?,
            Self::Raw(bytes) => w.write_bytes(bytes),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameSettingForm {
    editor_id: Option<String>,
    value: Option<GameSettingValue>,
}

impl GameSettingForm {
    pub fn value(&self) -> Option<&GameSettingValue> {
        self.value.as_ref()
    }

    /// Set name and value together; the name's first letter must agree with
    /// the value type.
    pub fn set(&mut self, editor_id: &str, value: GameSettingValue) -> Result<()> {
        encode_latin1(editor_id)?;
        if let Some(prefix) = value.prefix() {
            if !editor_id.starts_with(prefix) {
                return Err(Error::InvalidArgument(format!(
                    "game setting {editor_id:?} must start with '{prefix}' for this value"
                )));
            }
        }
        if let GameSettingValue::String(LocalizedString::Inline(text)) = &value {
            encode_latin1(text)?;
        }
        self.editor_id = Some(editor_id.to_string());
        self.value = Some(value);
        Ok(())
    }

    fn prefix(&self) -> Option<char> {
        self.editor_id.as_deref().and_then(|id| id.chars().next())
    }
}

impl FormCodec for GameSettingForm {
    fn load_subrecord(
        &mut self,
        sub: SubrecordHeader,
        scanner: &mut SubrecordScanner<'_>,
    ) -> Result<bool> {
        match sub.tag {
            EDID if self.editor_id.is_none() => {
                self.editor_id = Some(scanner.reader().read_zstring()?)
            }
            DATA if self.value.is_none() => {
                let localized = scanner.localized();
                let payload = scanner.payload(sub)?;
                self.value = Some(GameSettingValue::decode(self.prefix(), payload, localized));
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn save_subrecords(&self, sink: &mut SubrecordSink<'_>) -> Result<()> {
        if let Some(editor_id) = &self.editor_id {
            sink.field(EDID, |w| w.write_zstring(editor_id))?;
        }
        if let Some(value) = &self.value {
            sink.field(DATA, |w| value.encode(w))?;
        }
        Ok(())
    }

    fn editor_id(&self) -> Option<&str> {
        self.editor_id.as_deref()
    }
}

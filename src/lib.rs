//! TES4 Plugin Forms
//!
//! A Rust library for reading and writing TES4-family master/plugin files
//! (`.esm`/`.esp`): the TES4 header, size-bounded `GRUP` containers, records
//! and their subrecords, with unknown data carried through unchanged.

pub mod codec;
pub mod config;
pub mod error;
pub mod group;
pub mod plugin;
pub mod record;

pub use codec::{BinaryReader, BinaryWriter, FormFlags, HeaderLayout, Tag};
pub use config::{LoadConfig, LoadConfigBuilder, WriteConfig};
pub use error::{Error, Result};
pub use group::{Group, GroupChild, GroupHeader, GroupKind, RecordEntry};
pub use plugin::{load_all, DisplayRow, Plugin, Records};
pub use record::{
    Color, ColorForm, Form, FormCodec, FormHeader, GameSettingForm, GameSettingValue,
    HeaderData, HeaderForm, LocalizedString, ObjectForm, OpaqueForm, RawSubrecord, Record,
};

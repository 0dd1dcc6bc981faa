//! One loaded master/plugin file.

pub mod view;

use std::path::{Path, PathBuf};

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::codec::{BinaryReader, BinaryWriter, FormFlags, HeaderLayout, Tag};
use crate::config::{LoadConfig, WriteConfig};
use crate::error::{Error, Result};
use crate::group::{Group, GroupChild};
use crate::record::{Form, FormHeader, HeaderForm, Record};

pub use view::DisplayRow;

/// A parsed file: the TES4 header record followed by its top-level groups.
#[derive(Debug, Clone, PartialEq)]
pub struct Plugin {
    path: Option<PathBuf>,
    layout: HeaderLayout,
    file_index: u8,
    header: Record,
    groups: Vec<Group>,
}

impl Plugin {
    /// Plugin with no groups yet, for authoring.
    pub fn new(layout: HeaderLayout, header: HeaderForm) -> Self {
        Self {
            path: None,
            layout,
            file_index: 0,
            header: Record::with_form(FormHeader::new(Tag::TES4, 0), Form::Header(header)),
            groups: Vec::new(),
        }
    }

    /// Parse a whole file held in memory. Nothing is returned on failure; the
    /// error carries the byte offset and, inside a record, its form id.
    pub fn from_bytes(bytes: &[u8], config: &LoadConfig) -> Result<Self> {
        if bytes.get(0..4) != Some(Tag::TES4.to_bytes().as_slice()) {
            return Err(Error::corrupt(0, "file does not start with a TES4 record"));
        }
        let layout = match config.layout {
            Some(layout) => layout,
            None => HeaderLayout::detect(bytes).unwrap_or_else(|| {
                debug!("no HEDR after TES4 header, assuming 24-byte headers");
                HeaderLayout::Skyrim
            }),
        };

        let mut ctx = config.context(layout);
        let mut reader = BinaryReader::new(bytes);
        let header = Record::read(&mut reader, &ctx)?;
        ctx.localized = header.flags().contains(FormFlags::LOCALIZED);

        let mut groups = Vec::new();
        while !reader.is_empty() {
            let offset = reader.offset();
            let tag = reader.peek_tag()?;
            if tag != Tag::GRUP {
                return Err(Error::corrupt(offset, format!("expected top-level GRUP, found {tag}")));
            }
            groups.push(Group::read(&mut reader, &ctx, 0)?);
        }

        debug!(?layout, groups = groups.len(), localized = ctx.localized, "plugin parsed");
        Ok(Self {
            path: None,
            layout,
            file_index: config.file_index,
            header,
            groups,
        })
    }

    pub fn open(path: impl AsRef<Path>, config: &LoadConfig) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let mut plugin = Self::from_bytes(&bytes, config)?;
        info!(path = %path.display(), bytes = bytes.len(), "loaded plugin");
        plugin.path = Some(path.to_path_buf());
        Ok(plugin)
    }

    /// Read the file with `tokio::fs` and parse it on the blocking pool.
    pub async fn open_async(path: impl AsRef<Path>, config: LoadConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = tokio::fs::read(&path).await?;
        let mut plugin = tokio::task::spawn_blocking(move || Self::from_bytes(&bytes, &config))
            .await
            .map_err(|e| Error::Task(e.to_string()))??;
        info!(path = %path.display(), "loaded plugin");
        plugin.path = Some(path);
        Ok(plugin)
    }

    pub fn to_bytes(&self, config: &WriteConfig) -> Result<Vec<u8>> {
        let ctx = config.context(self.layout);
        let mut writer = BinaryWriter::new();
        self.header.write(&mut writer, &ctx)?;
        for group in &self.groups {
            group.write(&mut writer, &ctx)?;
        }
        Ok(writer.into_vec())
    }

    pub fn save(&self, path: impl AsRef<Path>, config: &WriteConfig) -> Result<()> {
        let bytes = self.to_bytes(config)?;
        std::fs::write(path.as_ref(), &bytes)?;
        info!(path = %path.as_ref().display(), bytes = bytes.len(), "saved plugin");
        Ok(())
    }

    /// Path the plugin was opened from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn layout(&self) -> HeaderLayout {
        self.layout
    }

    pub fn file_index(&self) -> u8 {
        self.file_index
    }

    pub fn header(&self) -> &Record {
        &self.header
    }

    pub fn header_form(&self) -> Option<&HeaderForm> {
        self.header.form().as_header()
    }

    pub fn header_form_mut(&mut self) -> Option<&mut HeaderForm> {
        self.header.form_mut().as_header_mut()
    }

    pub fn is_master(&self) -> bool {
        self.header.flags().contains(FormFlags::MASTER)
    }

    pub fn is_localized(&self) -> bool {
        self.header.flags().contains(FormFlags::LOCALIZED)
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn push_group(&mut self, group: Group) {
        self.groups.push(group);
    }

    /// Every record below the header, depth first in file order.
    pub fn records(&self) -> Records<'_> {
        Records { groups: self.groups.iter(), stack: Vec::new() }
    }

    /// Top-level group holding records of type `tag`.
    pub fn top_group(&self, tag: Tag) -> Option<&Group> {
        self.groups.iter().find(|g| g.header().label_tag() == tag)
    }

    pub fn find_record(&self, form_id: u32) -> Option<&Record> {
        self.records().find(|r| r.id() == form_id)
    }

    /// Master file a form id points into. Ids whose top byte is past the end
    /// of the master list belong to this plugin and give `None`.
    pub fn master_name_for(&self, form_id: u32) -> Option<&str> {
        let index = (form_id >> 24) as usize;
        self.header_form()?
            .masters()
            .get_index(index)
            .map(|(name, _)| name.as_str())
    }
}


/// Depth-first iterator over the records of a [`Plugin`].
pub struct Records<'a> {
    groups: std::slice::Iter<'a, Group>,
    stack: Vec<std::slice::Iter<'a, GroupChild>>,
}

impl<'a> Iterator for Records<'a> {
    type Item = &'a Record;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let Some(children) = self.stack.last_mut() else {
                let group = self.groups.next()?;
                self.stack.push(group.children().iter());
                continue;
            };
            match children.next() {
                Some(GroupChild::Record(entry)) => {
                    if let Some(group) = &entry.group {
                        self.stack.push(group.children().iter());
                    }
                    return Some(&entry.record);
                }
                Some(GroupChild::Group(group)) => self.stack.push(group.children().iter()),
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

/// Load several files in parallel. Each file gets its position in `paths` as
/// its load-order index; results come back in the same order.
pub async fn load_all<P: AsRef<Path>>(paths: &[P], config: &LoadConfig) -> Vec<Result<Plugin>> {
    let mut results: Vec<Option<Result<Plugin>>> = (0..paths.len()).map(|_| None).collect();
    let mut tasks = JoinSet::new();

    for (index, path) in paths.iter().enumerate() {
        let Ok(file_index) = u8::try_from(index) else {
            results[index] = Some(Err(Error::InvalidArgument(format!(
                "load order index {index} does not fit in a form id"
            ))));
            continue;
        };
        let mut config = config.clone();
        config.file_index = file_index;
        let path = path.as_ref().to_path_buf();
        tasks.spawn(async move { (index, Plugin::open_async(path, config).await) });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => results[index] = Some(result),
            Err(e) => warn!(error = %e, "load task failed"),
        }
    }

    results
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| Err(Error::Task("load task did not complete".into()))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::{GroupHeader, GroupKind};
    use crate::record::tests::{raw_record, subrecord};
    use crate::record::LocalizedString;

    fn grup(kind: GroupKind, label: [u8; 4], body: &[u8]) -> Vec<u8> {
        let mut header = GroupHeader::new(kind, label);
        header.group_size = (24 + body.len()) as u32;
        let mut w = BinaryWriter::new();
        header.write(&mut w, HeaderLayout::Skyrim);
        w.write_bytes(body);
        w.into_vec()
    }

    fn tes4(flags: u32) -> Vec<u8> {
        let mut hedr = 1.7f32.to_le_bytes().to_vec();
        hedr.extend_from_slice(&3u32.to_le_bytes());
        hedr.extend_from_slice(&0x800u32.to_le_bytes());
        let mut body = subrecord(b"HEDR", &hedr);
        body.extend(subrecord(b"MAST", b"Skyrim.esm\0"));
        body.extend(subrecord(b"DATA", &0u64.to_le_bytes()));
        raw_record(Tag::TES4, 0, flags, &body)
    }

    fn sample() -> Vec<u8> {
        let mut bytes = tes4(0);

        let mut gmst = subrecord(b"EDID", b"fJumpHeightMin\0");
        gmst.extend(subrecord(b"DATA", &76.0f32.to_le_bytes()));
        bytes.extend(grup(GroupKind::Top, *b"GMST", &raw_record(Tag::new(b"GMST"), 0x0001_0800, 0, &gmst)));

        let cell = raw_record(Tag::new(b"CELL"), 0x0001_0802, 0, &subrecord(b"EDID", b"Wilderness\0"));
        let children = grup(GroupKind::WorldChildren, 0x0001_0801u32.to_le_bytes(), &cell);
        let mut worlds = raw_record(Tag::new(b"WRLD"), 0x0001_0801, 0, &subrecord(b"EDID", b"Tamriel\0"));
        worlds.extend(children);
        bytes.extend(grup(GroupKind::Top, *b"WRLD", &worlds));
        bytes
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("plugin-forms-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_parse_and_roundtrip() {
        let bytes = sample();
        let plugin = Plugin::from_bytes(&bytes, &LoadConfig::default()).unwrap();

        assert_eq!(plugin.layout(), HeaderLayout::Skyrim);
        let header = plugin.header_form().unwrap();
        assert_eq!(header.version(), 1.7);
        assert_eq!(header.next_id(), 0x800);
        assert_eq!(plugin.groups().len(), 2);

        let ids: Vec<u32> = plugin.records().map(Record::id).collect();
        assert_eq!(ids, vec![0x0001_0800, 0x0001_0801, 0x0001_0802]);
        assert_eq!(plugin.find_record(0x0001_0802).unwrap().editor_id(), Some("Wilderness"));
        assert!(plugin.find_record(0x99).is_none());
        assert!(plugin.top_group(Tag::new(b"WRLD")).is_some());

        assert_eq!(plugin.to_bytes(&WriteConfig::default()).unwrap(), bytes);
    }

    #[test]
    fn test_master_lookup() {
        let plugin = Plugin::from_bytes(&sample(), &LoadConfig::default()).unwrap();
        assert_eq!(plugin.master_name_for(0x0001_2EB7), Some("Skyrim.esm"));
        // index 1 is the plugin itself
        assert_eq!(plugin.master_name_for(0x0100_0800), None);
    }

    #[test]
    fn test_must_start_with_tes4() {
        let bytes = grup(GroupKind::Top, *b"STAT", &[]);
        let err = Plugin::from_bytes(&bytes, &LoadConfig::default()).unwrap_err();
        assert!(err.is_corrupt());
        assert_eq!(err.offset(), Some(0));
    }

    #[test]
    fn test_stray_top_level_record_is_corrupt() {
        let mut bytes = tes4(0);
        bytes.extend(raw_record(Tag::new(b"STAT"), 9, 0, &[]));
        assert!(Plugin::from_bytes(&bytes, &LoadConfig::default()).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_error_names_failing_record() {
        let mut bytes = tes4(0);
        let mut bad = raw_record(Tag::new(b"STAT"), 0x0001_0900, 0, &subrecord(b"EDID", b"Rock\0"));
        // declare one byte less than the body holds
        let short = (bad.len() - 24 - 1) as u32;
        bad[4..8].copy_from_slice(&short.to_le_bytes());
        bytes.extend(grup(GroupKind::Top, *b"STAT", &bad));

        let err = Plugin::from_bytes(&bytes, &LoadConfig::default()).unwrap_err();
        assert!(err.is_corrupt(), "{err}");
        assert_eq!(err.form_id(), Some(0x0001_0900));
    }

    #[test]
    fn test_master_flag() {
        let plugin = Plugin::from_bytes(&tes4(0x1), &LoadConfig::default()).unwrap();
        assert!(plugin.is_master());
        assert!(!plugin.is_localized());
        let plugin = Plugin::from_bytes(&tes4(0x80), &LoadConfig::default()).unwrap();
        assert!(!plugin.is_master());
    }

    #[test]
    fn test_localized_flag_reaches_records() {
        let mut bytes = tes4(0x80);
        let weap = raw_record(Tag::new(b"WEAP"), 0x0001_0800, 0, &subrecord(b"FULL", &7u32.to_le_bytes()));
        bytes.extend(grup(GroupKind::Top, *b"WEAP", &weap));

        let plugin = Plugin::from_bytes(&bytes, &LoadConfig::default()).unwrap();
        assert!(plugin.is_localized());
        let record = plugin.find_record(0x0001_0800).unwrap();
        assert_eq!(record.form().as_object().unwrap().name(), Some(&LocalizedString::Id(7)));
    }

    #[test]
    fn test_oblivion_layout_detected() {
        let mut hedr = 0.8f32.to_le_bytes().to_vec();
        hedr.extend_from_slice(&0u32.to_le_bytes());
        hedr.extend_from_slice(&0x800u32.to_le_bytes());
        let body = subrecord(b"HEDR", &hedr);
        let mut header = FormHeader::new(Tag::TES4, 0);
        header.set_data_size(body.len()).unwrap();
        let mut w = BinaryWriter::new();
        header.write(&mut w, HeaderLayout::Oblivion);
        w.write_bytes(&body);
        let mut group = GroupHeader::top(Tag::new(b"GMST"));
        group.group_size = 20;
        group.write(&mut w, HeaderLayout::Oblivion);
        let bytes = w.into_vec();

        let plugin = Plugin::from_bytes(&bytes, &LoadConfig::default()).unwrap();
        assert_eq!(plugin.layout(), HeaderLayout::Oblivion);
        assert_eq!(plugin.groups().len(), 1);
        assert_eq!(plugin.to_bytes(&WriteConfig::default()).unwrap(), bytes);
    }

    #[test]
    fn test_authoring() {
        let mut header = HeaderForm::default();
        header.set_version(1.7);
        header.add_master("Skyrim.esm", 0).unwrap();
        let mut plugin = Plugin::new(HeaderLayout::Skyrim, header);
        let mut stats = Group::new(GroupHeader::top(Tag::new(b"STAT")));
        stats.push_record(Record::new(FormHeader::new(Tag::new(b"STAT"), 0x0100_0800)));
        plugin.push_group(stats);

        let bytes = plugin.to_bytes(&WriteConfig::default()).unwrap();
        let back = Plugin::from_bytes(&bytes, &LoadConfig::default()).unwrap();
        assert_eq!(back.records().count(), 1);
        assert_eq!(back.header_form(), plugin.header_form());
    }

    #[test]
    fn test_save_and_open() {
        let path = temp_path("save.esp");
        let plugin = Plugin::from_bytes(&sample(), &LoadConfig::default()).unwrap();
        plugin.save(&path, &WriteConfig::default()).unwrap();

        let config = LoadConfig::builder().file_index(2).build();
        let back = Plugin::open(&path, &config).unwrap();
        assert_eq!(back.path(), Some(path.as_path()));
        assert_eq!(back.file_index(), 2);
        assert_eq!(back.records().next().unwrap().file_index(), 2);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_open_async() {
        let path = temp_path("async.esp");
        std::fs::write(&path, sample()).unwrap();
        let plugin =
            tokio_test::block_on(Plugin::open_async(&path, LoadConfig::default())).unwrap();
        assert_eq!(plugin.records().count(), 3);
        assert_eq!(plugin.path(), Some(path.as_path()));
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_load_all_keeps_order() {
        let first = temp_path("first.esm");
        let second = temp_path("second.esp");
        std::fs::write(&first, sample()).unwrap();
        std::fs::write(&second, sample()).unwrap();
        let missing = temp_path("missing.esp");

        let paths = vec![first.clone(), missing, second.clone()];
        let results = load_all(&paths, &LoadConfig::default()).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().file_index(), 0);
        assert!(matches!(results[1], Err(Error::Io(_))));
        let last = results[2].as_ref().unwrap();
        assert_eq!(last.file_index(), 2);
        assert!(last.records().all(|r| r.file_index() == 2));
        std::fs::remove_file(&first).unwrap();
        std::fs::remove_file(&second).unwrap();
    }
}

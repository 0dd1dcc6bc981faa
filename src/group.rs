//! `GRUP` containers.
//!
//! # Group layout
//!
//! ```text
//! [0x00] type       "GRUP"
//! [0x04] groupSize  u32 LE - includes this header
//! [0x08] label      4 bytes, meaning depends on groupType
//! [0x0C] groupType  i32 LE
//! [0x10] stamp      u32 LE
//! [0x14] version    u16 LE  (24-byte layout only)
//! [0x16] unknown    u16 LE  (24-byte layout only)
//! ```
//!
//! A group holds records and nested groups with no child count; the loop is
//! driven by `groupSize` alone. After each record the next header is peeked:
//! a child group (cell children, world children, topic children) is attached
//! to the record, anything else is pushed back and read as the next sibling.

use tracing::trace;

use crate::codec::{BinaryReader, BinaryWriter, HeaderLayout, Tag};
use crate::config::{ReadContext, WriteContext};
use crate::error::{Error, Result};
use crate::record::Record;

/// Meaning of a group's label, from its `groupType` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKind {
    /// Label is the record tag of every record in the group.
    Top,
    /// Label is a WRLD form id.
    WorldChildren,
    /// Label is the block number.
    InteriorCellBlock,
    /// Label is the sub-block number.
    InteriorCellSubBlock,
    /// Label is a `(y, x)` grid pair.
    ExteriorCellBlock,
    /// Label is a `(y, x)` grid pair.
    ExteriorCellSubBlock,
    /// Label is a CELL form id.
    CellChildren,
    /// Label is a DIAL form id.
    TopicChildren,
    CellPersistentChildren,
    CellTemporaryChildren,
    CellVisibleDistantChildren,
    Other(i32),
}

impl GroupKind {
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::Top,
            1 => Self::WorldChildren,
            2 => Self::InteriorCellBlock,
            3 => Self::InteriorCellSubBlock,
            4 => Self::ExteriorCellBlock,
            5 => Self::ExteriorCellSubBlock,
            6 => Self::CellChildren,
            7 => Self::TopicChildren,
            8 => Self::CellPersistentChildren,
            9 => Self::CellTemporaryChildren,
            10 => Self::CellVisibleDistantChildren,
            other => Self::Other(other),
        }
    }

    pub fn to_i32(self) -> i32 {
        match self {
            Self::Top => 0,
            Self::WorldChildren => 1,
            Self::InteriorCellBlock => 2,
            Self::InteriorCellSubBlock => 3,
            Self::ExteriorCellBlock => 4,
            Self::ExteriorCellSubBlock => 5,
            Self::CellChildren => 6,
            Self::TopicChildren => 7,
            Self::CellPersistentChildren => 8,
            Self::CellTemporaryChildren => 9,
            Self::CellVisibleDistantChildren => 10,
            Self::Other(v) => v,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::WorldChildren => "world children",
            Self::InteriorCellBlock => "interior cell block",
            Self::InteriorCellSubBlock => "interior cell sub-block",
            Self::ExteriorCellBlock => "exterior cell block",
            Self::ExteriorCellSubBlock => "exterior cell sub-block",
            Self::CellChildren => "cell children",
            Self::TopicChildren => "topic children",
            Self::CellPersistentChildren => "cell persistent children",
            Self::CellTemporaryChildren => "cell temporary children",
            Self::CellVisibleDistantChildren => "cell visible distant children",
            Self::Other(_) => "unknown",
        }
    }

    /// Whether a group of this kind belongs to the record directly in front
    /// of it rather than being a sibling.
    pub fn is_child_group(self) -> bool {
        matches!(self, Self::WorldChildren | Self::CellChildren | Self::TopicChildren)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupHeader {
    pub tag: Tag,
    pub group_size: u32,
    pub label: [u8; 4],
    pub kind: GroupKind,
    pub stamp: u32,
    pub version: u16,
    pub unknown: u16,
}

impl GroupHeader {
    pub fn new(kind: GroupKind, label: [u8; 4]) -> Self {
        Self {
            tag: Tag::GRUP,
            group_size: 0,
            label,
            kind,
            stamp: 0,
            version: 0,
            unknown: 0,
        }
    }

    /// Top-level group holding every record of type `tag`.
    pub fn top(tag: Tag) -> Self {
        Self::new(GroupKind::Top, tag.to_bytes())
    }

    /// Group owned by the record `form_id` (world, cell or topic children).
    pub fn children_of(kind: GroupKind, form_id: u32) -> Self {
        Self::new(kind, form_id.to_le_bytes())
    }

    pub fn read(reader: &mut BinaryReader<'_>, layout: HeaderLayout) -> Result<Self> {
        let tag = reader.read_tag()?;
        let group_size = reader.read_u32_le()?;
        let label = reader.read_array::<4>()?;
        let kind = GroupKind::from_i32(reader.read_i32_le()?);
        let stamp = reader.read_u32_le()?;
        let (version, unknown) = match layout {
            HeaderLayout::Oblivion => (0, 0),
            HeaderLayout::Skyrim => (reader.read_u16_le()?, reader.read_u16_le()?),
        };
        Ok(Self { tag, group_size, label, kind, stamp, version, unknown })
    }

    pub fn write(&self, writer: &mut BinaryWriter, layout: HeaderLayout) {
        writer.write_tag(self.tag);
        writer.write_u32_le(self.group_size);
        writer.write_bytes(&self.label);
        writer.write_i32_le(self.kind.to_i32());
        writer.write_u32_le(self.stamp);
        if layout == HeaderLayout::Skyrim {
            writer.write_u16_le(self.version);
            writer.write_u16_le(self.unknown);
        }
    }

    pub fn label_tag(&self) -> Tag {
        Tag::new(&self.label)
    }

    pub fn label_form_id(&self) -> u32 {
        u32::from_le_bytes(self.label)
    }

    pub fn label_block(&self) -> i32 {
        i32::from_le_bytes(self.label)
    }

    /// `(x, y)` of an exterior block; stored y first.
    pub fn label_grid(&self) -> (i16, i16) {
        let y = i16::from_le_bytes([self.label[0], self.label[1]]);
        let x = i16::from_le_bytes([self.label[2], self.label[3]]);
        (x, y)
    }

    /// Human-readable label, interpreted by kind.
    pub fn label_text(&self) -> String {
        match self.kind {
            GroupKind::Top => self.label_tag().to_string(),
            GroupKind::InteriorCellBlock | GroupKind::InteriorCellSubBlock => {
                self.label_block().to_string()
            }
            GroupKind::ExteriorCellBlock | GroupKind::ExteriorCellSubBlock => {
                let (x, y) = self.label_grid();
                format!("{x},{y}")
            }
            _ => format!("{:08X}", self.label_form_id()),
        }
    }
}

/// A record inside a group, with the child group that follows it, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordEntry {
    pub record: Record,
    pub group: Option<Group>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupChild {
    Record(RecordEntry),
    Group(Group),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    header: GroupHeader,
    children: Vec<GroupChild>,
    offset: usize,
}

impl Group {
    pub fn new(header: GroupHeader) -> Self {
        Self { header, children: Vec::new(), offset: 0 }
    }

    /// Read one group, header included. `depth` is the nesting level of this
    /// group, 0 at the top of the file.
    pub fn read(reader: &mut BinaryReader<'_>, ctx: &ReadContext, depth: usize) -> Result<Self> {
        let offset = reader.offset();
        let header = GroupHeader::read(reader, ctx.layout)?;
        if header.tag != Tag::GRUP {
            return Err(Error::corrupt(offset, format!("expected GRUP, found {}", header.tag)));
        }
        Self::read_body(header, offset, reader, ctx, depth)
    }

    /// Read the contents of a group whose header has already been consumed.
    pub fn read_body(
        header: GroupHeader,
        offset: usize,
        reader: &mut BinaryReader<'_>,
        ctx: &ReadContext,
        depth: usize,
    ) -> Result<Self> {
        if depth >= ctx.max_depth {
            return Err(Error::corrupt(
                offset,
                format!("groups nested deeper than {}", ctx.max_depth),
            ));
        }
        let header_size = ctx.layout.header_size();
        let mut remaining = (header.group_size as usize).checked_sub(header_size).ok_or_else(|| {
            Error::corrupt(offset, format!("group size {} smaller than its header", header.group_size))
        })?;
        if remaining > reader.remaining() {
            return Err(Error::Truncation {
                offset: reader.offset(),
                needed: remaining,
                available: reader.remaining(),
            });
        }

        let mut children = Vec::new();
        while remaining > 0 {
            let child_offset = reader.offset();
            if remaining < header_size {
                return Err(Error::corrupt(
                    child_offset,
                    format!("{remaining} stray bytes at end of group"),
                ));
            }

            if reader.peek_tag()? == Tag::GRUP {
                let group = Group::read(reader, ctx, depth + 1)?;
                remaining = consume(remaining, group.header.group_size as usize, child_offset)?;
                children.push(GroupChild::Group(group));
                continue;
            }

            let start = reader.position();
            let record = Record::read(reader, ctx)?;
            remaining = consume(remaining, reader.position() - start, child_offset)?;
            let mut entry = RecordEntry { record, group: None };

            if remaining >= header_size {
                let peek_offset = reader.offset();
                let peeked = GroupHeader::read(reader, ctx.layout)?;
                if peeked.tag == Tag::GRUP && peeked.kind.is_child_group() {
                    let group = Group::read_body(peeked, peek_offset, reader, ctx, depth + 1)?;
                    remaining = consume(remaining, group.header.group_size as usize, peek_offset)?;
                    entry.group = Some(group);
                } else {
                    reader.unread(header_size)?;
                }
            }
            children.push(GroupChild::Record(entry));
        }

        trace!(
            kind = header.kind.name(),
            label = %header.label_text(),
            offset,
            children = children.len(),
            "group"
        );
        Ok(Self { header, children, offset })
    }

    /// Write the group, recomputing `group_size` from its contents.
    pub fn write(&self, writer: &mut BinaryWriter, ctx: &WriteContext) -> Result<()> {
        let mut body = BinaryWriter::new();
        for child in &self.children {
            match child {
                GroupChild::Record(entry) => {
                    entry.record.write(&mut body, ctx)?;
                    if let Some(group) = &entry.group {
                        group.write(&mut body, ctx)?;
                    }
                }
                GroupChild::Group(group) => group.write(&mut body, ctx)?,
            }
        }

        let total = ctx.layout.header_size() + body.len();
        let mut header = self.header;
        header.group_size = u32::try_from(total)
            .map_err(|_| Error::InvalidArgument(format!("group of {total} bytes exceeds u32")))?;
        header.write(writer, ctx.layout);
        writer.write_bytes(body.as_slice());
        Ok(())
    }

    pub fn header(&self) -> &GroupHeader {
        &self.header
    }

    pub fn kind(&self) -> GroupKind {
        self.header.kind
    }

    pub fn children(&self) -> &[GroupChild] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<GroupChild> {
        &mut self.children
    }

    /// File offset of the group header (0 for groups built in memory).
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn push_record(&mut self, record: Record) {
        self.children.push(GroupChild::Record(RecordEntry { record, group: None }));
    }

    /// Append a record together with the child group that belongs to it.
    pub fn push_record_with_group(&mut self, record: Record, group: Group) -> Result<()> {
        if !group.kind().is_child_group() {
            return Err(Error::InvalidArgument(format!(
                "a {} group cannot be attached to a record",
                group.kind().name()
            )));
        }
        self.children.push(GroupChild::Record(RecordEntry { record, group: Some(group) }));
        Ok(())
    }

    pub fn push_group(&mut self, group: Group) {
        self.children.push(GroupChild::Group(group));
    }

    /// Number of records in this group and all groups below it.
    pub fn record_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| match child {
                GroupChild::Record(entry) => {
                    1 + entry.group.as_ref().map_or(0, Group::record_count)
                }
                GroupChild::Group(group) => group.record_count(),
            })
            .sum()
    }
}

fn consume(remaining: usize, cost: usize, offset: usize) -> Result<usize> {
    remaining.checked_sub(cost).ok_or_else(|| {
        Error::corrupt(
            offset,
            format!("child of {cost} bytes overruns group with {remaining} bytes left"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::{raw_record, subrecord};

    fn grup(kind: GroupKind, label: [u8; 4], body: &[u8]) -> Vec<u8> {
        let mut header = GroupHeader::new(kind, label);
        header.group_size = (24 + body.len()) as u32;
        let mut w = BinaryWriter::new();
        header.write(&mut w, HeaderLayout::Skyrim);
        w.write_bytes(body);
        w.into_vec()
    }

    fn stat(id: u32, name: &str) -> Vec<u8> {
        raw_record(Tag::new(b"STAT"), id, 0, &subrecord(b"EDID", format!("{name}\0").as_bytes()))
    }

    fn ctx() -> ReadContext {
        ReadContext::new(HeaderLayout::Skyrim)
    }

    fn read(bytes: &[u8]) -> Result<Group> {
        Group::read(&mut BinaryReader::new(bytes), &ctx(), 0)
    }

    fn write(group: &Group) -> Vec<u8> {
        let mut w = BinaryWriter::new();
        group.write(&mut w, &WriteContext::new(HeaderLayout::Skyrim)).unwrap();
        w.into_vec()
    }

    fn entry(child: &GroupChild) -> &RecordEntry {
        match child {
            GroupChild::Record(entry) => entry,
            GroupChild::Group(_) => panic!("expected a record"),
        }
    }

    #[test]
    fn test_sibling_records_are_rewound() {
        let mut body = stat(1, "RockA");
        body.extend(stat(2, "RockB"));
        body.extend(stat(3, "RockC"));
        let bytes = grup(GroupKind::Top, *b"STAT", &body);

        let group = read(&bytes).unwrap();
        assert_eq!(group.children().len(), 3);
        let ids: Vec<u32> = group.children().iter().map(|c| entry(c).record.id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(group.children().iter().all(|c| entry(c).group.is_none()));
        assert_eq!(group.header().label_tag(), Tag::new(b"STAT"));
        assert_eq!(write(&group), bytes);
    }

    #[test]
    fn test_last_record_does_not_peek_past_group() {
        let first = grup(GroupKind::Top, *b"STAT", &stat(1, "Rock"));
        // the following group would be a valid child header if the reader
        // looked past the boundary
        let second = grup(GroupKind::CellChildren, 1u32.to_le_bytes(), &[]);
        let mut bytes = first.clone();
        bytes.extend(&second);

        let mut reader = BinaryReader::new(&bytes);
        let group = Group::read(&mut reader, &ctx(), 0).unwrap();
        assert_eq!(reader.position(), first.len());
        assert!(entry(&group.children()[0]).group.is_none());
    }

    #[test]
    fn test_cell_children_attach_to_cell() {
        let refs = grup(
            GroupKind::CellTemporaryChildren,
            0x3Cu32.to_le_bytes(),
            &raw_record(Tag::new(b"REFR"), 0x100, 0, &subrecord(b"NAME", &0x20u32.to_le_bytes())),
        );
        let children = grup(GroupKind::CellChildren, 0x3Cu32.to_le_bytes(), &refs);
        let mut sub_block = raw_record(Tag::new(b"CELL"), 0x3C, 0, &subrecord(b"EDID", b"Cell\0"));
        sub_block.extend(&children);
        sub_block.extend(raw_record(Tag::new(b"CELL"), 0x3D, 0, &subrecord(b"EDID", b"Next\0")));
        let sub_block = grup(GroupKind::InteriorCellSubBlock, 2i32.to_le_bytes(), &sub_block);
        let bytes = grup(GroupKind::InteriorCellBlock, 0i32.to_le_bytes(), &sub_block);

        let group = read(&bytes).unwrap();
        let GroupChild::Group(sub) = &group.children()[0] else {
            panic!("expected sub-block");
        };
        assert_eq!(sub.kind(), GroupKind::InteriorCellSubBlock);
        assert_eq!(sub.header().label_block(), 2);
        assert_eq!(sub.children().len(), 2);

        let cell = entry(&sub.children()[0]);
        let attached = cell.group.as_ref().unwrap();
        assert_eq!(attached.header().label_form_id(), 0x3C);
        assert_eq!(attached.record_count(), 1);
        assert!(entry(&sub.children()[1]).group.is_none());
        assert_eq!(group.record_count(), 3);

        // child costs add up to each declared size
        assert_eq!(write(&group), bytes);
    }

    #[test]
    fn test_non_child_group_after_record_is_sibling() {
        let mut body = stat(1, "Rock");
        body.extend(grup(GroupKind::Top, *b"STAT", &stat(2, "Inner")));
        let bytes = grup(GroupKind::Top, *b"STAT", &body);

        let group = read(&bytes).unwrap();
        assert_eq!(group.children().len(), 2);
        assert!(entry(&group.children()[0]).group.is_none());
        assert!(matches!(group.children()[1], GroupChild::Group(_)));
    }

    #[test]
    fn test_group_size_too_small_is_corrupt() {
        let mut bytes = grup(GroupKind::Top, *b"STAT", &stat(1, "Rock"));
        let size = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        bytes[4..8].copy_from_slice(&(size - 1).to_le_bytes());
        assert!(read(&bytes).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_trailing_gap_is_corrupt() {
        let mut body = stat(1, "Rock");
        body.extend([0u8; 5]);
        let bytes = grup(GroupKind::Top, *b"STAT", &body);
        assert!(read(&bytes).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_group_smaller_than_header() {
        let mut bytes = grup(GroupKind::Top, *b"STAT", &[]);
        bytes[4..8].copy_from_slice(&10u32.to_le_bytes());
        assert!(read(&bytes).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_group_past_end_of_file_is_truncation() {
        let bytes = grup(GroupKind::Top, *b"STAT", &stat(1, "Rock"));
        assert!(read(&bytes[..bytes.len() - 4]).unwrap_err().is_truncation());
    }

    #[test]
    fn test_depth_limit() {
        let mut bytes = grup(GroupKind::InteriorCellSubBlock, [0; 4], &[]);
        for _ in 0..5 {
            bytes = grup(GroupKind::InteriorCellBlock, [0; 4], &bytes);
        }
        let mut shallow = ctx();
        shallow.max_depth = 4;
        let err = Group::read(&mut BinaryReader::new(&bytes), &shallow, 0).unwrap_err();
        assert!(err.is_corrupt());
        assert!(read(&bytes).is_ok());
    }

    #[test]
    fn test_oblivion_layout() {
        let mut w = BinaryWriter::new();
        let mut header = GroupHeader::top(Tag::new(b"GMST"));
        header.group_size = 20;
        header.stamp = 0x0000_1234;
        header.write(&mut w, HeaderLayout::Oblivion);
        let bytes = w.into_vec();
        assert_eq!(bytes.len(), 20);

        let ctx = ReadContext::new(HeaderLayout::Oblivion);
        let group = Group::read(&mut BinaryReader::new(&bytes), &ctx, 0).unwrap();
        assert_eq!(group.header().stamp, 0x1234);
        assert!(group.children().is_empty());
    }

    #[test]
    fn test_labels() {
        let header = GroupHeader::new(GroupKind::ExteriorCellBlock, [0xFF, 0xFF, 0x02, 0x00]);
        assert_eq!(header.label_grid(), (2, -1));
        assert_eq!(header.label_text(), "2,-1");
        let header = GroupHeader::children_of(GroupKind::WorldChildren, 0x3C);
        assert_eq!(header.label_text(), "0000003C");
        assert_eq!(GroupKind::from_i32(42), GroupKind::Other(42));
        assert_eq!(GroupKind::Other(42).to_i32(), 42);
    }

    #[test]
    fn test_authoring() {
        let mut top = Group::new(GroupHeader::top(Tag::new(b"WRLD")));
        let world = Record::new(crate::record::FormHeader::new(Tag::new(b"WRLD"), 0x3C));
        let mut children = Group::new(GroupHeader::children_of(GroupKind::WorldChildren, 0x3C));
        children.push_record(Record::new(crate::record::FormHeader::new(Tag::new(b"CELL"), 0x3D)));
        top.push_record_with_group(world.clone(), children).unwrap();
        let block = Group::new(GroupHeader::new(GroupKind::ExteriorCellBlock, [0; 4]));
        assert!(top.push_record_with_group(world, block).is_err());

        let bytes = write(&top);
        let back = read(&bytes).unwrap();
        assert_eq!(back.record_count(), 2);
        assert_eq!(back.header().group_size as usize, bytes.len());
    }
}

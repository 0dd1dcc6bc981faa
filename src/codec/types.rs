use std::fmt;

use bitflags::bitflags;

/// Four-character record/subrecord identifier.
///
/// Tags are stored on disk as their ASCII bytes. The packed value is the
/// big-endian reading of those bytes, so a tag read from disk compares equal
/// to `Tag::new(b"TES4")` and tag dispatch is a plain integer match.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Tag(pub u32);

impl Tag {
    pub const TES4: Tag = Tag::new(b"TES4");
    pub const GRUP: Tag = Tag::new(b"GRUP");
    /// Extended-size marker preceding a subrecord larger than `u16::MAX`.
    pub const XXXX: Tag = Tag::new(b"XXXX");

    pub const fn new(bytes: &[u8; 4]) -> Self {
        Self(u32::from_be_bytes(*bytes))
    }

    /// Convert the little-endian integer read from disk into a tag.
    pub const fn from_le_u32(raw: u32) -> Self {
        Self(raw.swap_bytes())
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.to_bytes() {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({self})")
    }
}

impl From<[u8; 4]> for Tag {
    fn from(bytes: [u8; 4]) -> Self {
        Self::new(&bytes)
    }
}

bitflags! {
    /// Record header flags. Bits not named here are kept as-is.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FormFlags: u32 {
        /// TES4 only: file is a master
        const MASTER = 0x0000_0001;
        const DELETED = 0x0000_0020;
        /// TES4 only: strings live in external string tables
        const LOCALIZED = 0x0000_0080;
        /// TES4 only: light master (ESL)
        const LIGHT_MASTER = 0x0000_0200;
        const PERSISTENT = 0x0000_0400;
        const INITIALLY_DISABLED = 0x0000_0800;
        const IGNORED = 0x0000_1000;
        /// Record body is `{decompressed_size: u32, zlib stream}`
        const COMPRESSED = 0x0004_0000;
    }
}

/// Width family of record and group headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HeaderLayout {
    /// 20-byte headers (Oblivion)
    Oblivion,
    /// 24-byte headers (Skyrim and later)
    #[default]
    Skyrim,
}

impl HeaderLayout {
    pub const fn header_size(self) -> usize {
        match self {
            Self::Oblivion => 20,
            Self::Skyrim => 24,
        }
    }

    /// Guess the layout from the leading TES4 record: its first subrecord is
    /// always HEDR, so the tag position gives the header width away.
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.get(0..4)? != b"TES4" {
            return None;
        }
        [Self::Skyrim, Self::Oblivion].into_iter().find(|layout| {
            let at = layout.header_size();
            data.get(at..at + 4) == Some(b"HEDR".as_slice())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_matches_disk_order() {
        let raw = u32::from_le_bytes(*b"TES4");
        assert_eq!(Tag::from_le_u32(raw), Tag::TES4);
        assert_eq!(Tag::TES4.to_bytes(), *b"TES4");
        assert_eq!(Tag::TES4.to_string(), "TES4");
    }

    #[test]
    fn test_tag_display_escapes() {
        let tag = Tag::from([b'N', b'P', b'C', 0]);
        assert_eq!(tag.to_string(), "NPC\\x00");
    }

    #[test]
    fn test_flags_retain_unknown_bits() {
        let flags = FormFlags::from_bits_retain(0x0004_0001 | 0x8000_0000);
        assert!(flags.contains(FormFlags::COMPRESSED));
        assert!(flags.contains(FormFlags::MASTER));
        assert_eq!(flags.bits(), 0x8004_0001);
    }

    #[test]
    fn test_detect_layout() {
        let mut skyrim = b"TES4".to_vec();
        skyrim.extend_from_slice(&[0; 20]);
        skyrim.extend_from_slice(b"HEDR");
        assert_eq!(HeaderLayout::detect(&skyrim), Some(HeaderLayout::Skyrim));

        let mut oblivion = b"TES4".to_vec();
        oblivion.extend_from_slice(&[0; 16]);
        oblivion.extend_from_slice(b"HEDR");
        assert_eq!(HeaderLayout::detect(&oblivion), Some(HeaderLayout::Oblivion));

        assert_eq!(HeaderLayout::detect(b"GRUP"), None);
    }
}

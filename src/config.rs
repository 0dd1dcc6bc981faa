//! Load and write settings.

use flate2::Compression;

use crate::codec::HeaderLayout;
use crate::error::{Error, Result};

/// Settings for loading a plugin file.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Header width; `None` detects it from the leading TES4 record.
    pub layout: Option<HeaderLayout>,
    /// Deepest group nesting accepted before the file is treated as corrupt.
    pub max_depth: usize,
    /// Load-order index of the file, recorded on every record.
    pub file_index: u8,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            layout: None,
            max_depth: 16,
            file_index: 0,
        }
    }
}

impl LoadConfig {
    pub fn builder() -> LoadConfigBuilder {
        LoadConfigBuilder { config: Self::default() }
    }

    pub(crate) fn context(&self, layout: HeaderLayout) -> ReadContext {
        ReadContext {
            layout,
            file_index: self.file_index,
            max_depth: self.max_depth,
            localized: false,
        }
    }
}

/// Builder for [`LoadConfig`]
pub struct LoadConfigBuilder {
    config: LoadConfig,
}

impl LoadConfigBuilder {
    pub fn layout(mut self, layout: HeaderLayout) -> Self {
        self.config.layout = Some(layout);
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = depth;
        self
    }

    pub fn file_index(mut self, index: u8) -> Self {
        self.config.file_index = index;
        self
    }

    pub fn build(self) -> LoadConfig {
        self.config
    }
}

/// Settings for writing a plugin file.
#[derive(Debug, Clone)]
pub struct WriteConfig {
    /// zlib level (0-9) for records flagged as compressed
    pub compression_level: u32,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self { compression_level: 6 }
    }
}

impl WriteConfig {
    pub fn with_level(level: u32) -> Result<Self> {
        if level > 9 {
            return Err(Error::InvalidArgument(format!(
                "compression level {level} out of range 0-9"
            )));
        }
        Ok(Self { compression_level: level })
    }

    pub(crate) fn context(&self, layout: HeaderLayout) -> WriteContext {
        WriteContext {
            layout,
            compression: Compression::new(self.compression_level.min(9)),
        }
    }
}

/// Per-file state threaded through record and group decoding.
#[derive(Debug, Clone, Copy)]
pub struct ReadContext {
    pub layout: HeaderLayout,
    pub file_index: u8,
    pub max_depth: usize,
    /// Set from the TES4 header; name fields hold string-table ids.
    pub localized: bool,
}

impl ReadContext {
    pub fn new(layout: HeaderLayout) -> Self {
        LoadConfig::default().context(layout)
    }
}

/// Per-file state threaded through record and group encoding.
#[derive(Debug, Clone, Copy)]
pub struct WriteContext {
    pub layout: HeaderLayout,
    pub compression: Compression,
}

impl WriteContext {
    pub fn new(layout: HeaderLayout) -> Self {
        WriteConfig::default().context(layout)
    }
}

use crate::codec::Tag;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("truncated data at offset {offset:#x}: need {needed} bytes, have {available}")]
    Truncation { offset: usize, needed: usize, available: usize },

    #[error("corrupt data at offset {offset:#x}: {reason}")]
    CorruptData { offset: usize, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{tag} record {form_id:#010x} at offset {offset:#x}: {source}")]
    InRecord {
        tag: Tag,
        form_id: u32,
        offset: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("load task failed: {0}")]
    Task(String),
}

impl Error {
    pub fn corrupt(offset: usize, reason: impl Into<String>) -> Self {
        Error::CorruptData { offset, reason: reason.into() }
    }

    /// Attach the owning record to an error raised while decoding its body.
    /// Errors that already carry record context are returned unchanged so the
    /// innermost record is the one reported.
    pub fn in_record(self, tag: Tag, form_id: u32, offset: usize) -> Self {
        match self {
            Error::InRecord { .. } => self,
            other => Error::InRecord { tag, form_id, offset, source: Box::new(other) },
        }
    }

    /// Byte offset of the failure, when the error is tied to one.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Error::Truncation { offset, .. } | Error::CorruptData { offset, .. } => Some(*offset),
            Error::InRecord { source, offset, .. } => source.offset().or(Some(*offset)),
            _ => None,
        }
    }

    /// Form id of the record being decoded when the failure happened.
    pub fn form_id(&self) -> Option<u32> {
        match self {
            Error::InRecord { form_id, .. } => Some(*form_id),
            _ => None,
        }
    }

    pub fn is_corrupt(&self) -> bool {
        match self {
            Error::CorruptData { .. } => true,
            Error::InRecord { source, .. } => source.is_corrupt(),
            _ => false,
        }
    }

    pub fn is_truncation(&self) -> bool {
        match self {
            Error::Truncation { .. } => true,
            Error::InRecord { source, .. } => source.is_truncation(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod reader;
pub mod writer;
pub mod types;

pub use reader::{BinaryReader, InflatedBuffer};
pub use writer::BinaryWriter;
pub use types::*;

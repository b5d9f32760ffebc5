pub mod compressor;
pub mod error;
pub mod format;
pub mod frame;
pub mod reader;
pub mod store;
pub mod writer;

pub use compressor::Compressor;
pub use error::{Error, Result};
pub use format::{ChunkEntry, QcfHeader, HEADER_SIZE, MAGIC};
pub use reader::FileReader;
pub use store::{
    ArraySink, ArraySource, DataType, MemoryStore, VariableHandle, VariableInfo, VariableMetadata,
};
pub use writer::FileWriter;

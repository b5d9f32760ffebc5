//! The array-store boundary.
//!
//! The encoder and decoder only ever talk to a store through [`ArraySink`]
//! and [`ArraySource`]. Two stores ship with the crate: [`MemoryStore`]
//! here, and the QCF1 file pair [`crate::FileWriter`] / [`crate::FileReader`].

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::format::MAX_RANK;

/// Element type of a stored variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    F32,
}

impl DataType {
    /// On-disk tag (matches the classic NC_FLOAT type code).
    pub fn tag(self) -> u8 {
        match self {
            DataType::F32 => 5,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            5 => Ok(DataType::F32),
            other => Err(Error::Format(format!("unsupported data type tag {other}"))),
        }
    }

    pub fn size(self) -> usize {
        match self {
            DataType::F32 => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::F32 => "float",
        }
    }
}

/// Encoding parameters recorded alongside a variable.
///
/// Everything needed to decode the stored chunks lives here; nothing is
/// inferred from the chunk bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableMetadata {
    /// 0 = none, 1 = BitGroom, 2 = GranularBitRound, 3 = BitRound.
    pub quant_mode: u8,
    /// Significant digits (BitGroom, GranularBitRound) or bits (BitRound).
    pub quant_precision: u32,
    pub codec_id: u16,
    /// 0 means chunks are framed verbatim.
    pub compression_level: u32,
    pub shuffle: bool,
    /// Outer-dimension rows per chunk.
    pub chunk_rows: u64,
    pub fill_value: Option<f32>,
    pub dim_names: Vec<String>,
}

/// Everything a store knows about one variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableInfo {
    pub name: String,
    pub shape: Vec<u64>,
    pub dtype: DataType,
    pub metadata: VariableMetadata,
}

impl VariableInfo {
    /// Validate and bundle a variable definition.
    pub fn new(name: &str, shape: &[u64], dtype: DataType, metadata: VariableMetadata) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::InvalidDescriptor("variable name is empty".into()));
        }
        if shape.is_empty() {
            return Err(Error::InvalidDescriptor(format!("variable '{name}' has rank 0")));
        }
        if shape.len() > MAX_RANK {
            return Err(Error::InvalidDescriptor(format!(
                "variable '{name}' has rank {}, at most {MAX_RANK} is supported",
                shape.len()
            )));
        }
        if let Some(pos) = shape.iter().position(|&d| d == 0) {
            return Err(Error::InvalidDescriptor(format!(
                "variable '{name}' has zero extent in dimension {pos}"
            )));
        }
        if metadata.chunk_rows == 0 {
            return Err(Error::InvalidDescriptor(format!("variable '{name}' has chunk_rows = 0")));
        }
        if metadata.dim_names.len() != shape.len() {
            return Err(Error::InvalidDescriptor(format!(
                "variable '{name}' has {} dimension names for rank {}",
                metadata.dim_names.len(),
                shape.len()
            )));
        }
        Ok(Self {
            name: name.to_string(),
            shape: shape.to_vec(),
            dtype,
            metadata,
        })
    }

    /// Number of chunks the variable is split into.
    pub fn chunk_count(&self) -> u64 {
        self.shape[0].div_ceil(self.metadata.chunk_rows)
    }

    /// Total element count, or `None` on overflow.
    pub fn element_count(&self) -> Option<u64> {
        self.shape.iter().try_fold(1u64, |acc, &d| acc.checked_mul(d))
    }

    pub(crate) fn check_chunk(&self, chunk_index: u64) -> Result<()> {
        let count = self.chunk_count();
        if chunk_index >= count {
            return Err(Error::ChunkOutOfRange {
                variable: self.name.clone(),
                chunk: chunk_index,
                count,
            });
        }
        Ok(())
    }
}

/// Opaque reference to a variable inside one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariableHandle(pub(crate) u32);

impl VariableHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Write side of an array store.
pub trait ArraySink {
    /// Declare a variable. Names are unique per store.
    fn create_variable(
        &mut self,
        name: &str,
        shape: &[u64],
        dtype: DataType,
        metadata: VariableMetadata,
    ) -> Result<VariableHandle>;

    /// Commit the framed bytes of one chunk. Ownership of the bytes passes
    /// to the store.
    fn write_chunk(&mut self, var: VariableHandle, chunk_index: u64, bytes: &[u8]) -> Result<()>;
}

/// Read side of an array store.
pub trait ArraySource {
    fn variable_names(&self) -> Vec<String>;

    fn variable(&self, name: &str) -> Result<VariableHandle>;

    fn read_metadata(&self, var: VariableHandle) -> Result<VariableInfo>;

    fn read_chunk(&mut self, var: VariableHandle, chunk_index: u64) -> Result<Vec<u8>>;
}

struct MemoryVariable {
    info: VariableInfo,
    chunks: Vec<Option<Vec<u8>>>,
}

/// In-memory store. Keeps every committed chunk in a `Vec`.
#[derive(Default)]
pub struct MemoryStore {
    variables: Vec<MemoryVariable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, var: VariableHandle) -> Result<&MemoryVariable> {
        self.variables
            .get(var.index())
            .ok_or_else(|| Error::UnknownVariable(format!("#{}", var.0)))
    }

    /// Mutable access to a committed chunk, for corruption tests.
    pub fn chunk_bytes_mut(&mut self, var: VariableHandle, chunk_index: u64) -> Option<&mut Vec<u8>> {
        self.variables
            .get_mut(var.index())?
            .chunks
            .get_mut(chunk_index as usize)?
            .as_mut()
    }
}

impl ArraySink for MemoryStore {
    fn create_variable(
        &mut self,
        name: &str,
        shape: &[u64],
        dtype: DataType,
        metadata: VariableMetadata,
    ) -> Result<VariableHandle> {
        if self.variables.iter().any(|v| v.info.name == name) {
            return Err(Error::DuplicateVariable(name.to_string()));
        }
        let info = VariableInfo::new(name, shape, dtype, metadata)?;
        let chunk_count = info.chunk_count() as usize;
        self.variables.push(MemoryVariable {
            info,
            chunks: vec![None; chunk_count],
        });
        Ok(VariableHandle(self.variables.len() as u32 - 1))
    }

    fn write_chunk(&mut self, var: VariableHandle, chunk_index: u64, bytes: &[u8]) -> Result<()> {
        let variable = self
            .variables
            .get_mut(var.index())
            .ok_or_else(|| Error::UnknownVariable(format!("#{}", var.0)))?;
        variable.info.check_chunk(chunk_index)?;
        variable.chunks[chunk_index as usize] = Some(bytes.to_vec());
        Ok(())
    }
}

impl ArraySource for MemoryStore {
    fn variable_names(&self) -> Vec<String> {
        self.variables.iter().map(|v| v.info.name.clone()).collect()
    }

    fn variable(&self, name: &str) -> Result<VariableHandle> {
        self.variables
            .iter()
            .position(|v| v.info.name == name)
            .map(|i| VariableHandle(i as u32))
            .ok_or_else(|| Error::UnknownVariable(name.to_string()))
    }

    fn read_metadata(&self, var: VariableHandle) -> Result<VariableInfo> {
        Ok(self.get(var)?.info.clone())
    }

    fn read_chunk(&mut self, var: VariableHandle, chunk_index: u64) -> Result<Vec<u8>> {
        let variable = self.get(var)?;
        variable.info.check_chunk(chunk_index)?;
        variable.chunks[chunk_index as usize]
            .clone()
            .ok_or_else(|| Error::MissingChunk {
                variable: variable.info.name.clone(),
                chunk: chunk_index,
            })
    }
}

use std::ops::Range;

use qcf_core::format::MAX_RANK;
use qcf_core::{DataType, Error, Result};

/// Name, shape and element type of one array variable.
///
/// Element order is row-major: the last dimension varies fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayDescriptor {
    name: String,
    shape: Vec<u64>,
    dim_names: Vec<String>,
    fill_value: Option<f32>,
    element_count: usize,
}

impl ArrayDescriptor {
    /// Validate `shape` and build a descriptor with dimensions named
    /// `dim0`, `dim1`, ...
    pub fn new(name: impl Into<String>, shape: &[u64]) -> Result<Self> {
        let name = name.into();
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
        let element_count = shape
            .iter()
            .try_fold(1usize, |acc, &d| usize::try_from(d).ok().and_then(|d| acc.checked_mul(d)))
            .ok_or_else(|| {
                Error::InvalidDescriptor(format!("variable '{name}' shape {shape:?} is too large"))
            })?;
        let dim_names = (0..shape.len()).map(|i| format!("dim{i}")).collect();
        Ok(Self {
            name,
            shape: shape.to_vec(),
            dim_names,
            fill_value: None,
            element_count,
        })
    }

    pub fn with_dim_names<S: AsRef<str>>(mut self, names: &[S]) -> Result<Self> {
        if names.len() != self.shape.len() {
            return Err(Error::InvalidDescriptor(format!(
                "variable '{}' has rank {} but {} dimension names",
                self.name,
                self.shape.len(),
                names.len()
            )));
        }
        self.dim_names = names.iter().map(|n| n.as_ref().to_string()).collect();
        Ok(self)
    }

    pub fn with_fill_value(mut self, fill: Option<f32>) -> Self {
        self.fill_value = fill;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub fn dim_names(&self) -> &[String] {
        &self.dim_names
    }

    pub fn fill_value(&self) -> Option<f32> {
        self.fill_value
    }

    pub fn dtype(&self) -> DataType {
        DataType::F32
    }

    /// Product of the shape.
    pub fn element_count(&self) -> usize {
        self.element_count
    }

    /// Size of the raw row-major buffer in bytes.
    pub fn byte_len(&self) -> usize {
        self.element_count * self.dtype().size()
    }

    /// Elements in one step of the outermost dimension.
    pub fn row_len(&self) -> usize {
        self.element_count / self.shape[0] as usize
    }

    pub fn rows(&self) -> u64 {
        self.shape[0]
    }
}

/// Split of a variable into slabs along its outermost dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLayout {
    chunk_rows: u64,
}

impl ChunkLayout {
    /// The whole variable as a single chunk.
    pub fn whole(descriptor: &ArrayDescriptor) -> Self {
        Self {
            chunk_rows: descriptor.rows(),
        }
    }

    /// Slabs of `chunk_rows` outer rows; the last one may be shorter.
    /// Values past the outer extent are clamped to it.
    pub fn rows(descriptor: &ArrayDescriptor, chunk_rows: u64) -> Result<Self> {
        if chunk_rows == 0 {
            return Err(Error::InvalidDescriptor(format!(
                "variable '{}' needs at least one row per chunk",
                descriptor.name()
            )));
        }
        Ok(Self {
            chunk_rows: chunk_rows.min(descriptor.rows()),
        })
    }

    pub fn chunk_rows(&self) -> u64 {
        self.chunk_rows
    }

    pub fn chunk_count(&self, descriptor: &ArrayDescriptor) -> u64 {
        descriptor.rows().div_ceil(self.chunk_rows)
    }

    /// Row-major element range covered by chunk `index`.
    pub fn element_range(&self, descriptor: &ArrayDescriptor, index: u64) -> Range<usize> {
        let row_len = descriptor.row_len();
        let first = (index * self.chunk_rows).min(descriptor.rows()) as usize;
        let last = ((index + 1) * self.chunk_rows).min(descriptor.rows()) as usize;
        first * row_len..last * row_len
    }
}

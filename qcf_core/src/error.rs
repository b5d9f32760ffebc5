use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the QCF libraries can report.
///
/// The three kinds callers most often match on are [`Error::InvalidSpec`],
/// [`Error::ShapeMismatch`] and [`Error::CorruptChunk`]. Errors raised while
/// working on a particular variable are wrapped in [`Error::InVariable`];
/// use [`Error::root`] to look through that wrapper.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad encoding parameters (non-positive significant digits/bits, unknown codec name).
    #[error("invalid spec: {0}")]
    InvalidSpec(String),

    /// Element count disagrees with the declared shape.
    #[error("shape mismatch: expected {expected} elements, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// A chunk frame failed structural validation or decompression.
    #[error("corrupt chunk: {0}")]
    CorruptChunk(String),

    /// Shape, rank, dimension names or chunk layout are unusable.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("variable '{0}' already exists")]
    DuplicateVariable(String),

    #[error("chunk {chunk} of variable '{variable}' was never written")]
    MissingChunk { variable: String, chunk: u64 },

    #[error("chunk {chunk} out of range for variable '{variable}' ({count} chunks)")]
    ChunkOutOfRange {
        variable: String,
        chunk: u64,
        count: u64,
    },

    #[error("unknown codec id {0}")]
    UnknownCodec(u16),

    /// The on-disk container is malformed (bad magic, truncated directory, ...).
    #[error("invalid QCF data: {0}")]
    Format(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("in variable '{variable}'{}", chunk_label(.chunk))]
    InVariable {
        variable: String,
        chunk: Option<u64>,
        #[source]
        source: Box<Error>,
    },
}

fn chunk_label(chunk: &Option<u64>) -> String {
    match chunk {
        Some(idx) => format!(", chunk {idx}"),
        None => String::new(),
    }
}

impl Error {
    /// Attach the variable (and optionally chunk) being processed.
    pub fn in_variable(self, variable: &str, chunk: Option<u64>) -> Self {
        Error::InVariable {
            variable: variable.to_string(),
            chunk,
            source: Box::new(self),
        }
    }

    /// The underlying error with all [`Error::InVariable`] context removed.
    pub fn root(&self) -> &Error {
        match self {
            Error::InVariable { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_corrupt_chunk(&self) -> bool {
        matches!(self.root(), Error::CorruptChunk(_))
    }

    pub fn is_shape_mismatch(&self) -> bool {
        matches!(self.root(), Error::ShapeMismatch { .. })
    }

    pub fn is_invalid_spec(&self) -> bool {
        matches!(self.root(), Error::InvalidSpec(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_strips_nested_context() {
        let err = Error::CorruptChunk("checksum mismatch".into())
            .in_variable("field", Some(3))
            .in_variable("outer", None);
        assert!(err.is_corrupt_chunk());
        assert_eq!(err.to_string(), "in variable 'outer'");
        match err {
            Error::InVariable { source, .. } => {
                assert_eq!(source.to_string(), "in variable 'field', chunk 3");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

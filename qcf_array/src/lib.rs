//! Quantize, chunk and compress `f32` arrays, and read them back.
//!
//! ```text
//! values ──quantize──► packed LE f32 ──shuffle?──► compressor ──frame──► chunk
//! ```
//!
//! [`encode`] and [`decode`] work on in-memory [`EncodedVariable`]s;
//! [`write_variable`], [`read_variable`] and [`VariableReader`] move them
//! through any [`qcf_core::ArraySink`] / [`qcf_core::ArraySource`].

pub mod decoder;
pub mod descriptor;
pub mod encoder;
pub mod quantize;
pub mod spec;

pub use decoder::{decode, read_variable, VariableReader};
pub use descriptor::{ArrayDescriptor, ChunkLayout};
pub use encoder::{encode, write_variable, Chunk, EncodedVariable, VariableEncoder};
pub use quantize::{quantize, Quantizer};
pub use spec::{CodecKind, CompressionSpec, QuantizationSpec};

use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;

use qcf_codecs::compressor_by_id;
use qcf_codecs::shuffle::shuffle;
use qcf_core::{frame, ArraySink, Compressor, Error, Result, VariableHandle, VariableMetadata};

use crate::descriptor::{ArrayDescriptor, ChunkLayout};
use crate::quantize::Quantizer;
use crate::spec::{CompressionSpec, QuantizationSpec};

/// One framed chunk of an encoded variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub index: u64,
    pub bytes: Vec<u8>,
}

/// A variable after quantization and compression, ready for a store.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedVariable {
    pub descriptor: ArrayDescriptor,
    pub quantization: QuantizationSpec,
    pub compression: CompressionSpec,
    pub layout: ChunkLayout,
    /// Sorted by index, one per slab of `layout`.
    pub chunks: Vec<Chunk>,
}

impl EncodedVariable {
    /// The metadata record a store keeps for this variable.
    pub fn metadata(&self) -> VariableMetadata {
        VariableMetadata {
            quant_mode: self.quantization.mode_code(),
            quant_precision: self.quantization.precision().unwrap_or(0),
            codec_id: self.compression.codec_id(),
            compression_level: self.compression.level(),
            shuffle: self.compression.shuffle(),
            chunk_rows: self.layout.chunk_rows(),
            fill_value: self.descriptor.fill_value(),
            dim_names: self.descriptor.dim_names().to_vec(),
        }
    }

    /// Bytes across all chunk frames.
    pub fn stored_size(&self) -> usize {
        self.chunks.iter().map(|c| c.bytes.len()).sum()
    }
}

/// Quantizes, packs and compresses values for one variable.
///
/// Chunks are independent, so they are encoded in parallel.
pub struct VariableEncoder {
    descriptor: ArrayDescriptor,
    quantization: QuantizationSpec,
    quantizer: Quantizer,
    compression: CompressionSpec,
    compressor: Option<Arc<dyn Compressor>>,
    layout: ChunkLayout,
}

impl VariableEncoder {
    /// Validates both specs up front; a bad spec never reaches `encode`.
    pub fn new(
        descriptor: ArrayDescriptor,
        quantization: QuantizationSpec,
        compression: CompressionSpec,
    ) -> Result<Self> {
        let quantizer = Quantizer::new(quantization)
            .map_err(|e| e.in_variable(descriptor.name(), None))?
            .with_fill_value(descriptor.fill_value());
        let compressor = match compression {
            CompressionSpec::Off => None,
            CompressionSpec::On { codec, .. } => Some(
                compressor_by_id(codec.id()).map_err(|e| e.in_variable(descriptor.name(), None))?,
            ),
        };
        let layout = ChunkLayout::whole(&descriptor);
        Ok(Self {
            descriptor,
            quantization,
            quantizer,
            compression,
            compressor,
            layout,
        })
    }

    /// Split along the outer dimension into slabs of `chunk_rows` rows.
    pub fn with_chunk_rows(mut self, chunk_rows: u64) -> Result<Self> {
        self.layout = ChunkLayout::rows(&self.descriptor, chunk_rows)?;
        Ok(self)
    }

    pub fn descriptor(&self) -> &ArrayDescriptor {
        &self.descriptor
    }

    pub fn encode(&self, values: &[f32]) -> Result<EncodedVariable> {
        let name = self.descriptor.name();
        let expected = self.descriptor.element_count();
        if values.len() != expected {
            return Err(Error::ShapeMismatch {
                expected,
                actual: values.len(),
            }
            .in_variable(name, None));
        }

        let chunk_count = self.layout.chunk_count(&self.descriptor);
        let chunks = (0..chunk_count)
            .into_par_iter()
            .map(|index| {
                let range = self.layout.element_range(&self.descriptor, index);
                self.encode_chunk(&values[range])
                    .map(|bytes| Chunk { index, bytes })
                    .map_err(|e| e.in_variable(name, Some(index)))
            })
            .collect::<Result<Vec<_>>>()?;

        let encoded = EncodedVariable {
            descriptor: self.descriptor.clone(),
            quantization: self.quantization,
            compression: self.compression,
            layout: self.layout,
            chunks,
        };
        debug!(
            variable = name,
            quantization = %self.quantization,
            compression = %self.compression,
            chunks = chunk_count,
            raw_bytes = self.descriptor.byte_len(),
            stored_bytes = encoded.stored_size(),
            "encoded variable"
        );
        Ok(encoded)
    }

    fn encode_chunk(&self, values: &[f32]) -> Result<Vec<u8>> {
        let mut raw = Vec::with_capacity(values.len() * 4);
        for &v in values {
            raw.extend_from_slice(&self.quantizer.apply(v).to_le_bytes());
        }
        match &self.compressor {
            None => frame::store(&raw),
            Some(compressor) => {
                if self.compression.shuffle() {
                    raw = shuffle(&raw, self.descriptor.dtype().size());
                }
                frame::seal(compressor.as_ref(), &raw, self.compression.level())
            }
        }
    }
}

/// Encode `values` (row-major, `product(shape)` long) as a single chunk.
pub fn encode(
    descriptor: &ArrayDescriptor,
    quantization: QuantizationSpec,
    compression: CompressionSpec,
    values: &[f32],
) -> Result<EncodedVariable> {
    VariableEncoder::new(descriptor.clone(), quantization, compression)?.encode(values)
}

/// Declare the variable in `sink` and commit every chunk.
pub fn write_variable<S: ArraySink + ?Sized>(
    sink: &mut S,
    encoded: &EncodedVariable,
) -> Result<VariableHandle> {
    let name = encoded.descriptor.name();
    let var = sink.create_variable(
        name,
        encoded.descriptor.shape(),
        encoded.descriptor.dtype(),
        encoded.metadata(),
    )?;
    for chunk in &encoded.chunks {
        sink.write_chunk(var, chunk.index, &chunk.bytes)
            .map_err(|e| e.in_variable(name, Some(chunk.index)))?;
    }
    Ok(var)
}

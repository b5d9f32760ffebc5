use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;

use qcf_codecs::compressor_by_id;
use qcf_codecs::shuffle::unshuffle;
use qcf_core::frame::{self, FrameHeader};
use qcf_core::{ArraySource, Compressor, Error, Result, VariableHandle, VariableInfo};

use crate::descriptor::{ArrayDescriptor, ChunkLayout};
use crate::encoder::{Chunk, EncodedVariable};
use crate::spec::{CompressionSpec, QuantizationSpec};

const ELEM_SIZE: usize = 4;

/// Open one chunk frame and unpack it into `expected` values.
///
/// The frame's declared length is checked against the layout before any
/// decompressor allocates for it.
fn decode_chunk(
    compressor: &dyn Compressor,
    compression: CompressionSpec,
    bytes: &[u8],
    expected: usize,
) -> Result<Vec<f32>> {
    let declared = FrameHeader::parse(bytes)?.raw_len as usize;
    if declared != expected * ELEM_SIZE {
        debug!(
            expected_bytes = expected * ELEM_SIZE,
            declared,
            "chunk length disagrees with layout"
        );
        return Err(Error::ShapeMismatch {
            expected,
            actual: declared.div_ceil(ELEM_SIZE),
        });
    }
    let mut raw = frame::open(compressor, bytes)?;
    if compression.shuffle() {
        raw = unshuffle(&raw, ELEM_SIZE);
    }
    Ok(raw
        .chunks_exact(ELEM_SIZE)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn compressor_for(compression: CompressionSpec) -> Result<Arc<dyn Compressor>> {
    compressor_by_id(compression.codec_id())
}

/// Reverse [`crate::encode`]: decompress every chunk and reassemble the
/// row-major values. Quantization is not undone.
pub fn decode(encoded: &EncodedVariable) -> Result<Vec<f32>> {
    let descriptor = &encoded.descriptor;
    let name = descriptor.name();
    let compressor = compressor_for(encoded.compression).map_err(|e| e.in_variable(name, None))?;

    let chunk_count = encoded.layout.chunk_count(descriptor);
    if let Some(missing) = (0..chunk_count)
        .find(|&i| encoded.chunks.get(i as usize).map(|c| c.index) != Some(i))
    {
        return Err(Error::MissingChunk {
            variable: name.to_string(),
            chunk: missing,
        });
    }
    if encoded.chunks.len() as u64 != chunk_count {
        return Err(Error::Format(format!(
            "{} chunks for a layout of {chunk_count}",
            encoded.chunks.len()
        ))
        .in_variable(name, None));
    }

    let parts = encoded
        .chunks
        .par_iter()
        .map(|chunk| {
            let expected = encoded.layout.element_range(descriptor, chunk.index).len();
            decode_chunk(compressor.as_ref(), encoded.compression, &chunk.bytes, expected)
                .map_err(|e| e.in_variable(name, Some(chunk.index)))
        })
        .collect::<Result<Vec<_>>>()?;

    let values = parts.concat();
    debug!(variable = name, chunks = chunk_count, elements = values.len(), "decoded variable");
    Ok(values)
}

/// Rebuild the encoding parameters recorded with a stored variable.
fn parse_info(
    info: &VariableInfo,
) -> Result<(ArrayDescriptor, QuantizationSpec, CompressionSpec, ChunkLayout)> {
    let meta = &info.metadata;
    let descriptor = ArrayDescriptor::new(info.name.clone(), &info.shape)?
        .with_dim_names(&meta.dim_names)?
        .with_fill_value(meta.fill_value);
    let quantization = QuantizationSpec::from_metadata(meta.quant_mode, meta.quant_precision)?;
    let compression =
        CompressionSpec::from_metadata(meta.codec_id, meta.compression_level, meta.shuffle)?;
    let layout = ChunkLayout::rows(&descriptor, meta.chunk_rows)?;
    Ok((descriptor, quantization, compression, layout))
}

/// Lazily decodes a stored variable one chunk at a time.
///
/// Metadata is read once on [`VariableReader::open`]; chunk bytes are only
/// fetched from the source when asked for.
pub struct VariableReader<'a, S: ArraySource + ?Sized> {
    source: &'a mut S,
    handle: VariableHandle,
    descriptor: ArrayDescriptor,
    quantization: QuantizationSpec,
    compression: CompressionSpec,
    layout: ChunkLayout,
    compressor: Arc<dyn Compressor>,
}

impl<'a, S: ArraySource + ?Sized> VariableReader<'a, S> {
    pub fn open(source: &'a mut S, name: &str) -> Result<Self> {
        let handle = source.variable(name)?;
        let info = source.read_metadata(handle)?;
        let (descriptor, quantization, compression, layout) =
            parse_info(&info).map_err(|e| e.in_variable(name, None))?;
        let compressor = compressor_for(compression).map_err(|e| e.in_variable(name, None))?;
        Ok(Self {
            source,
            handle,
            descriptor,
            quantization,
            compression,
            layout,
            compressor,
        })
    }

    pub fn descriptor(&self) -> &ArrayDescriptor {
        &self.descriptor
    }

    pub fn quantization(&self) -> QuantizationSpec {
        self.quantization
    }

    pub fn compression(&self) -> CompressionSpec {
        self.compression
    }

    pub fn layout(&self) -> ChunkLayout {
        self.layout
    }

    pub fn chunk_count(&self) -> u64 {
        self.layout.chunk_count(&self.descriptor)
    }

    /// Framed bytes of chunk `index`, as stored.
    pub fn read_raw_chunk(&mut self, index: u64) -> Result<Vec<u8>> {
        self.source
            .read_chunk(self.handle, index)
            .map_err(|e| e.in_variable(self.descriptor.name(), Some(index)))
    }

    /// Decoded values of chunk `index`.
    pub fn read_chunk(&mut self, index: u64) -> Result<Vec<f32>> {
        let bytes = self.read_raw_chunk(index)?;
        let expected = self.layout.element_range(&self.descriptor, index).len();
        decode_chunk(self.compressor.as_ref(), self.compression, &bytes, expected)
            .map_err(|e| e.in_variable(self.descriptor.name(), Some(index)))
    }

    /// Every value of the variable, row-major.
    pub fn read_all(&mut self) -> Result<Vec<f32>> {
        let mut values = Vec::with_capacity(self.descriptor.element_count());
        for index in 0..self.chunk_count() {
            values.extend(self.read_chunk(index)?);
        }
        Ok(values)
    }

    /// Fetch every chunk frame without decoding.
    pub fn into_encoded(mut self) -> Result<EncodedVariable> {
        let chunks = (0..self.chunk_count())
            .map(|index| self.read_raw_chunk(index).map(|bytes| Chunk { index, bytes }))
            .collect::<Result<Vec<_>>>()?;
        Ok(EncodedVariable {
            descriptor: self.descriptor,
            quantization: self.quantization,
            compression: self.compression,
            layout: self.layout,
            chunks,
        })
    }
}

/// Load a stored variable's metadata and chunk frames.
pub fn read_variable<S: ArraySource + ?Sized>(
    source: &mut S,
    name: &str,
) -> Result<EncodedVariable> {
    VariableReader::open(source, name)?.into_encoded()
}

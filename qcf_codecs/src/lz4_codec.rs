use lz4_flex::block::{compress_into, decompress_into, get_maximum_output_size};
use qcf_core::format::CODEC_LZ4;
use qcf_core::{Compressor, Error, Result};

/// LZ4 block compressor.
///
/// Fastest decode of the bundled codecs; the level is ignored. The raw
/// length lives in the chunk frame, so blocks are stored without lz4's own
/// size prefix.
pub struct Lz4Codec;

impl Compressor for Lz4Codec {
    fn id(&self) -> u16 {
        CODEC_LZ4
    }

    fn name(&self) -> &'static str {
        "lz4"
    }

    fn max_level(&self) -> u32 {
        1
    }

    fn compress_block(&self, raw: &[u8], _level: u32) -> Result<Vec<u8>> {
        let mut out = vec![0u8; get_maximum_output_size(raw.len())];
        let n = compress_into(raw, &mut out)
            .map_err(|e| Error::Format(format!("lz4 compress error: {e}")))?;
        out.truncate(n);
        Ok(out)
    }

    fn decompress_block(&self, payload: &[u8], raw_len: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; raw_len];
        let n = decompress_into(payload, &mut out)
            .map_err(|e| Error::CorruptChunk(format!("lz4 decompress error: {e}")))?;
        out.truncate(n);
        Ok(out)
    }
}

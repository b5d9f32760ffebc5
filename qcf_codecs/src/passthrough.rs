use qcf_core::format::CODEC_PASSTHROUGH;
use qcf_core::{Compressor, Result};

/// No-op compressor: chunks are framed verbatim.
///
/// This is what `CompressionSpec::Off` and level 0 resolve to. Frames it
/// produces carry codec id 0 and open with any compressor.
pub struct PassThroughCodec;

impl Compressor for PassThroughCodec {
    fn id(&self) -> u16 {
        CODEC_PASSTHROUGH
    }

    fn name(&self) -> &'static str {
        "none"
    }

    fn max_level(&self) -> u32 {
        0
    }

    fn compress_block(&self, raw: &[u8], _level: u32) -> Result<Vec<u8>> {
        Ok(raw.to_vec())
    }

    fn decompress_block(&self, payload: &[u8], _raw_len: usize) -> Result<Vec<u8>> {
        Ok(payload.to_vec())
    }
}

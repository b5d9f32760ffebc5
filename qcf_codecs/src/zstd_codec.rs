use qcf_core::format::CODEC_ZSTD;
use qcf_core::{Compressor, Error, Result};

/// Zstandard chunk compressor.
///
/// Better ratio than deflate at similar speed on float data, especially
/// once quantization has zeroed the low mantissa bits.
pub struct ZstdCodec;

impl Compressor for ZstdCodec {
    fn id(&self) -> u16 {
        CODEC_ZSTD
    }

    fn name(&self) -> &'static str {
        "zstd"
    }

    fn max_level(&self) -> u32 {
        22
    }

    fn compress_block(&self, raw: &[u8], level: u32) -> Result<Vec<u8>> {
        Ok(zstd::bulk::compress(raw, level as i32)?)
    }

    fn decompress_block(&self, payload: &[u8], raw_len: usize) -> Result<Vec<u8>> {
        // The frame header gives the exact size, so a single bounded
        // allocation is enough.
        zstd::bulk::decompress(payload, raw_len)
            .map_err(|e| Error::CorruptChunk(format!("zstd decompress error: {e}")))
    }
}

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use qcf_core::format::CODEC_DEFLATE;
use qcf_core::{Compressor, Error, Result};

/// zlib-wrapped deflate, the classic filter of hierarchical scientific
/// data files. Levels 1–9.
pub struct DeflateCodec;

impl Compressor for DeflateCodec {
    fn id(&self) -> u16 {
        CODEC_DEFLATE
    }

    fn name(&self) -> &'static str {
        "deflate"
    }

    fn max_level(&self) -> u32 {
        9
    }

    fn compress_block(&self, raw: &[u8], level: u32) -> Result<Vec<u8>> {
        let mut enc = ZlibEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::new(level));
        enc.write_all(raw)?;
        Ok(enc.finish()?)
    }

    fn decompress_block(&self, payload: &[u8], raw_len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(raw_len);
        // Read one byte past the expected size so an oversized stream is
        // caught by the frame length check instead of inflating unbounded.
        ZlibDecoder::new(payload)
            .take(raw_len as u64 + 1)
            .read_to_end(&mut out)
            .map_err(|e| Error::CorruptChunk(format!("deflate stream error: {e}")))?;
        Ok(out)
    }
}

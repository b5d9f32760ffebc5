mod deflate;
mod lz4_codec;
mod passthrough;
pub mod shuffle;
mod zstd_codec;

pub use deflate::DeflateCodec;
pub use lz4_codec::Lz4Codec;
pub use passthrough::PassThroughCodec;
pub use zstd_codec::ZstdCodec;

use std::sync::Arc;

use qcf_core::format::{CODEC_DEFLATE, CODEC_LZ4, CODEC_PASSTHROUGH, CODEC_ZSTD};
use qcf_core::frame::{self, FrameHeader};
use qcf_core::{Compressor, Error, Result};

/// Resolve a compressor from its stored `codec_id`.
///
/// Used when decoding a variable: the codec id comes from the variable's
/// metadata or from the chunk frame itself.
pub fn compressor_by_id(id: u16) -> Result<Arc<dyn Compressor>> {
    match id {
        CODEC_PASSTHROUGH => Ok(Arc::new(PassThroughCodec)),
        CODEC_DEFLATE => Ok(Arc::new(DeflateCodec)),
        CODEC_ZSTD => Ok(Arc::new(ZstdCodec)),
        CODEC_LZ4 => Ok(Arc::new(Lz4Codec)),
        other => Err(Error::UnknownCodec(other)),
    }
}

/// Resolve a compressor from a user-facing name.
pub fn compressor_by_name(name: &str) -> Result<Arc<dyn Compressor>> {
    match name {
        "none" | "passthrough" | "store" => Ok(Arc::new(PassThroughCodec)),
        "deflate" | "zlib" | "gzip" => Ok(Arc::new(DeflateCodec)),
        "zstd" | "z" => Ok(Arc::new(ZstdCodec)),
        "lz4" | "l" => Ok(Arc::new(Lz4Codec)),
        other => Err(Error::InvalidSpec(format!(
            "unknown codec '{other}'; valid options: none, deflate, zstd, lz4"
        ))),
    }
}

/// Compress `raw` with codec `codec_id` at `level` into a self-describing
/// frame. Level 0 stores the bytes verbatim.
pub fn compress(raw: &[u8], codec_id: u16, level: u32) -> Result<Vec<u8>> {
    let compressor = compressor_by_id(codec_id)?;
    frame::seal(compressor.as_ref(), raw, level)
}

/// Decode any frame produced by [`compress`], picking the codec from the
/// frame header.
pub fn decompress(framed: &[u8]) -> Result<Vec<u8>> {
    let header = FrameHeader::parse(framed)?;
    let compressor = compressor_by_id(header.codec_id).map_err(|_| {
        Error::CorruptChunk(format!("frame names unknown codec {}", header.codec_id))
    })?;
    frame::open(compressor.as_ref(), framed)
}

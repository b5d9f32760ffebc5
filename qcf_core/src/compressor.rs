use crate::error::Result;

/// Lossless byte-block compression.
///
/// Each `Compressor`:
/// - Is identified by a stable numeric `id()` recorded in every chunk frame
///   and in the variable metadata, so a stored chunk names the codec that
///   produced it.
/// - Compresses blocks independently. No state survives between calls,
///   which is what lets chunks be encoded and decoded in any order or in
///   parallel.
///
/// Implementations live in `qcf_codecs`; framing (length prefix, checksum,
/// level-0 store) is handled once in [`crate::frame`], not per codec.
pub trait Compressor: Send + Sync {
    /// Stable codec ID stored in chunk frames and variable metadata.
    fn id(&self) -> u16;

    /// Human-readable codec name for CLI display.
    fn name(&self) -> &'static str;

    /// Highest accepted level. Levels above it are clamped by the caller.
    fn max_level(&self) -> u32;

    /// Compress one block at `level` (always >= 1; level 0 never reaches a codec).
    fn compress_block(&self, raw: &[u8], level: u32) -> Result<Vec<u8>>;

    /// Decompress one block. `raw_len` is the exact expected output size
    /// taken from the frame header and may be used to pre-size buffers.
    fn decompress_block(&self, payload: &[u8], raw_len: usize) -> Result<Vec<u8>>;
}

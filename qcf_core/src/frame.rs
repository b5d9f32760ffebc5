//! Chunk framing.
//!
//! Every stored chunk is wrapped in a small self-describing envelope:
//!
//! ```text
//! codec_id:u16 | raw_len:u32 | checksum:u64 | payload[..]
//! ```
//!
//! `codec_id` 0 marks a stored (uncompressed) payload. The checksum is the
//! xxh3-64 of `payload`, so a garbled or truncated frame is rejected before
//! any decompressor sees it.

use xxhash_rust::xxh3::xxh3_64;

use crate::compressor::Compressor;
use crate::error::{Error, Result};
use crate::format::CODEC_PASSTHROUGH;

pub const FRAME_HEADER_SIZE: usize = 14;

/// Decoded frame envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub codec_id: u16,
    pub raw_len: u32,
    pub checksum: u64,
}

impl FrameHeader {
    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut buf = [0u8; FRAME_HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.codec_id.to_le_bytes());
        buf[2..6].copy_from_slice(&self.raw_len.to_le_bytes());
        buf[6..14].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Parse the envelope at the start of `frame`.
    pub fn parse(frame: &[u8]) -> Result<Self> {
        if frame.len() < FRAME_HEADER_SIZE {
            return Err(Error::CorruptChunk(format!(
                "frame is {} bytes, shorter than the {FRAME_HEADER_SIZE}-byte header",
                frame.len()
            )));
        }
        Ok(Self {
            codec_id: u16::from_le_bytes([frame[0], frame[1]]),
            raw_len: u32::from_le_bytes([frame[2], frame[3], frame[4], frame[5]]),
            checksum: u64::from_le_bytes([
                frame[6], frame[7], frame[8], frame[9], frame[10], frame[11], frame[12], frame[13],
            ]),
        })
    }

    pub fn is_stored(&self) -> bool {
        self.codec_id == CODEC_PASSTHROUGH
    }
}

fn raw_len_u32(raw: &[u8]) -> Result<u32> {
    u32::try_from(raw.len()).map_err(|_| {
        Error::InvalidDescriptor(format!("chunk of {} bytes exceeds the 4 GiB frame limit", raw.len()))
    })
}

fn assemble(codec_id: u16, raw_len: u32, payload: &[u8]) -> Vec<u8> {
    let header = FrameHeader {
        codec_id,
        raw_len,
        checksum: xxh3_64(payload),
    };
    let mut out = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(payload);
    out
}

/// Frame `raw` verbatim, without compression.
pub fn store(raw: &[u8]) -> Result<Vec<u8>> {
    Ok(assemble(CODEC_PASSTHROUGH, raw_len_u32(raw)?, raw))
}

/// Compress `raw` with `compressor` at `level` and frame the result.
///
/// Level 0 stores the bytes verbatim. Levels above the codec's maximum are
/// clamped to it.
pub fn seal(compressor: &dyn Compressor, raw: &[u8], level: u32) -> Result<Vec<u8>> {
    let raw_len = raw_len_u32(raw)?;
    if level == 0 || compressor.id() == CODEC_PASSTHROUGH {
        return Ok(assemble(CODEC_PASSTHROUGH, raw_len, raw));
    }
    let payload = compressor.compress_block(raw, level.min(compressor.max_level()))?;
    Ok(assemble(compressor.id(), raw_len, &payload))
}

/// Validate `frame` and return its decoded bytes.
///
/// Stored frames open with any compressor; compressed frames require the
/// compressor whose id is recorded in the header. Every structural problem
/// is reported as [`Error::CorruptChunk`].
pub fn open(compressor: &dyn Compressor, frame: &[u8]) -> Result<Vec<u8>> {
    let header = FrameHeader::parse(frame)?;
    let payload = &frame[FRAME_HEADER_SIZE..];

    let computed = xxh3_64(payload);
    if computed != header.checksum {
        return Err(Error::CorruptChunk(format!(
            "checksum mismatch: expected {:016x}, got {:016x}",
            header.checksum, computed
        )));
    }

    let raw = if header.is_stored() {
        payload.to_vec()
    } else {
        if header.codec_id != compressor.id() {
            return Err(Error::CorruptChunk(format!(
                "frame was written by codec {} but codec {} ({}) was supplied",
                header.codec_id,
                compressor.id(),
                compressor.name()
            )));
        }
        compressor
            .decompress_block(payload, header.raw_len as usize)
            .map_err(|e| match e {
                Error::CorruptChunk(msg) => Error::CorruptChunk(msg),
                other => Error::CorruptChunk(format!("{} decompress failed: {other}", compressor.name())),
            })?
    };

    if raw.len() != header.raw_len as usize {
        return Err(Error::CorruptChunk(format!(
            "frame decoded to {} bytes but header says {}",
            raw.len(),
            header.raw_len
        )));
    }
    Ok(raw)
}

//! Byte-shuffle filter.
//!
//! Regroups an array of fixed-width elements by byte position: all first
//! bytes, then all second bytes, and so on. For `f32` data this puts the
//! slowly varying sign/exponent bytes next to each other and the (often
//! quantized-to-zero) low mantissa bytes next to each other, which deflate
//! and zstd compress far better than the interleaved layout.

/// Shuffle `data` made of `elem_size`-byte elements.
///
/// A trailing partial element (if `data.len()` is not a multiple of
/// `elem_size`) is copied through unchanged.
pub fn shuffle(data: &[u8], elem_size: usize) -> Vec<u8> {
    if elem_size <= 1 {
        return data.to_vec();
    }
    let n = data.len() / elem_size;
    let body = n * elem_size;
    let mut out = vec![0u8; data.len()];
    for (i, elem) in data[..body].chunks_exact(elem_size).enumerate() {
        for (b, &byte) in elem.iter().enumerate() {
            out[b * n + i] = byte;
        }
    }
    out[body..].copy_from_slice(&data[body..]);
    out
}

/// Inverse of [`shuffle`].
pub fn unshuffle(data: &[u8], elem_size: usize) -> Vec<u8> {
    if elem_size <= 1 {
        return data.to_vec();
    }
    let n = data.len() / elem_size;
    let body = n * elem_size;
    let mut out = vec![0u8; data.len()];
    for (i, elem) in out[..body].chunks_exact_mut(elem_size).enumerate() {
        for (b, byte) in elem.iter_mut().enumerate() {
            *byte = data[b * n + i];
        }
    }
    out[body..].copy_from_slice(&data[body..]);
    out
}

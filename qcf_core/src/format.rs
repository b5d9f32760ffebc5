use crate::error::{Error, Result};
use crate::store::{DataType, VariableInfo, VariableMetadata};

/// Magic bytes for QCF version 1 files: "QCF1\n" followed by 3 null bytes.
pub const MAGIC: &[u8; 8] = b"QCF1\n\x00\x00\x00";

pub const FORMAT_VERSION: u16 = 1;

/// Fixed size of the QCF1 file header in bytes.
///   magic[8] + version:u16 + flags:u16 + variable_count:u32
///   + chunk_count:u64 + reserved[8]
///   = 8 + 2 + 2 + 4 + 8 + 8 = 32
pub const HEADER_SIZE: u64 = 32;

/// Size of each ChunkEntry in a variable's chunk table, in bytes.
///   chunk_index:u64 + offset:u64 + len:u32 + _pad[4] + checksum:u64
///   = 8 + 8 + 4 + 4 + 8 = 32
pub const CHUNK_ENTRY_SIZE: u64 = 32;

/// Size of the directory footer (single u64 offset) in bytes.
pub const FOOTER_SIZE: u64 = 8;

/// Upper bound on variable rank, enforced on write and on parse.
pub const MAX_RANK: usize = 32;

// ── Flags ──────────────────────────────────────────────────────────────────

/// Each stored chunk carries an xxhash3-64 checksum in its directory entry.
pub const FLAG_HAS_CHECKSUM: u16 = 1 << 0;

// ── Codec IDs ──────────────────────────────────────────────────────────────

pub const CODEC_PASSTHROUGH: u16 = 0;
pub const CODEC_DEFLATE: u16 = 1;
pub const CODEC_ZSTD: u16 = 2;
pub const CODEC_LZ4: u16 = 3;

// ── Header ─────────────────────────────────────────────────────────────────

/// Decoded representation of the 32-byte QCF1 file header.
#[derive(Debug, Clone)]
pub struct QcfHeader {
    pub version: u16,
    pub flags: u16,
    pub variable_count: u32,
    pub chunk_count: u64,
}

impl QcfHeader {
    /// Serialize to exactly `HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[..8].copy_from_slice(MAGIC);
        buf[8..10].copy_from_slice(&self.version.to_le_bytes());
        buf[10..12].copy_from_slice(&self.flags.to_le_bytes());
        buf[12..16].copy_from_slice(&self.variable_count.to_le_bytes());
        buf[16..24].copy_from_slice(&self.chunk_count.to_le_bytes());
        // reserved[8] stays zero
        buf
    }

    /// Deserialize from `HEADER_SIZE` bytes, checking the magic.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE as usize]) -> Result<Self> {
        if &buf[..8] != MAGIC {
            return Err(Error::Format("invalid magic bytes, not a QCF1 file".into()));
        }
        let mut cur = ByteCursor::new(&buf[8..24]);
        Ok(Self {
            version: cur.u16()?,
            flags: cur.u16()?,
            variable_count: cur.u32()?,
            chunk_count: cur.u64()?,
        })
    }

    pub fn has_flag(&self, flag: u16) -> bool {
        self.flags & flag != 0
    }
}

// ── Chunk table entry ──────────────────────────────────────────────────────

/// Locates and describes one stored chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkEntry {
    /// Position of the chunk within its variable.
    pub chunk_index: u64,
    /// Byte offset of the chunk from the start of the file.
    pub offset: u64,
    /// Stored length in bytes (the full frame).
    pub len: u32,
    /// xxhash3-64 of the stored bytes.
    pub checksum: u64,
}

impl ChunkEntry {
    /// Serialize to exactly `CHUNK_ENTRY_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; CHUNK_ENTRY_SIZE as usize] {
        let mut buf = [0u8; CHUNK_ENTRY_SIZE as usize];
        buf[0..8].copy_from_slice(&self.chunk_index.to_le_bytes());
        buf[8..16].copy_from_slice(&self.offset.to_le_bytes());
        buf[16..20].copy_from_slice(&self.len.to_le_bytes());
        // buf[20..24] = 4 bytes padding, stays zero
        buf[24..32].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    fn read(cur: &mut ByteCursor<'_>) -> Result<Self> {
        let chunk_index = cur.u64()?;
        let offset = cur.u64()?;
        let len = cur.u32()?;
        cur.skip(4)?;
        let checksum = cur.u64()?;
        Ok(Self {
            chunk_index,
            offset,
            len,
            checksum,
        })
    }
}

// ── Directory ──────────────────────────────────────────────────────────────

/// One variable's directory record: definition, encoding metadata, and the
/// table of chunks that were actually written.
///
/// ```text
/// name_len:u16 name[..] dtype:u8 rank:u8 shape[rank]:u64
/// (dim_name_len:u16 dim_name[..]) × rank
/// quant_mode:u8 quant_precision:u32 codec_id:u16 compression_level:u32
/// shuffle:u8 has_fill:u8 fill_bits:u32 chunk_rows:u64
/// entry_count:u64 ChunkEntry × entry_count
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct VariableRecord {
    pub info: VariableInfo,
    pub entries: Vec<ChunkEntry>,
}

impl VariableRecord {
    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        let info = &self.info;
        let meta = &info.metadata;
        put_str(out, &info.name)?;
        out.push(info.dtype.tag());
        let rank = u8::try_from(info.shape.len())
            .ok()
            .filter(|&r| r as usize <= MAX_RANK)
            .ok_or_else(|| {
                Error::InvalidDescriptor(format!(
                    "variable '{}' has unsupported rank {}",
                    info.name,
                    info.shape.len()
                ))
            })?;
        out.push(rank);
        for d in &info.shape {
            out.extend_from_slice(&d.to_le_bytes());
        }
        for name in &meta.dim_names {
            put_str(out, name)?;
        }
        out.push(meta.quant_mode);
        out.extend_from_slice(&meta.quant_precision.to_le_bytes());
        out.extend_from_slice(&meta.codec_id.to_le_bytes());
        out.extend_from_slice(&meta.compression_level.to_le_bytes());
        out.push(meta.shuffle as u8);
        out.push(meta.fill_value.is_some() as u8);
        out.extend_from_slice(&meta.fill_value.unwrap_or(0.0).to_bits().to_le_bytes());
        out.extend_from_slice(&meta.chunk_rows.to_le_bytes());
        out.extend_from_slice(&(self.entries.len() as u64).to_le_bytes());
        for entry in &self.entries {
            out.extend_from_slice(&entry.to_bytes());
        }
        Ok(())
    }

    pub fn read_from(cur: &mut ByteCursor<'_>) -> Result<Self> {
        let name = cur.string()?;
        let dtype = DataType::from_tag(cur.u8()?)?;
        let rank = cur.u8()? as usize;
        if rank == 0 || rank > MAX_RANK {
            return Err(Error::Format(format!("variable '{name}' has unsupported rank {rank}")));
        }
        let shape = (0..rank).map(|_| cur.u64()).collect::<Result<Vec<_>>>()?;
        let dim_names = (0..rank).map(|_| cur.string()).collect::<Result<Vec<_>>>()?;
        let quant_mode = cur.u8()?;
        let quant_precision = cur.u32()?;
        let codec_id = cur.u16()?;
        let compression_level = cur.u32()?;
        let shuffle = cur.u8()? != 0;
        let has_fill = cur.u8()? != 0;
        let fill_bits = cur.u32()?;
        let chunk_rows = cur.u64()?;
        let metadata = VariableMetadata {
            quant_mode,
            quant_precision,
            codec_id,
            compression_level,
            shuffle,
            chunk_rows,
            fill_value: has_fill.then(|| f32::from_bits(fill_bits)),
            dim_names,
        };
        let info = VariableInfo::new(&name, &shape, dtype, metadata)
            .map_err(|e| Error::Format(format!("directory record: {e}")))?;

        let entry_count = cur.u64()?;
        let table_fits = entry_count
            .checked_mul(CHUNK_ENTRY_SIZE)
            .is_some_and(|bytes| bytes <= cur.remaining() as u64);
        if entry_count > info.chunk_count() || !table_fits {
            return Err(Error::Format(format!(
                "variable '{name}' lists {entry_count} chunk entries for {} chunks",
                info.chunk_count()
            )));
        }
        let entries = (0..entry_count)
            .map(|_| ChunkEntry::read(cur))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { info, entries })
    }
}

fn put_str(out: &mut Vec<u8>, s: &str) -> Result<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| Error::InvalidDescriptor(format!("name of {} bytes is too long", s.len())))?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

/// Little-endian reader over a byte slice that reports truncation as
/// [`Error::Format`].
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::Format(format!(
                "truncated data: needed {n} bytes at offset {}, {} left",
                self.pos,
                self.remaining()
            )));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array::<2>()?))
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array::<4>()?))
    }

    pub fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array::<8>()?))
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn string(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| Error::Format("name is not valid UTF-8".into()))
    }
}

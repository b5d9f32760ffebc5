use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

use crate::error::{Error, Result};
use crate::format::{
    ByteCursor, ChunkEntry, QcfHeader, VariableRecord, FLAG_HAS_CHECKSUM, FOOTER_SIZE,
    FORMAT_VERSION, HEADER_SIZE,
};
use crate::store::{ArraySource, VariableHandle, VariableInfo};

/// Random-access reader for QCF1 files.
///
/// # Open sequence
/// 1. Read the 32-byte header (magic check, version, variable/chunk counts).
/// 2. Seek to `file_end - 8`, read the `directory_offset` u64.
/// 3. Read the directory into RAM: one [`VariableRecord`] per variable.
///
/// # Access pattern
/// [`ArraySource::read_chunk`] seeks directly to the chunk's byte offset,
/// reads exactly its stored length, and verifies the checksum. No other
/// chunk is touched.
pub struct FileReader {
    file: File,
    pub header: QcfHeader,
    variables: Vec<VariableRecord>,
    file_size: u64,
}

impl FileReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();
        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(Error::Format(format!("file is only {file_size} bytes")));
        }

        // ── Read and validate header ────────────────────────────────────────
        let mut header_buf = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header_buf)?;
        let header = QcfHeader::from_bytes(&header_buf)?;
        if header.version != FORMAT_VERSION {
            return Err(Error::Format(format!(
                "unsupported QCF version {} (only version {FORMAT_VERSION} is supported)",
                header.version
            )));
        }

        // ── Read footer → directory offset ──────────────────────────────────
        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer_buf = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer_buf)?;
        let directory_offset = u64::from_le_bytes(footer_buf);
        let directory_end = file_size - FOOTER_SIZE;
        if directory_offset < HEADER_SIZE || directory_offset > directory_end {
            return Err(Error::Format(format!(
                "directory offset {directory_offset} outside file of {file_size} bytes"
            )));
        }

        // ── Load directory ──────────────────────────────────────────────────
        file.seek(SeekFrom::Start(directory_offset))?;
        let mut directory = vec![0u8; (directory_end - directory_offset) as usize];
        file.read_exact(&mut directory)?;
        let mut cur = ByteCursor::new(&directory);
        let variables = (0..header.variable_count)
            .map(|_| VariableRecord::read_from(&mut cur))
            .collect::<Result<Vec<_>>>()?;

        let listed: u64 = variables.iter().map(|v| v.entries.len() as u64).sum();
        if listed != header.chunk_count {
            return Err(Error::Format(format!(
                "header says {} chunks but directory lists {listed}",
                header.chunk_count
            )));
        }

        debug!(variables = variables.len(), chunks = listed, "opened QCF1 file");
        Ok(Self {
            file,
            header,
            variables,
            file_size,
        })
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    fn record(&self, var: VariableHandle) -> Result<&VariableRecord> {
        self.variables
            .get(var.index())
            .ok_or_else(|| Error::UnknownVariable(format!("#{}", var.index())))
    }

    /// The chunk table of a variable, sorted by chunk index.
    pub fn entries(&self, var: VariableHandle) -> Result<&[ChunkEntry]> {
        Ok(&self.record(var)?.entries)
    }

    /// Total stored bytes of a variable's chunks.
    pub fn stored_size(&self, var: VariableHandle) -> Result<u64> {
        Ok(self.entries(var)?.iter().map(|e| e.len as u64).sum())
    }
}

impl ArraySource for FileReader {
    fn variable_names(&self) -> Vec<String> {
        self.variables.iter().map(|v| v.info.name.clone()).collect()
    }

    fn variable(&self, name: &str) -> Result<VariableHandle> {
        self.variables
            .iter()
            .position(|v| v.info.name == name)
            .map(|i| VariableHandle(i as u32))
            .ok_or_else(|| Error::UnknownVariable(name.to_string()))
    }

    fn read_metadata(&self, var: VariableHandle) -> Result<VariableInfo> {
        Ok(self.record(var)?.info.clone())
    }

    fn read_chunk(&mut self, var: VariableHandle, chunk_index: u64) -> Result<Vec<u8>> {
        let record = self.record(var)?;
        record.info.check_chunk(chunk_index)?;
        let entry = record
            .entries
            .binary_search_by_key(&chunk_index, |e| e.chunk_index)
            .map(|pos| record.entries[pos].clone())
            .map_err(|_| Error::MissingChunk {
                variable: record.info.name.clone(),
                chunk: chunk_index,
            })?;

        let end = entry.offset.checked_add(entry.len as u64);
        if entry.offset < HEADER_SIZE || end.map_or(true, |end| end > self.file_size) {
            return Err(Error::Format(format!(
                "chunk {chunk_index} of variable '{}' points outside the file",
                record.info.name
            )));
        }

        self.file.seek(SeekFrom::Start(entry.offset))?;
        let mut bytes = vec![0u8; entry.len as usize];
        self.file.read_exact(&mut bytes)?;

        if self.header.has_flag(FLAG_HAS_CHECKSUM) {
            let computed = xxh3_64(&bytes);
            if computed != entry.checksum {
                return Err(Error::CorruptChunk(format!(
                    "stored checksum mismatch: expected {:016x}, got {:016x}",
                    entry.checksum, computed
                )));
            }
        }
        Ok(bytes)
    }
}

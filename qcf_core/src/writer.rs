use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

use crate::error::{Error, Result};
use crate::format::{
    ChunkEntry, QcfHeader, VariableRecord, FLAG_HAS_CHECKSUM, FORMAT_VERSION, HEADER_SIZE,
};
use crate::store::{ArraySink, DataType, VariableHandle, VariableInfo, VariableMetadata};

/// Streaming writer for QCF1 files.
///
/// # Write contract
/// Declare variables with [`ArraySink::create_variable`] and commit chunk
/// frames with [`ArraySink::write_chunk`], in any order and interleaved
/// across variables. Chunk bytes go straight to disk; only the small chunk
/// table is kept in memory. Call [`FileWriter::finish`] to append the
/// directory and footer and write back the final header.
///
/// # Format layout written
/// ```text
/// [HEADER: 32 bytes placeholder]
/// [CHUNK] [CHUNK] ...                      ← frames, in arrival order
/// [DIRECTORY: one record per variable]
/// [FOOTER: 8 bytes, u64 LE offset of the directory]
/// ← seek back to 0, overwrite header with real values
/// ```
pub struct FileWriter {
    file: BufWriter<File>,
    path: PathBuf,
    variables: Vec<VariableRecord>,
    /// Current write position in the file (mirrors the file cursor).
    current_offset: u64,
}

impl FileWriter {
    /// Create a new QCF1 file at `path`, overwriting any existing file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = BufWriter::new(File::create(&path)?);
        // Placeholder header, overwritten in finish()
        file.write_all(&[0u8; HEADER_SIZE as usize])?;
        Ok(Self {
            file,
            path,
            variables: Vec::new(),
            current_offset: HEADER_SIZE,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record_mut(&mut self, var: VariableHandle) -> Result<&mut VariableRecord> {
        self.variables
            .get_mut(var.index())
            .ok_or_else(|| Error::UnknownVariable(format!("#{}", var.index())))
    }

    /// Write the directory and footer, seal the header, and sync to disk.
    ///
    /// Returns the number of chunks written.
    pub fn finish(mut self) -> Result<u64> {
        // ── Directory ──────────────────────────────────────────────────────
        let directory_offset = self.current_offset;
        let mut directory = Vec::new();
        for record in &mut self.variables {
            record.entries.sort_by_key(|e| e.chunk_index);
            record.write_to(&mut directory)?;
        }
        self.file.write_all(&directory)?;
        self.current_offset += directory.len() as u64;

        // ── Footer: 8-byte u64 LE offset of the directory ─────────────────
        self.file.write_all(&directory_offset.to_le_bytes())?;

        // ── Seek back to 0 and write the real header ───────────────────────
        let chunk_count: u64 = self.variables.iter().map(|v| v.entries.len() as u64).sum();
        let header = QcfHeader {
            version: FORMAT_VERSION,
            flags: FLAG_HAS_CHECKSUM,
            variable_count: self.variables.len() as u32,
            chunk_count,
        };
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header.to_bytes())?;
        self.file.flush()?;
        self.file.get_ref().sync_all()?;

        info!(
            path = %self.path.display(),
            variables = self.variables.len(),
            chunks = chunk_count,
            bytes = self.current_offset + 8,
            "sealed QCF1 file"
        );
        Ok(chunk_count)
    }
}

impl ArraySink for FileWriter {
    fn create_variable(
        &mut self,
        name: &str,
        shape: &[u64],
        dtype: DataType,
        metadata: VariableMetadata,
    ) -> Result<VariableHandle> {
        if self.variables.iter().any(|v| v.info.name == name) {
            return Err(Error::DuplicateVariable(name.to_string()));
        }
        let info = VariableInfo::new(name, shape, dtype, metadata)?;
        debug!(variable = name, ?shape, chunks = info.chunk_count(), "defined variable");
        self.variables.push(VariableRecord {
            info,
            entries: Vec::new(),
        });
        Ok(VariableHandle(self.variables.len() as u32 - 1))
    }

    fn write_chunk(&mut self, var: VariableHandle, chunk_index: u64, bytes: &[u8]) -> Result<()> {
        let offset = self.current_offset;
        let len = u32::try_from(bytes.len())
            .map_err(|_| Error::Format(format!("chunk of {} bytes is too large", bytes.len())))?;

        {
            let record = self.record_mut(var)?;
            record.info.check_chunk(chunk_index)?;
            if record.entries.iter().any(|e| e.chunk_index == chunk_index) {
                return Err(Error::Format(format!(
                    "chunk {chunk_index} of variable '{}' written twice",
                    record.info.name
                )));
            }
        }

        self.file.write_all(bytes)?;
        self.current_offset += len as u64;

        let record = self.record_mut(var)?;
        record.entries.push(ChunkEntry {
            chunk_index,
            offset,
            len,
            checksum: xxh3_64(bytes),
        });
        debug!(variable = %record.info.name, chunk = chunk_index, offset, len, "wrote chunk");
        Ok(())
    }
}

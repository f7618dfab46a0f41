//! FileArchive - writes archived batches to disk as JSON lines

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use contracts::{ArchiveBatch, ArchiveSink, ContractError};
use tracing::{debug, error, instrument};

/// Archive that writes one `.jsonl` file per batch
///
/// Layout: `<base_path>/<YYYY-MM-DD>/<sequence>-<batch_id>.jsonl`, one record
/// per line. Batch ids are sanitised for use as file names.
pub struct FileArchive {
    name: String,
    base_path: PathBuf,
    sequence: u64,
}

impl FileArchive {
    /// Create a new FileArchive, creating `base_path` if needed
    pub fn new(name: impl Into<String>, base_path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;

        Ok(Self {
            name: name.into(),
            base_path,
            sequence: 0,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn write_batch_to_disk(&mut self, batch: &ArchiveBatch) -> std::io::Result<PathBuf> {
        let day_dir = self
            .base_path
            .join(batch.archived_at.format("%Y-%m-%d").to_string());
        fs::create_dir_all(&day_dir)?;

        self.sequence += 1;
        let path = day_dir.join(format!(
            "{:06}-{}.jsonl",
            self.sequence,
            sanitize(&batch.batch_id)
        ));

        let mut writer = BufWriter::new(File::create(&path)?);
        for record in &batch.records {
            serde_json::to_writer(&mut writer, record)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(path)
    }
}

fn sanitize(batch_id: &str) -> String {
    let cleaned: String = batch_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect();
    if cleaned.is_empty() {
        "batch".to_string()
    } else {
        cleaned
    }
}

impl ArchiveSink for FileArchive {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_archive_write",
        skip(self, batch),
        fields(archive = %self.name, batch_id = %batch.batch_id)
    )]
    async fn write_batch(&mut self, batch: &ArchiveBatch) -> Result<(), ContractError> {
        match self.write_batch_to_disk(batch) {
            Ok(path) => {
                debug!(path = %path.display(), records = batch.records.len(), "batch archived");
                Ok(())
            }
            Err(e) => {
                error!(archive = %self.name, error = %e, "Write failed");
                Err(ContractError::transient_io("archive write", e.to_string()))
            }
        }
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "file_archive_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        debug!(archive = %self.name, batches = self.sequence, "FileArchive closed");
        Ok(())
    }
}

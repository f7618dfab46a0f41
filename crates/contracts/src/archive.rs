//! ArchiveSink trait - batch-oriented file/object store interface
//!
//! Accepted records are archived per ingested batch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContractError, Record};

/// Unit of archival write
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveBatch {
    /// Originating batch id
    pub batch_id: String,

    /// Producer name
    pub source: String,

    /// When the batch was archived
    pub archived_at: DateTime<Utc>,

    /// Records accepted from the batch
    pub records: Vec<Record>,
}

/// Archive output trait
///
/// All archive implementations must implement this trait.
#[trait_variant::make(ArchiveSink: Send)]
pub trait LocalArchiveSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one batch
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write_batch(&mut self, batch: &ArchiveBatch) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}

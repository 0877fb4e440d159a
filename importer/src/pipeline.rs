//! The read → normalize → write → log loop.
//!
//! A failure to normalize or write a chunk is logged and the run moves on to the next
//! chunk. A failure to read (bad time value, broken CSV) ends the run immediately and
//! the writer is not closed.

use anyhow::{Context, Result};
use log::{error, info};
use std::fmt;

use crate::config::ImportConfig;
use crate::normalize::{normalize_batch, BatchError};
use crate::reader::{ChunkReader, ReadError, RecordBatch};
use crate::writer::BatchWriter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Zero-based; rendered 1-based in log lines.
    pub index: usize,
    pub rows: usize,
    pub error: Option<String>,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl fmt::Display for BatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            None => write!(
                f,
                "Chunk {} written to InfluxDB with {} records.",
                self.index + 1,
                self.rows
            ),
            Some(message) => write!(f, "Error writing chunk {}: {}", self.index + 1, message),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub outcomes: Vec<BatchOutcome>,
}

impl RunSummary {
    pub fn batches(&self) -> usize {
        self.outcomes.len()
    }

    pub fn written(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.batches() - self.written()
    }

    pub fn rows_written(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.is_success())
            .map(|o| o.rows)
            .sum()
    }

    pub fn rows_failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| o.rows)
            .sum()
    }
}

async fn process_batch<W: BatchWriter>(
    writer: &mut W,
    batch: RecordBatch,
) -> Result<(), BatchError> {
    let normalized = normalize_batch(batch)?;
    writer.write(&normalized).await
}

/// Drive every batch through the writer in file order, then close the writer.
pub async fn run_import<I, W>(batches: I, mut writer: W) -> Result<RunSummary>
where
    I: IntoIterator<Item = Result<RecordBatch, ReadError>>,
    W: BatchWriter,
{
    let mut summary = RunSummary::default();

    for batch in batches {
        let batch = batch.context("Failed to read CSV chunk")?;
        let index = batch.index;
        let rows = batch.len();

        let outcome = match process_batch(&mut writer, batch).await {
            Ok(()) => {
                let outcome = BatchOutcome { index, rows, error: None };
                info!("{}", outcome);
                outcome
            }
            Err(e) => {
                let outcome = BatchOutcome {
                    index,
                    rows,
                    error: Some(e.to_string()),
                };
                error!("{}", outcome);
                outcome
            }
        };
        summary.outcomes.push(outcome);
    }

    info!("Data import completed.");
    info!(
        "Chunks: {} written, {} failed; records: {} written, {} failed",
        summary.written(),
        summary.failed(),
        summary.rows_written(),
        summary.rows_failed()
    );

    writer.close().await?;
    Ok(summary)
}

/// Open the configured CSV file and import it through `writer`.
pub async fn import_file<W: BatchWriter>(config: &ImportConfig, writer: W) -> Result<RunSummary> {
    info!(
        "Importing {} into bucket '{}' as '{}' ({} rows per chunk)",
        config.csv_path.display(),
        config.bucket,
        config.measurement,
        config.chunk_size
    );
    let reader = ChunkReader::open(&config.csv_path, config.chunk_size, &config.time_column)
        .context("Failed to open CSV input")?;
    run_import(reader, writer).await
}

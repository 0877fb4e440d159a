use async_trait::async_trait;
use influxdb::{Client, Timestamp, WriteQuery};
use log::{debug, info};

use crate::config::ImportConfig;
use crate::normalize::{BatchError, FieldValue, NormalizedBatch};

/// Destination for normalized batches. One instance lives for the whole run.
#[async_trait]
pub trait BatchWriter: Send {
    /// Persist the batch; returns once the store has acknowledged it.
    async fn write(&mut self, batch: &NormalizedBatch) -> Result<(), BatchError>;

    /// Release the connection. Consumes the writer so it cannot be used or closed again.
    async fn close(self) -> anyhow::Result<()>
    where
        Self: Sized;
}

pub struct InfluxWriter {
    client: Client,
    measurement: String,
}

impl InfluxWriter {
    pub fn connect(config: &ImportConfig) -> Self {
        info!(
            "Connecting to InfluxDB at {} (org '{}', bucket '{}')",
            config.url, config.org, config.bucket
        );
        let mut client = Client::new(&config.url, &config.bucket);
        if !config.token.is_empty() {
            client = client.with_token(&config.token);
        }
        Self {
            client,
            measurement: config.measurement.clone(),
        }
    }
}

#[async_trait]
impl BatchWriter for InfluxWriter {
    async fn write(&mut self, batch: &NormalizedBatch) -> Result<(), BatchError> {
        let queries = build_queries(batch, &self.measurement)?;
        if queries.is_empty() {
            debug!("Chunk {} has no field values, nothing sent", batch.index + 1);
            return Ok(());
        }
        debug!("Sending {} points for chunk {}", queries.len(), batch.index + 1);
        self.client
            .query(queries)
            .await
            .map_err(|e| BatchError::Write(e.to_string()))?;
        Ok(())
    }

    async fn close(self) -> anyhow::Result<()> {
        info!("Closing InfluxDB connection");
        drop(self.client);
        Ok(())
    }
}

/// One point per row under `measurement`, no tags, the row key as timestamp.
/// Rows whose cells are all missing are dropped since a point needs a field.
pub fn build_queries(
    batch: &NormalizedBatch,
    measurement: &str,
) -> Result<Vec<WriteQuery>, BatchError> {
    let mut queries = Vec::with_capacity(batch.len());
    let mut skipped = 0usize;

    for (row_no, (ts, row)) in batch.timestamps.iter().zip(batch.rows.iter()).enumerate() {
        if row.iter().all(Option::is_none) {
            skipped += 1;
            continue;
        }

        let nanos = ts
            .timestamp_nanos_opt()
            .and_then(|n| u128::try_from(n).ok())
            .ok_or(BatchError::TimestampOutOfRange {
                row: row_no + 1,
                timestamp: *ts,
            })?;

        let mut query = WriteQuery::new(Timestamp::Nanoseconds(nanos), measurement);
        for (name, value) in batch.columns.iter().zip(row.iter()) {
            query = match value {
                Some(FieldValue::Integer(v)) => query.add_field(name, *v),
                Some(FieldValue::Float(v)) => query.add_field(name, *v),
                Some(FieldValue::Boolean(v)) => query.add_field(name, *v),
                Some(FieldValue::Text(v)) => query.add_field(name, v.clone()),
                None => query,
            };
        }
        queries.push(query);
    }

    if skipped > 0 {
        debug!(
            "Chunk {}: skipped {} rows without field values",
            batch.index + 1,
            skipped
        );
    }
    Ok(queries)
}

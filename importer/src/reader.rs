//! Chunked CSV reading.
//!
//! [`ChunkReader`] pulls at most `chunk_size` rows per step out of a CSV source and
//! parses the designated time column as it goes. A time value that does not parse is
//! fatal for the whole run, so the iterator stops after yielding that error.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use csv::{ReaderBuilder, StringRecord};
use log::debug;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("time column '{0}' not found in CSV header")]
    MissingTimeColumn(String),

    #[error("row {row}: cannot parse '{value}' in column '{column}' as a date/time")]
    TimeParse {
        row: usize,
        column: String,
        value: String,
    },
}

/// One chunk of consecutive source rows, still carrying the original header.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    /// Zero-based position of this batch in the file.
    pub index: usize,
    pub headers: Vec<String>,
    pub time_index: usize,
    /// Parsed value of the time column, one per row.
    pub timestamps: Vec<DateTime<Utc>>,
    /// Raw cells, padded to the header width.
    pub rows: Vec<Vec<String>>,
}

impl RecordBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub struct ChunkReader<R: io::Read> {
    reader: csv::Reader<R>,
    headers: Vec<String>,
    time_index: usize,
    chunk_size: usize,
    next_index: usize,
    rows_read: usize,
    finished: bool,
}

impl ChunkReader<File> {
    pub fn open(
        path: impl AsRef<Path>,
        chunk_size: usize,
        time_column: &str,
    ) -> Result<Self, ReadError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ReadError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file, chunk_size, time_column)
    }
}

impl<R: io::Read> ChunkReader<R> {
    pub fn from_reader(source: R, chunk_size: usize, time_column: &str) -> Result<Self, ReadError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(source);

        let headers = dedupe_headers(reader.headers()?.iter().map(str::to_string).collect());
        let time_index = headers
            .iter()
            .position(|h| h == time_column)
            .ok_or_else(|| ReadError::MissingTimeColumn(time_column.to_string()))?;

        Ok(Self {
            reader,
            headers,
            time_index,
            chunk_size: chunk_size.max(1),
            next_index: 0,
            rows_read: 0,
            finished: false,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    fn read_batch(&mut self) -> Result<Option<RecordBatch>, ReadError> {
        let mut rows = Vec::with_capacity(self.chunk_size.min(4096));
        let mut timestamps = Vec::with_capacity(self.chunk_size.min(4096));
        let mut record = StringRecord::new();

        while rows.len() < self.chunk_size {
            if !self.reader.read_record(&mut record)? {
                self.finished = true;
                break;
            }
            self.rows_read += 1;

            let raw_time = record.get(self.time_index).unwrap_or("");
            let ts = parse_timestamp(raw_time).ok_or_else(|| ReadError::TimeParse {
                row: self.rows_read,
                column: self.headers[self.time_index].clone(),
                value: raw_time.to_string(),
            })?;

            if record.len() > self.headers.len() {
                debug!(
                    "Row {} has {} cells, header has {}; extra cells ignored",
                    self.rows_read,
                    record.len(),
                    self.headers.len()
                );
            }
            let mut cells: Vec<String> = record
                .iter()
                .take(self.headers.len())
                .map(str::to_string)
                .collect();
            cells.resize(self.headers.len(), String::new());

            timestamps.push(ts);
            rows.push(cells);
        }

        if rows.is_empty() {
            return Ok(None);
        }

        let batch = RecordBatch {
            index: self.next_index,
            headers: self.headers.clone(),
            time_index: self.time_index,
            timestamps,
            rows,
        };
        self.next_index += 1;
        Ok(Some(batch))
    }
}

impl<R: io::Read> Iterator for ChunkReader<R> {
    type Item = Result<RecordBatch, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_batch() {
            Ok(batch) => batch.map(Ok),
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Repeated header names get a `.N` suffix, first occurrence unchanged: `A,A` → `A,A.1`.
fn dedupe_headers(headers: Vec<String>) -> Vec<String> {
    let mut taken: HashSet<String> = headers.iter().cloned().collect();
    let mut first_seen: HashSet<String> = HashSet::with_capacity(headers.len());
    let mut suffixes: HashMap<String, usize> = HashMap::new();

    headers
        .into_iter()
        .map(|header| {
            if first_seen.insert(header.clone()) {
                return header;
            }
            let n = suffixes.entry(header.clone()).or_insert(0);
            loop {
                *n += 1;
                let candidate = format!("{header}.{n}");
                if taken.insert(candidate.clone()) {
                    debug!("Duplicate column '{}' renamed to '{}'", header, candidate);
                    return candidate;
                }
            }
        })
        .collect()
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse a time cell. Offset-less values are taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

use anyhow::{ensure, Result};
use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_URL: &str = "http://localhost:8086";
pub const DEFAULT_MEASUREMENT: &str = "electrical_data";
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;
pub const DEFAULT_CSV_PATH: &str = "public/data_logger.csv";
pub const DEFAULT_TIME_COLUMN: &str = "Time";
pub const DEFAULT_LOG_FILE: &str = "influxdb_import.log";

/// Everything a single import run needs. Built once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
    pub measurement: String,
    pub chunk_size: usize,
    pub csv_path: PathBuf,
    pub time_column: String,
    pub log_file: PathBuf,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            token: String::new(),
            org: String::new(),
            bucket: String::new(),
            measurement: DEFAULT_MEASUREMENT.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            csv_path: PathBuf::from(DEFAULT_CSV_PATH),
            time_column: DEFAULT_TIME_COLUMN.to_string(),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
        }
    }
}

impl ImportConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.chunk_size > 0,
            "Chunk size must be greater than 0, got: {}",
            self.chunk_size
        );
        ensure!(!self.url.is_empty(), "InfluxDB URL cannot be empty");
        ensure!(!self.measurement.is_empty(), "Measurement name cannot be empty");
        ensure!(!self.time_column.is_empty(), "Time column name cannot be empty");
        ensure!(
            !self.csv_path.as_os_str().is_empty(),
            "CSV path cannot be empty"
        );
        Ok(())
    }
}

/// CSV Importer for InfluxDB - streams a sensor log into a bucket in fixed-size chunks
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// InfluxDB URL
    #[arg(short, long, env = "IMPORT_URL", default_value = DEFAULT_URL)]
    pub url: String,

    /// InfluxDB access token
    #[arg(long, env = "IMPORT_TOKEN", default_value = "", hide_env_values = true)]
    pub token: String,

    /// InfluxDB organization name
    #[arg(short, long, env = "IMPORT_ORG", default_value = "")]
    pub org: String,

    /// Destination bucket
    #[arg(short, long, env = "IMPORT_BUCKET", default_value = "")]
    pub bucket: String,

    /// Measurement name for the data
    #[arg(short, long, env = "IMPORT_MEASUREMENT", default_value = DEFAULT_MEASUREMENT)]
    pub measurement: String,

    /// Number of rows per chunk
    #[arg(short, long, env = "IMPORT_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Path to the CSV file
    #[arg(short = 'f', long, env = "IMPORT_CSV_PATH", default_value = DEFAULT_CSV_PATH)]
    pub csv_path: PathBuf,

    /// Name of the time column in the CSV header
    #[arg(short, long, env = "IMPORT_TIME_COLUMN", default_value = DEFAULT_TIME_COLUMN)]
    pub time_column: String,

    /// Path to log file (empty to disable file logging)
    #[arg(long, env = "IMPORT_LOG_FILE", default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,
}

impl From<Cli> for ImportConfig {
    fn from(cli: Cli) -> Self {
        Self {
            url: cli.url,
            token: cli.token,
            org: cli.org,
            bucket: cli.bucket,
            measurement: cli.measurement,
            chunk_size: cli.chunk_size,
            csv_path: cli.csv_path,
            time_column: cli.time_column,
            log_file: cli.log_file,
        }
    }
}

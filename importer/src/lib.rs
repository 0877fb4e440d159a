pub mod config;
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod reader;
pub mod writer;

pub use config::ImportConfig;
pub use pipeline::{import_file, run_import, BatchOutcome, RunSummary};
pub use writer::{BatchWriter, InfluxWriter};

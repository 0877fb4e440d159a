use anyhow::Result;
use clap::Parser;
use log::error;

use sensor_importer::config::Cli;
use sensor_importer::logging::setup_logging;
use sensor_importer::{import_file, ImportConfig, InfluxWriter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = ImportConfig::from(Cli::parse());

    setup_logging(&config.log_file)?;
    config.validate()?;

    let writer = InfluxWriter::connect(&config);
    if let Err(e) = import_file(&config, writer).await {
        error!("Import aborted: {:#}", e);
        return Err(e);
    }

    Ok(())
}

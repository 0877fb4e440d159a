use anyhow::{Context, Result};
use log::{Log, Metadata, Record};
use pretty_env_logger::env_logger::{self, fmt::Formatter, Target};
use std::io::{self, Write};
use std::path::Path;

const FILE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// Install the run logger: stdout always, plus the log file unless `log_file` is empty.
pub fn setup_logging(log_file: &Path) -> Result<()> {
    let mut sinks = vec![console_logger()];
    if !log_file.as_os_str().is_empty() {
        sinks.push(file_logger(log_file)?);
    }

    log::set_boxed_logger(Box::new(Fanout { sinks }))?;
    log::set_max_level(log::LevelFilter::Info);
    Ok(())
}

pub fn console_logger() -> env_logger::Logger {
    pretty_env_logger::formatted_builder()
        .parse_filters("info")
        .target(Target::Stdout)
        .build()
}

/// Append-mode file sink, one `<timestamp> <message>` line per record.
pub fn file_logger(path: &Path) -> Result<env_logger::Logger> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    Ok(env_logger::Builder::new()
        .parse_filters("info")
        .format(file_line)
        .target(Target::Pipe(Box::new(file)))
        .build())
}

fn file_line(buf: &mut Formatter, record: &Record) -> io::Result<()> {
    writeln!(
        buf,
        "{} {}",
        chrono::Local::now().format(FILE_TIMESTAMP_FORMAT),
        record.args()
    )
}

// Every record goes to every sink
struct Fanout {
    sinks: Vec<env_logger::Logger>,
}

impl Log for Fanout {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.sinks.iter().any(|sink| sink.enabled(metadata))
    }

    fn log(&self, record: &Record) {
        for sink in &self.sinks {
            sink.log(record);
        }
    }

    fn flush(&self) {
        for sink in &self.sinks {
            sink.flush();
        }
    }
}

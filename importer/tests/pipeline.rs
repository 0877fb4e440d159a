use async_trait::async_trait;
use sensor_importer::normalize::{BatchError, NormalizedBatch};
use sensor_importer::reader::ChunkReader;
use sensor_importer::{import_file, run_import, BatchWriter, ImportConfig};
use std::collections::HashSet;
use std::io::Write;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Recorded {
    /// (batch index, rows, columns) per attempted write
    writes: Vec<(usize, usize, Vec<String>)>,
    closes: usize,
}

#[derive(Clone, Default)]
struct RecordingWriter {
    state: Arc<Mutex<Recorded>>,
    fail_on: HashSet<usize>,
}

impl RecordingWriter {
    fn failing_on(indices: &[usize]) -> Self {
        Self {
            fail_on: indices.iter().copied().collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl BatchWriter for RecordingWriter {
    async fn write(&mut self, batch: &NormalizedBatch) -> Result<(), BatchError> {
        self.state
            .lock()
            .unwrap()
            .writes
            .push((batch.index, batch.len(), batch.columns.clone()));
        if self.fail_on.contains(&batch.index) {
            return Err(BatchError::Write("write rejected".into()));
        }
        Ok(())
    }

    async fn close(self) -> anyhow::Result<()> {
        self.state.lock().unwrap().closes += 1;
        Ok(())
    }
}

fn sensor_csv(rows: usize) -> String {
    let mut data = String::from("Time,V (RMS),I (A)\n");
    for i in 0..rows {
        data.push_str(&format!(
            "2024-03-01 10:{:02}:{:02},{}.5,{}\n",
            i / 60,
            i % 60,
            220 + i,
            i
        ));
    }
    data
}

#[tokio::test]
async fn test_twenty_five_rows_three_chunks() {
    let data = sensor_csv(25);
    let reader = ChunkReader::from_reader(data.as_bytes(), 10, "Time").unwrap();
    let writer = RecordingWriter::default();
    let state = Arc::clone(&writer.state);

    let summary = run_import(reader, writer).await.unwrap();

    assert_eq!(summary.batches(), 3);
    assert_eq!(summary.written(), 3);
    assert_eq!(summary.rows_written(), 25);
    let lines: Vec<String> = summary.outcomes.iter().map(ToString::to_string).collect();
    assert_eq!(
        lines,
        vec![
            "Chunk 1 written to InfluxDB with 10 records.",
            "Chunk 2 written to InfluxDB with 10 records.",
            "Chunk 3 written to InfluxDB with 5 records.",
        ]
    );

    let state = state.lock().unwrap();
    let sizes: Vec<(usize, usize)> = state.writes.iter().map(|(i, n, _)| (*i, *n)).collect();
    assert_eq!(sizes, vec![(0, 10), (1, 10), (2, 5)]);
    assert_eq!(state.writes[0].2, vec!["V_RMS_", "I_A_"]);
    assert_eq!(state.closes, 1);
}

#[tokio::test]
async fn test_write_failure_does_not_stop_run() {
    let data = sensor_csv(25);
    let reader = ChunkReader::from_reader(data.as_bytes(), 10, "Time").unwrap();
    let writer = RecordingWriter::failing_on(&[1]);
    let state = Arc::clone(&writer.state);

    let summary = run_import(reader, writer).await.unwrap();

    assert_eq!(summary.written(), 2);
    assert_eq!(summary.failed(), 1);
    assert_eq!(
        summary.outcomes[1].to_string(),
        "Error writing chunk 2: write rejected"
    );
    assert!(summary.outcomes[2].is_success());

    let state = state.lock().unwrap();
    assert_eq!(state.writes.len(), 3);
    assert_eq!(state.closes, 1);
}

#[tokio::test]
async fn test_bad_time_value_is_fatal() {
    let mut data = sensor_csv(12);
    data.push_str("garbage,1.0,2\n");
    data.push_str(&sensor_csv(12).lines().skip(1).collect::<Vec<_>>().join("\n"));

    let reader = ChunkReader::from_reader(data.as_bytes(), 10, "Time").unwrap();
    let writer = RecordingWriter::default();
    let state = Arc::clone(&writer.state);

    let err = run_import(reader, writer).await.unwrap_err();
    assert!(format!("{err:#}").contains("garbage"));

    let state = state.lock().unwrap();
    // only the first chunk made it; the broken one and everything after never reach the writer
    let indices: Vec<usize> = state.writes.iter().map(|(i, _, _)| *i).collect();
    assert_eq!(indices, vec![0]);
    assert_eq!(state.closes, 0);
}

#[tokio::test]
async fn test_label_collision_fails_each_chunk() {
    let data = "Time,V (RMS),V-(RMS)\n\
                2024-03-01 10:00:00,1,2\n\
                2024-03-01 10:00:01,1,2\n\
                2024-03-01 10:00:02,1,2\n";
    let reader = ChunkReader::from_reader(data.as_bytes(), 2, "Time").unwrap();
    let writer = RecordingWriter::default();
    let state = Arc::clone(&writer.state);

    let summary = run_import(reader, writer).await.unwrap();

    assert_eq!(summary.batches(), 2);
    assert_eq!(summary.failed(), 2);
    assert!(summary.outcomes[0]
        .to_string()
        .starts_with("Error writing chunk 1: columns 'V (RMS)' and 'V-(RMS)'"));

    let state = state.lock().unwrap();
    assert!(state.writes.is_empty());
    assert_eq!(state.closes, 1);
}

#[tokio::test]
async fn test_repeated_headers_are_written_as_separate_fields() {
    let data = "Time,A,A\n2024-03-01 10:00:00,1,2\n";
    let reader = ChunkReader::from_reader(data.as_bytes(), 10, "Time").unwrap();
    let writer = RecordingWriter::default();
    let state = Arc::clone(&writer.state);

    let summary = run_import(reader, writer).await.unwrap();

    assert_eq!(summary.written(), 1);
    assert_eq!(state.lock().unwrap().writes[0].2, vec!["A", "A_1"]);
}

#[tokio::test]
async fn test_import_file_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(sensor_csv(7).as_bytes()).unwrap();
    file.flush().unwrap();

    let config = ImportConfig {
        csv_path: file.path().to_path_buf(),
        chunk_size: 3,
        ..ImportConfig::default()
    };
    let writer = RecordingWriter::default();
    let state = Arc::clone(&writer.state);

    let summary = import_file(&config, writer).await.unwrap();

    assert_eq!(summary.batches(), 3);
    assert_eq!(summary.rows_written(), 7);
    assert_eq!(state.lock().unwrap().closes, 1);
}

#[tokio::test]
async fn test_missing_input_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = ImportConfig {
        csv_path: dir.path().join("missing.csv"),
        ..ImportConfig::default()
    };
    let writer = RecordingWriter::default();
    let state = Arc::clone(&writer.state);

    assert!(import_file(&config, writer).await.is_err());
    assert_eq!(state.lock().unwrap().closes, 0);
}

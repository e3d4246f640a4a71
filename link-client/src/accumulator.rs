//! Result accumulator: durable per-cycle rows and the final correlation pass.
//!
//! The ResultFile is single-writer (the orchestrator's sequential loop) and
//! every append is flushed and synced before it returns. Each clock file is
//! written by exactly one worker task.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use link_core::codec::{self, CodecError, ResultLayout};
use link_core::{correlate, ClockIndex, CorrelatedTable, Directory};
use link_types::{ClockSample, CycleRecord, RunId, SerialNumber};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Errors from the accumulator.
#[derive(Debug, Error)]
pub enum AccumulatorError {
    /// A file could not be created.
    #[error("failed to create {path}: {source}")]
    Create {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A file could not be opened or read.
    #[error("failed to open {path}: {source}")]
    Open {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A row could not be written durably.
    #[error("failed to write {path}: {source}")]
    Write {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Records must arrive as 1, 2, 3, … with no gaps.
    #[error("cycle {found} appended out of order (expected {expected})")]
    OutOfOrder {
        /// Next index the file accepts.
        expected: u32,
        /// Index that was offered.
        found: u32,
    },

    /// The file content is not in the expected format.
    #[error("malformed {path}: {source}")]
    Codec {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: CodecError,
    },
}

async fn write_durable(file: &mut File, path: &Path, line: &str) -> Result<(), AccumulatorError> {
    let write_err = |source| AccumulatorError::Write {
        path: path.to_path_buf(),
        source,
    };
    file.write_all(line.as_bytes()).await.map_err(write_err)?;
    file.flush().await.map_err(write_err)?;
    file.sync_data().await.map_err(write_err)
}

/// Append-only writer for one run's ResultFile.
#[derive(Debug)]
pub struct ResultWriter {
    path: PathBuf,
    file: File,
    layout: ResultLayout,
    directory: Arc<Directory>,
    last_index: u32,
}

impl ResultWriter {
    /// Create the file and write its header.
    pub async fn create(
        path: impl Into<PathBuf>,
        layout: ResultLayout,
        directory: Arc<Directory>,
    ) -> Result<Self, AccumulatorError> {
        let path = path.into();
        let mut file = File::create(&path)
            .await
            .map_err(|source| AccumulatorError::Create {
                path: path.clone(),
                source,
            })?;
        write_durable(&mut file, &path, &layout.header_line()).await?;
        tracing::info!("results file {}", path.display());

        Ok(Self {
            path,
            file,
            layout,
            directory,
            last_index: 0,
        })
    }

    /// File path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Column layout.
    pub fn layout(&self) -> ResultLayout {
        self.layout
    }

    /// Rows written so far.
    pub fn rows_written(&self) -> u32 {
        self.last_index
    }

    /// Append one record; returns once the row is on disk.
    pub async fn append(&mut self, record: &CycleRecord) -> Result<(), AccumulatorError> {
        let expected = self.last_index + 1;
        if record.cycle_index != expected {
            return Err(AccumulatorError::OutOfOrder {
                expected,
                found: record.cycle_index,
            });
        }

        let line = self.layout.encode(record, &self.directory);
        write_durable(&mut self.file, &self.path, &line).await?;
        self.last_index = expected;
        Ok(())
    }
}

/// Per-device clock files for one run.
#[derive(Debug, Clone)]
pub struct ClockLog {
    dir: PathBuf,
    run_id: RunId,
}

impl ClockLog {
    /// Clock files for `run_id` under `dir`.
    pub fn new(dir: impl Into<PathBuf>, run_id: RunId) -> Self {
        Self {
            dir: dir.into(),
            run_id,
        }
    }

    /// Path of `serial`'s clock file.
    pub fn path(&self, serial: SerialNumber) -> PathBuf {
        self.dir.join(codec::clock_file_name(serial, &self.run_id))
    }

    /// File name a module should log to.
    pub fn file_name(&self, serial: SerialNumber) -> String {
        codec::clock_file_name(serial, &self.run_id)
    }

    /// Create `serial`'s file with just the header.
    pub async fn create(&self, serial: SerialNumber) -> Result<(), AccumulatorError> {
        let path = self.path(serial);
        let mut file = File::create(&path)
            .await
            .map_err(|source| AccumulatorError::Create {
                path: path.clone(),
                source,
            })?;
        write_durable(&mut file, &path, &codec::clock_header_line()).await
    }

    /// Append one sample to its device's file.
    pub async fn append(&self, sample: &ClockSample) -> Result<(), AccumulatorError> {
        let path = self.path(sample.serial_number);
        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .map_err(|source| AccumulatorError::Open {
                path: path.clone(),
                source,
            })?;
        write_durable(&mut file, &path, &codec::encode_clock(sample)).await
    }

    /// Every readable sample in `serial`'s file. Malformed rows are skipped.
    pub async fn read(&self, serial: SerialNumber) -> Result<Vec<ClockSample>, AccumulatorError> {
        let path = self.path(serial);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| AccumulatorError::Open {
                path: path.clone(),
                source,
            })?;

        let (rows, truncated) = codec::split_rows(&text);
        if truncated {
            tracing::warn!("{}: ignoring unterminated last row", path.display());
        }

        let mut samples = Vec::new();
        for row in rows {
            if row.starts_with(codec::INDEX_COLUMN) {
                continue;
            }
            match codec::decode_clock(serial, row) {
                Ok(sample) => samples.push(sample),
                Err(e) => tracing::warn!("{}: skipping row {:?}: {}", path.display(), row, e),
            }
        }
        Ok(samples)
    }
}

/// Read a ResultFile back: layout plus every complete, well-formed row.
pub async fn read_results(path: &Path) -> Result<(ResultLayout, Vec<CycleRecord>), AccumulatorError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| AccumulatorError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    let (rows, truncated) = codec::split_rows(&text);
    if truncated {
        tracing::warn!("{}: ignoring unterminated last row", path.display());
    }

    let mut rows = rows.into_iter();
    let header = rows.next().unwrap_or_default();
    let layout = ResultLayout::from_header(header).map_err(|source| AccumulatorError::Codec {
        path: path.to_path_buf(),
        source,
    })?;

    let mut records = Vec::new();
    for row in rows {
        match layout.decode(row) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!("{}: skipping row {:?}: {}", path.display(), row, e),
        }
    }
    Ok((layout, records))
}

/// Output of the correlation pass.
#[derive(Debug)]
pub struct Finalized {
    /// Where the correlated table was written.
    pub path: PathBuf,
    /// The table itself.
    pub table: CorrelatedTable,
}

/// Build and write the correlated table for a finished run.
///
/// Only an unreadable ResultFile (or an unwritable output) is fatal. Clock
/// files are optional per device: when `clocks` is `None` or a device's file
/// is missing, its counter cells stay blank.
pub async fn finalize(
    directory: &Directory,
    result_path: &Path,
    clocks: Option<&ClockLog>,
) -> Result<Finalized, AccumulatorError> {
    let (layout, records) = read_results(result_path).await?;

    let mut index = ClockIndex::new();
    if let Some(log) = clocks {
        for serial in directory.serials() {
            match log.read(serial).await {
                Ok(samples) => index.extend(samples),
                Err(e) => tracing::warn!("{}: no clock data: {}", serial, e),
            }
        }
    }

    let table = correlate(directory, layout, &records, &index);

    let file_name = result_path
        .file_name()
        .map(|n| codec::total_file_name(&n.to_string_lossy()))
        .unwrap_or_else(|| codec::total_file_name("results.csv"));
    let path = result_path.with_file_name(file_name);

    let mut text = String::new();
    for header in table.header_rows() {
        text.push_str(&codec::encode_fields(&header));
    }
    for row in &table.rows {
        text.push_str(&codec::encode_fields(&table.row_fields(row)));
    }

    let mut file = File::create(&path)
        .await
        .map_err(|source| AccumulatorError::Create {
            path: path.clone(),
            source,
        })?;
    write_durable(&mut file, &path, &text).await?;
    tracing::info!(
        "correlated table {} ({} cycles, {} devices)",
        path.display(),
        table.rows.len(),
        table.serials.len()
    );

    Ok(Finalized { path, table })
}

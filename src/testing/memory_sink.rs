//! A frame sink that records what it was given

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::errors::{RecorderError, Result};
use crate::sink::{FrameSink, SinkBackend, SinkStats};
use crate::types::{CaptureFormat, Frame};

/// What a memory sink saw for one path
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SinkRecord {
    pub format: Option<CaptureFormat>,
    /// Frame sequence numbers in write order
    pub sequences: Vec<u64>,
    pub finalized: bool,
}

/// Sink backend that keeps per-path write logs in memory.
///
/// Each opened path also gets a small text file with one sequence number
/// per line, so tests can reopen what was persisted.
#[derive(Debug, Clone, Default)]
pub struct MemorySinkBackend {
    records: Arc<Mutex<HashMap<PathBuf, SinkRecord>>>,
    fail_open: Option<String>,
    fail_after: Option<u64>,
}

impl MemorySinkBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every open with an encode error
    pub fn failing_open(mut self, message: impl Into<String>) -> Self {
        self.fail_open = Some(message.into());
        self
    }

    /// Fail the write following `frames` successful writes, as if the disk filled
    pub fn failing_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    pub fn record(&self, path: &Path) -> Option<SinkRecord> {
        lock(&self.records).get(path).cloned()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        lock(&self.records).keys().cloned().collect()
    }

    /// Parse the file a memory sink wrote back into sequence numbers
    pub fn read_back(path: &Path) -> Result<Vec<u64>> {
        let reader = BufReader::new(File::open(path)?);
        let mut sequences = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let sequence = line
                .trim()
                .parse::<u64>()
                .map_err(|e| RecorderError::Encode(format!("corrupt line {:?}: {}", line, e)))?;
            sequences.push(sequence);
        }
        Ok(sequences)
    }
}

impl SinkBackend for MemorySinkBackend {
    fn open(&self, path: &Path, format: CaptureFormat) -> Result<Box<dyn FrameSink>> {
        if let Some(ref message) = self.fail_open {
            return Err(RecorderError::Encode(format!(
                "cannot open {}: {}",
                path.display(),
                message
            )));
        }

        let file = File::create(path)
            .map_err(|e| RecorderError::Encode(format!("Failed to create output file: {}", e)))?;

        lock(&self.records).insert(
            path.to_path_buf(),
            SinkRecord {
                format: Some(format),
                ..SinkRecord::default()
            },
        );

        Ok(Box::new(MemorySink {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            format,
            written: 0,
            fail_after: self.fail_after,
            records: self.records.clone(),
        }))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

struct MemorySink {
    writer: BufWriter<File>,
    path: PathBuf,
    format: CaptureFormat,
    written: u64,
    fail_after: Option<u64>,
    records: Arc<Mutex<HashMap<PathBuf, SinkRecord>>>,
}

impl FrameSink for MemorySink {
    fn write(&mut self, frame: Frame) -> Result<()> {
        if self.fail_after == Some(self.written) {
            return Err(RecorderError::Encode("No space left on device".to_string()));
        }
        if frame.resolution() != self.format.resolution {
            return Err(RecorderError::Encode(format!(
                "Frame dimensions {} don't match sink {}",
                frame.resolution(),
                self.format.resolution
            )));
        }

        writeln!(self.writer, "{}", frame.sequence)
            .map_err(|e| RecorderError::Encode(format!("Failed to write frame: {}", e)))?;
        self.written += 1;

        if let Some(record) = lock(&self.records).get_mut(&self.path) {
            record.sequences.push(frame.sequence);
        }
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<SinkStats> {
        let mut this = *self;
        this.writer
            .flush()
            .map_err(|e| RecorderError::Encode(format!("Failed to flush: {}", e)))?;

        if let Some(record) = lock(&this.records).get_mut(&this.path) {
            record.finalized = true;
        }

        let bytes_written = std::fs::metadata(&this.path).map(|m| m.len()).unwrap_or(0);
        Ok(SinkStats {
            frames_written: this.written,
            bytes_written,
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

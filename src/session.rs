//! One recording, from start to a finalized file
//!
//! # Spell: CapturePersistPipeline
//! ^ Intent: move every captured frame, in order, into one finalized file
//!
//! @RecordingSession
//!   : (params, source backend, sink backend) -> RecordingSession
//!   ! opens_source_then_sink_before_any_task
//!   ! start_returns_without_waiting_for_frames
//!   ! exactly_one_end_marker
//!   ! drains_queue_before_finalize
//!   ! stop_joins_both_tasks
//!   ! failure_is_never_silent
//!   - frame_reordering
//!   - dropped_frames_on_stop
//!
//! The capture task checks its cancellation token only between reads. A
//! device that blocks inside `read` therefore delays `stop` until that read
//! returns or fails. A [`SessionMonitor`] keeps reporting `stopping` while
//! that happens.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::errors::{RecorderError, Result};
use crate::queue::{frame_queue, FrameConsumer, FrameProducer, QueueMode};
use crate::sink::{FrameSink, SinkBackend, SinkStats};
use crate::source::{FrameSource, SourceBackend};
use crate::types::{
    CaptureFormat, QueueItem, RecordingSummary, SessionState, SessionStatus, SourceRead,
};

/// Everything needed to start one session
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub filename: String,
    pub path: PathBuf,
    pub device_index: u32,
    pub requested: CaptureFormat,
    pub queue: QueueMode,
}

/// State shared by the control plane and both tasks
struct Shared {
    state: Mutex<SessionState>,
    failure: Mutex<Option<RecorderError>>,
    cancel: CancellationToken,
    frames_captured: AtomicU64,
    frames_written: AtomicU64,
    running_tasks: AtomicUsize,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Starting),
            failure: Mutex::new(None),
            cancel: CancellationToken::new(),
            frames_captured: AtomicU64::new(0),
            frames_written: AtomicU64::new(0),
            running_tasks: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    fn set_state(&self, next: SessionState) {
        *lock(&self.state) = next;
    }

    /// Recording -> Stopping; later states are left alone
    fn begin_stopping(&self) {
        let mut state = lock(&self.state);
        if matches!(*state, SessionState::Starting | SessionState::Recording) {
            *state = SessionState::Stopping;
        }
    }

    /// Record a task failure and wind the session down. The first failure wins.
    fn fail(&self, error: RecorderError) {
        {
            let mut failure = lock(&self.failure);
            if failure.is_none() {
                log::error!("Recording failed: {}", error);
                *failure = Some(error);
            } else {
                log::warn!("Additional recording failure: {}", error);
            }
        }
        self.cancel.cancel();
        self.begin_stopping();
    }

    fn failure(&self) -> Option<RecorderError> {
        lock(&self.failure).clone()
    }

    fn task_finished(&self) {
        if self.running_tasks.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.set_state(SessionState::Stopped);
        }
    }
}

/// Observes a session without owning it. Reading status never waits on
/// `stop`.
#[derive(Clone)]
pub struct SessionMonitor {
    filename: String,
    format: CaptureFormat,
    started_at: DateTime<Utc>,
    shared: Arc<Shared>,
}

impl SessionMonitor {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            filename: self.filename.clone(),
            state: self.shared.state(),
            format: self.format,
            frames_captured: self.shared.frames_captured.load(Ordering::SeqCst),
            frames_written: self.shared.frames_written.load(Ordering::SeqCst),
            started_at: self.started_at,
            failure: self.shared.failure().map(|e| e.to_string()),
        }
    }
}

/// A running or finished recording
pub struct RecordingSession {
    filename: String,
    path: PathBuf,
    format: CaptureFormat,
    started_at: DateTime<Utc>,
    shared: Arc<Shared>,
    capture: Option<JoinHandle<()>>,
    persist: Option<JoinHandle<Option<SinkStats>>>,
    summary: Option<RecordingSummary>,
}

impl RecordingSession {
    /// Open the device and the destination, then launch both tasks.
    ///
    /// Returns as soon as the tasks are running. If either open fails no
    /// task is launched and any opened device is released.
    pub fn start(
        params: SessionParams,
        sources: &dyn SourceBackend,
        sinks: &dyn SinkBackend,
    ) -> Result<Self> {
        let shared = Arc::new(Shared::new());
        let started_at = Utc::now();
        log::info!(
            "Starting recording {} on device {} ({} via {})",
            params.filename,
            params.device_index,
            params.requested,
            sources.name()
        );

        let mut source = sources.open(params.device_index, params.requested)?;
        let format = source.format();

        let sink = match sinks.open(&params.path, format) {
            Ok(sink) => sink,
            Err(e) => {
                if let Err(close_err) = source.close() {
                    log::warn!("Failed to release device after sink error: {}", close_err);
                }
                return Err(e);
            }
        };

        let (producer, consumer) = frame_queue(params.queue);

        shared.running_tasks.store(2, Ordering::SeqCst);
        let persist = spawn_task("crabrecord-persist", {
            let shared = shared.clone();
            move || persist_loop(sink, consumer, &shared)
        });
        let persist = match persist {
            Ok(handle) => handle,
            Err(e) => {
                // The sink went down with the unspawned closure
                if let Err(close_err) = source.close() {
                    log::warn!("Failed to release device: {}", close_err);
                }
                discard_output(&params.path);
                return Err(e);
            }
        };

        let capture = spawn_task("crabrecord-capture", {
            let shared = shared.clone();
            move || capture_loop(source, producer, &shared)
        });
        let capture = match capture {
            Ok(handle) => handle,
            Err(e) => {
                // Dropping the producer delivered the end marker; let persist finish
                match persist.join() {
                    Ok(Some(stats)) => log::debug!(
                        "Persist task finished {} frames before abort",
                        stats.frames_written
                    ),
                    Ok(None) => match shared.failure() {
                        Some(failure) => log::warn!("Persist task failed: {}", failure),
                        None => log::warn!("Persist task failed"),
                    },
                    Err(_) => log::warn!("Persist task panicked"),
                }
                discard_output(&params.path);
                return Err(e);
            }
        };

        {
            let mut state = lock(&shared.state);
            if *state == SessionState::Starting {
                *state = SessionState::Recording;
            }
        }
        log::info!("Recording {} started at {}", params.filename, format);

        Ok(Self {
            filename: params.filename,
            path: params.path,
            format,
            started_at,
            shared,
            capture: Some(capture),
            persist: Some(persist),
            summary: None,
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Negotiated capture format
    pub fn format(&self) -> CaptureFormat {
        self.format
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Failure recorded by either task, if any
    pub fn failure(&self) -> Option<RecorderError> {
        self.shared.failure()
    }

    pub fn status(&self) -> SessionStatus {
        self.monitor().status()
    }

    /// Read-only handle on this session's live status
    pub fn monitor(&self) -> SessionMonitor {
        SessionMonitor {
            filename: self.filename.clone(),
            format: self.format,
            started_at: self.started_at,
            shared: self.shared.clone(),
        }
    }

    /// Stop capturing, drain the queue, finalize the file, and join both tasks.
    ///
    /// The first call after a task failure returns that failure; every other
    /// call returns the summary of what was persisted.
    pub fn stop(&mut self) -> Result<RecordingSummary> {
        if let Some(ref summary) = self.summary {
            return Ok(summary.clone());
        }

        log::info!("Stopping recording {}", self.filename);
        self.shared.begin_stopping();
        self.shared.cancel.cancel();

        if let Some(capture) = self.capture.take() {
            if capture.join().is_err() {
                self.shared
                    .fail(RecorderError::Device("capture task panicked".to_string()));
            }
        }

        let stats = match self.persist.take() {
            Some(persist) => match persist.join() {
                Ok(stats) => stats,
                Err(_) => {
                    self.shared
                        .fail(RecorderError::Encode("persist task panicked".to_string()));
                    None
                }
            },
            None => None,
        };
        self.shared.set_state(SessionState::Stopped);

        let frames_written = self.shared.frames_written.load(Ordering::SeqCst);
        let summary = RecordingSummary {
            filename: self.filename.clone(),
            path: self.path.clone(),
            format: self.format,
            frames_captured: self.shared.frames_captured.load(Ordering::SeqCst),
            frames_written: stats.map(|s| s.frames_written).unwrap_or(frames_written),
            bytes_written: stats.map(|s| s.bytes_written).unwrap_or(0),
            started_at: self.started_at,
            finished_at: Utc::now(),
        };
        self.summary = Some(summary.clone());

        match self.shared.failure() {
            Some(error) => {
                log::warn!("Recording {} stopped with failure: {}", self.filename, error);
                Err(error)
            }
            None => {
                log::info!(
                    "Recording {} stopped: {} frames, {:.2}s, {} bytes",
                    summary.filename,
                    summary.frames_written,
                    summary.duration_secs(),
                    summary.bytes_written
                );
                Ok(summary)
            }
        }
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if self.capture.is_some() || self.persist.is_some() {
            if let Err(e) = self.stop() {
                log::warn!("Error stopping recording {} in drop: {}", self.filename, e);
            }
        }
    }
}

fn spawn_task<F, T>(name: &str, f: F) -> Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|e| RecorderError::Io(format!("spawn {} failed: {}", name, e)))
}

fn capture_loop(mut source: Box<dyn FrameSource>, mut producer: FrameProducer, shared: &Shared) {
    let mut sequence = 0u64;

    loop {
        if shared.cancel.is_cancelled() {
            break;
        }

        match source.read() {
            Ok(SourceRead::Frame(mut frame)) => {
                sequence += 1;
                frame.sequence = sequence;
                if let Err(e) = producer.push(frame) {
                    shared.fail(e);
                    break;
                }
                shared.frames_captured.fetch_add(1, Ordering::SeqCst);
                log::trace!("Captured frame {}", sequence);
            }
            Ok(SourceRead::EndOfStream) => {
                log::info!("Device ended the stream after {} frames", sequence);
                shared.begin_stopping();
                break;
            }
            Err(e) => {
                shared.fail(e);
                break;
            }
        }
    }

    if let Err(e) = source.close() {
        log::warn!("Failed to release device: {}", e);
    }
    let pushed = producer.finish();
    log::debug!("Capture task finished after {} frames", pushed);
    shared.task_finished();
}

fn persist_loop(
    mut sink: Box<dyn FrameSink>,
    mut consumer: FrameConsumer,
    shared: &Shared,
) -> Option<SinkStats> {
    let mut failed = false;
    let mut discarded = 0u64;

    loop {
        match consumer.pop() {
            QueueItem::Frame(frame) => {
                if failed {
                    discarded += 1;
                    continue;
                }
                match sink.write(frame) {
                    Ok(()) => {
                        shared.frames_written.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => {
                        shared.fail(e);
                        failed = true;
                    }
                }
            }
            QueueItem::End => break,
        }
    }

    if discarded > 0 {
        log::warn!("Discarded {} frames after a write failure", discarded);
    }

    let stats = match sink.finalize() {
        Ok(stats) => Some(stats),
        Err(e) => {
            shared.fail(e);
            None
        }
    };
    shared.task_finished();
    stats
}

/// Remove the file of a session that never started
fn discard_output(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => log::debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("Recovering poisoned session lock");
        poisoned.into_inner()
    })
}

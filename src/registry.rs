//! Control point for the single active recording
//!
//! The registry is an explicit object shared by reference; every start, stop,
//! and upload goes through one mutex so those calls are serialized. The
//! concurrency inside a running session is separate and never takes this lock.
//!
//! Status reads go through a second, short-lived lock over a [`SessionMonitor`]
//! snapshot, so they answer while a stop is still joining tasks. The control
//! lock is always taken before the view lock.

use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::ServiceConfig;
use crate::errors::{RecorderError, Result};
use crate::queue::QueueMode;
use crate::session::{RecordingSession, SessionMonitor, SessionParams};
use crate::sink::SinkBackend;
use crate::source::SourceBackend;
use crate::store::RecordingStore;
use crate::types::{CaptureFormat, RecordingSummary, SessionState, SessionStatus};

/// Per-session settings applied by the registry
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderSettings {
    pub device_index: u32,
    pub requested: CaptureFormat,
    pub queue: QueueMode,
}

impl From<&ServiceConfig> for RecorderSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            device_index: config.camera.device_index,
            requested: config.camera.requested_format(),
            queue: config.recording.queue,
        }
    }
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self::from(&ServiceConfig::default())
    }
}

/// What the registry reports to status queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryStatus {
    /// State of the active session, `idle` when there is none
    pub state: SessionState,
    pub active: Option<SessionStatus>,
    /// The most recently finished session
    pub last: Option<SessionStatus>,
}

#[derive(Default)]
struct RegistryInner {
    active: Option<RecordingSession>,
}

#[derive(Default)]
struct RegistryView {
    active: Option<SessionMonitor>,
    last: Option<SessionStatus>,
}

pub struct SessionRegistry {
    settings: RecorderSettings,
    store: RecordingStore,
    sources: Arc<dyn SourceBackend>,
    sinks: Arc<dyn SinkBackend>,
    inner: Mutex<RegistryInner>,
    view: Mutex<RegistryView>,
}

impl SessionRegistry {
    pub fn new(
        settings: RecorderSettings,
        store: RecordingStore,
        sources: Arc<dyn SourceBackend>,
        sinks: Arc<dyn SinkBackend>,
    ) -> Self {
        Self {
            settings,
            store,
            sources,
            sinks,
            inner: Mutex::new(RegistryInner::default()),
            view: Mutex::new(RegistryView::default()),
        }
    }

    pub fn store(&self) -> &RecordingStore {
        &self.store
    }

    pub fn settings(&self) -> &RecorderSettings {
        &self.settings
    }

    /// Start a new session and return its filename.
    ///
    /// Rejected with `AlreadyActive` while a session is starting, recording,
    /// or stopping; the running session is left untouched.
    pub fn start(&self) -> Result<String> {
        let mut inner = self.lock();

        if let Some(ref session) = inner.active {
            if !session.state().is_terminal() {
                return Err(RecorderError::AlreadyActive(session.filename().to_string()));
            }
        }
        self.reap(&mut inner);

        let (filename, path) = self.store.allocate_timestamped(Utc::now())?;
        let params = SessionParams {
            filename: filename.clone(),
            path,
            device_index: self.settings.device_index,
            requested: self.settings.requested,
            queue: self.settings.queue,
        };

        let session = RecordingSession::start(params, self.sources.as_ref(), self.sinks.as_ref())?;
        self.view().active = Some(session.monitor());
        inner.active = Some(session);
        Ok(filename)
    }

    /// Stop the active session and wait until its file is finalized.
    ///
    /// Returns `Ok(None)` when nothing was active. A failure recorded while
    /// the session ran on its own is returned here.
    pub fn stop(&self) -> Result<Option<RecordingSummary>> {
        let mut inner = self.lock();
        let Some(mut session) = inner.active.take() else {
            log::debug!("Stop requested with no active recording");
            return Ok(None);
        };

        let result = session.stop();
        self.retire(&session);
        result.map(Some)
    }

    /// Snapshot of the active and last sessions. Does not wait for a stop in
    /// progress.
    pub fn status(&self) -> RegistryStatus {
        let view = self.view();
        let active = view.active.as_ref().map(|m| m.status());
        RegistryStatus {
            state: active.as_ref().map(|s| s.state).unwrap_or(SessionState::Idle),
            active,
            last: view.last.clone(),
        }
    }

    /// Filename of the session currently holding its file open
    pub fn active_filename(&self) -> Option<String> {
        self.view()
            .active
            .as_ref()
            .filter(|m| !m.state().is_terminal())
            .map(|m| m.filename().to_string())
    }

    /// Store an uploaded recording under `name`, replacing any existing file.
    ///
    /// The file of a running session cannot be replaced.
    pub fn upload(&self, name: &str, data: &[u8]) -> Result<String> {
        let inner = self.lock();
        if let Some(ref session) = inner.active {
            if session.filename() == name && !session.state().is_terminal() {
                return Err(RecorderError::AlreadyActive(name.to_string()));
            }
        }
        self.store.save(name, data)?;
        Ok(name.to_string())
    }

    pub fn fetch(&self, name: &str) -> Result<Bytes> {
        self.store.read(name)
    }

    /// Finish a session that already stopped itself, keeping its outcome for status
    fn reap(&self, inner: &mut RegistryInner) {
        if let Some(mut finished) = inner.active.take() {
            if let Err(e) = finished.stop() {
                log::warn!(
                    "Previous recording {} had ended with a failure: {}",
                    finished.filename(),
                    e
                );
            }
            self.retire(&finished);
        }
    }

    /// Move a stopped session from `active` to `last` in the status view
    fn retire(&self, session: &RecordingSession) {
        let mut view = self.view();
        view.active = None;
        view.last = Some(session.status());
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            log::warn!("Recovering poisoned registry lock");
            poisoned.into_inner()
        })
    }

    fn view(&self) -> MutexGuard<'_, RegistryView> {
        self.view.lock().unwrap_or_else(|poisoned| {
            log::warn!("Recovering poisoned registry status lock");
            poisoned.into_inner()
        })
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        match self.stop() {
            Ok(Some(summary)) => log::info!("Stopped {} during shutdown", summary.filename),
            Ok(None) => {}
            Err(e) => log::warn!("Error stopping recording during shutdown: {}", e),
        }
    }
}

//! Property tests for the capture/persist pipeline
//!
//! Driven by the synthetic camera and the memory sink so they run without
//! hardware. Run with: cargo test --test session_pipeline

use std::path::Path;
use std::time::{Duration, Instant};

use crabrecord::testing::{MemorySinkBackend, SyntheticBackend};
use crabrecord::{
    CaptureFormat, QueueMode, RecorderError, RecordingSession, SessionParams, SessionState,
};
use proptest::prelude::*;
use tempfile::tempdir;

fn params(dir: &Path, name: &str, queue: QueueMode) -> SessionParams {
    SessionParams {
        filename: name.to_string(),
        path: dir.join(name),
        device_index: 0,
        requested: CaptureFormat::new(8, 8, 30.0),
        queue,
    }
}

fn wait_until_stopped(session: &RecordingSession) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while session.state() != SessionState::Stopped {
        assert!(Instant::now() < deadline, "session never reached Stopped");
        std::thread::sleep(Duration::from_millis(2));
    }
}

fn queue_mode() -> impl Strategy<Value = QueueMode> {
    prop_oneof![
        Just(QueueMode::Unbounded),
        (1usize..8).prop_map(|capacity| QueueMode::Bounded { capacity }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Every frame the device delivers reaches the file, once, in order
    #[test]
    fn frames_arrive_in_order_without_loss(frames in 0u64..60, queue in queue_mode()) {
        let dir = tempdir().unwrap();
        let sinks = MemorySinkBackend::new();
        let sources = SyntheticBackend::new().with_frame_limit(frames);

        let mut session = RecordingSession::start(params(dir.path(), "prop.mp4", queue), &sources, &sinks)
            .expect("session should start");
        wait_until_stopped(&session);
        let summary = session.stop().expect("clean end of stream");

        let expected: Vec<u64> = (1..=frames).collect();
        let persisted = MemorySinkBackend::read_back(&dir.path().join("prop.mp4")).unwrap();
        prop_assert_eq!(persisted, expected);
        prop_assert_eq!(summary.frames_captured, frames);
        prop_assert_eq!(summary.frames_written, frames);
        prop_assert_eq!(sources.counters().closed(), 1);
    }

    /// An external stop at any point still persists a gapless prefix
    #[test]
    fn stop_persists_everything_captured(run_ms in 0u64..25, queue in queue_mode()) {
        let dir = tempdir().unwrap();
        let sinks = MemorySinkBackend::new();
        let sources = SyntheticBackend::new().with_read_delay(Duration::from_millis(1));

        let mut session = RecordingSession::start(params(dir.path(), "stop.mp4", queue), &sources, &sinks)
            .expect("session should start");
        std::thread::sleep(Duration::from_millis(run_ms));
        let summary = session.stop().expect("stop should succeed");

        let record = sinks.record(&dir.path().join("stop.mp4")).unwrap();
        let expected: Vec<u64> = (1..=summary.frames_captured).collect();
        prop_assert_eq!(record.sequences, expected);
        prop_assert!(record.finalized);
        prop_assert_eq!(session.state(), SessionState::Stopped);
    }
}

#[test]
fn test_sink_receives_negotiated_format() {
    let dir = tempdir().unwrap();
    let sinks = MemorySinkBackend::new();
    let sources = SyntheticBackend::new().with_clamp(4, 4).with_frame_limit(2);

    let mut session = RecordingSession::start(
        params(dir.path(), "clamped.mp4", QueueMode::Unbounded),
        &sources,
        &sinks,
    )
    .unwrap();
    assert_eq!(session.format(), CaptureFormat::new(4, 4, 30.0));

    session.stop().unwrap();
    let record = sinks.record(&dir.path().join("clamped.mp4")).unwrap();
    assert_eq!(record.format, Some(CaptureFormat::new(4, 4, 30.0)));
    assert_eq!(record.sequences, vec![1, 2]);
}

#[test]
fn test_failure_is_visible_without_a_stop_caller() {
    let dir = tempdir().unwrap();
    let sinks = MemorySinkBackend::new();
    let sources = SyntheticBackend::new().failing_after(5);

    let mut session = RecordingSession::start(
        params(dir.path(), "unplugged.mp4", QueueMode::Unbounded),
        &sources,
        &sinks,
    )
    .unwrap();
    wait_until_stopped(&session);

    let status = session.status();
    assert_eq!(status.state, SessionState::Stopped);
    assert!(status.failure.is_some());
    assert_eq!(status.frames_written, 5);

    let err = session.stop().unwrap_err();
    assert!(matches!(err, RecorderError::Device(_)));
    assert!(err.is_fatal_to_session());
}

#[test]
fn test_stop_is_idempotent() {
    let dir = tempdir().unwrap();
    let sinks = MemorySinkBackend::new();
    let sources = SyntheticBackend::new().with_read_delay(Duration::from_millis(1));

    let mut session = RecordingSession::start(
        params(dir.path(), "twice.mp4", QueueMode::Bounded { capacity: 2 }),
        &sources,
        &sinks,
    )
    .unwrap();
    let first = session.stop().unwrap();
    let second = session.stop().unwrap();
    assert_eq!(first.frames_written, second.frames_written);
    assert_eq!(sources.counters().opened(), 1);
    assert_eq!(sources.counters().closed(), 1);
}

//! Testing utilities for CrabRecord
//!
//! Synthetic camera and in-memory sink backends for exercising sessions
//! without hardware.

pub mod memory_sink;
pub mod synthetic_data;

pub use memory_sink::{MemorySinkBackend, SinkRecord};
pub use synthetic_data::{synthetic_video_frame, SourceCounters, SyntheticBackend};

//! Single-producer, single-consumer frame hand-off between the capture and
//! persist tasks.
//!
//! The producer side owns the only way to emit the end marker: `finish`
//! consumes it, and dropping an unfinished producer emits the marker too.
//! A consumer therefore always observes exactly one `End`, after every frame.

use crate::errors::{RecorderError, Result};
use crate::types::{Frame, QueueItem};
use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

/// Hand-off discipline between capture and persist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum QueueMode {
    /// Push never blocks; memory grows if persisting falls behind
    Unbounded,
    /// Push blocks once `capacity` frames are waiting
    Bounded { capacity: usize },
}

impl Default for QueueMode {
    fn default() -> Self {
        QueueMode::Unbounded
    }
}

/// Create a connected producer/consumer pair
pub fn frame_queue(mode: QueueMode) -> (FrameProducer, FrameConsumer) {
    let (tx, rx) = match mode {
        QueueMode::Unbounded => crossbeam_channel::unbounded(),
        QueueMode::Bounded { capacity } => crossbeam_channel::bounded(capacity.max(1)),
    };
    (
        FrameProducer {
            tx: Some(tx),
            pushed: 0,
        },
        FrameConsumer {
            rx,
            finished: false,
        },
    )
}

pub struct FrameProducer {
    tx: Option<Sender<QueueItem>>,
    pushed: u64,
}

impl FrameProducer {
    /// Hand a frame to the consumer.
    ///
    /// Fails only when the consumer has gone away.
    pub fn push(&mut self, frame: Frame) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| RecorderError::Encode("frame queue already finished".to_string()))?;
        tx.send(QueueItem::Frame(frame))
            .map_err(|_| RecorderError::Encode("persist task is gone".to_string()))?;
        self.pushed += 1;
        Ok(())
    }

    /// Number of frames pushed so far
    pub fn pushed(&self) -> u64 {
        self.pushed
    }

    /// Push the end marker and close the producer side
    pub fn finish(mut self) -> u64 {
        self.send_end();
        self.pushed
    }

    fn send_end(&mut self) {
        if let Some(tx) = self.tx.take() {
            if tx.send(QueueItem::End).is_err() {
                log::debug!("frame queue consumer gone before end marker");
            }
        }
    }
}

impl Drop for FrameProducer {
    fn drop(&mut self) {
        self.send_end();
    }
}

pub struct FrameConsumer {
    rx: Receiver<QueueItem>,
    finished: bool,
}

impl FrameConsumer {
    /// Block until the next item is available.
    ///
    /// After the end marker has been returned once, every later call
    /// returns `End` again without blocking.
    pub fn pop(&mut self) -> QueueItem {
        if self.finished {
            return QueueItem::End;
        }
        match self.rx.recv() {
            Ok(QueueItem::End) | Err(_) => {
                self.finished = true;
                QueueItem::End
            }
            Ok(frame) => frame,
        }
    }

    /// Frames buffered and not yet popped
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

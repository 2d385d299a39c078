//! Replay of recorded message logs
//!
//! Logs carry no explicit cycle markers. Messages share a `frame` number
//! while they belong to one update cycle, so a change of frame closes the
//! previous cycle. A log without frame numbers replays as a single cycle.

use log::debug;

use crate::engine::BandEngine;
use crate::error::ComputeError;
use crate::routing::SampleMessage;
use crate::types::EngineSnapshot;

/// Groups messages into cycles by their `frame` field
pub struct FrameReplayer {
    engine: BandEngine,
    current_frame: Option<u64>,
    pending: usize,
    include_recent: bool,
}

impl FrameReplayer {
    pub fn new(engine: BandEngine, include_recent: bool) -> Self {
        Self {
            engine,
            current_frame: None,
            pending: 0,
            include_recent,
        }
    }

    /// Apply a message, returning a snapshot if it closed the previous frame.
    ///
    /// A message that fails validation is rejected before any frame is
    /// closed, leaving the replayer as it was.
    pub fn push(&mut self, message: &SampleMessage) -> Result<Option<EngineSnapshot>, ComputeError> {
        message.validate()?;

        let mut closed = None;
        if let (Some(frame), Some(current)) = (message.frame, self.current_frame) {
            if frame != current && self.pending > 0 {
                closed = Some(self.close_frame());
            }
        }
        if message.frame.is_some() {
            self.current_frame = message.frame;
        }

        self.engine.handle_message(message)?;
        self.pending += 1;

        Ok(closed)
    }

    fn close_frame(&mut self) -> EngineSnapshot {
        let ran = self.engine.advance_cycle();
        debug!(
            "closed cycle {} after {} messages (relative powers {})",
            self.engine.cycle(),
            self.pending,
            if ran { "updated" } else { "held" }
        );
        self.pending = 0;
        self.engine.snapshot(self.include_recent)
    }

    /// Close the trailing frame, if any messages are pending
    pub fn finish(&mut self) -> Option<EngineSnapshot> {
        (self.pending > 0).then(|| self.close_frame())
    }

    /// Messages applied since the last closed frame
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn engine(&self) -> &BandEngine {
        &self.engine
    }

    pub fn into_engine(self) -> BandEngine {
        self.engine
    }
}

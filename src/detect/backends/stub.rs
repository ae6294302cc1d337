use anyhow::Result;
use std::collections::VecDeque;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Scripted backend for testing and dry runs.
///
/// Queued responses are returned one per call; once the queue is empty every
/// call returns the fallback list.
pub struct StubBackend {
    queued: VecDeque<Vec<Detection>>,
    fallback: Vec<Detection>,
    calls: usize,
}

impl StubBackend {
    /// Backend that never detects anything.
    pub fn new() -> Self {
        Self::always(Vec::new())
    }

    /// Backend that returns `detections` on every call.
    pub fn always(detections: Vec<Detection>) -> Self {
        Self {
            queued: VecDeque::new(),
            fallback: detections,
            calls: 0,
        }
    }

    /// Queue a response for the next unanswered call.
    pub fn queue(&mut self, detections: Vec<Detection>) {
        self.queued.push_back(detections);
    }

    /// Number of `detect` calls so far.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        self.calls += 1;
        Ok(self
            .queued
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}

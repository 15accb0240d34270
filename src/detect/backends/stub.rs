use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Stub backend for tests and demos. Replays scripted detection batches.
///
/// Batches queued with `push` are served first, in order; once the queue is empty
/// the `repeating` batch (empty by default) is returned for every frame. The script
/// handle can be cloned before the backend moves onto the worker thread.
#[derive(Default)]
pub struct ScriptedBackend {
    script: DetectionScript,
    latency: Option<Duration>,
    fail_next: usize,
}

/// Shared handle onto a `ScriptedBackend` queue.
#[derive(Clone, Default)]
pub struct DetectionScript {
    inner: Arc<Mutex<ScriptState>>,
}

#[derive(Default)]
struct ScriptState {
    queued: VecDeque<Vec<Detection>>,
    repeating: Vec<Detection>,
    served: u64,
}

impl DetectionScript {
    /// Queue one batch, served once.
    pub fn push(&self, batch: Vec<Detection>) -> Result<()> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| anyhow!("detection script lock poisoned"))?;
        state.queued.push_back(batch);
        Ok(())
    }

    /// Replace the batch served when the queue is empty.
    pub fn set_repeating(&self, batch: Vec<Detection>) -> Result<()> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| anyhow!("detection script lock poisoned"))?;
        state.repeating = batch;
        Ok(())
    }

    /// Number of batches handed out so far.
    pub fn served(&self) -> u64 {
        self.inner.lock().map(|s| s.served).unwrap_or(0)
    }

    fn next(&self) -> Result<Vec<Detection>> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| anyhow!("detection script lock poisoned"))?;
        state.served += 1;
        match state.queued.pop_front() {
            Some(batch) => Ok(batch),
            None => Ok(state.repeating.clone()),
        }
    }
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `batch` whenever the queue is empty.
    pub fn repeating(self, batch: Vec<Detection>) -> Self {
        if let Err(err) = self.script.set_repeating(batch) {
            log::warn!("scripted detector: {}", err);
        }
        self
    }

    /// Sleep this long per request to imitate a slow detector.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the next `count` requests with an error.
    pub fn failing(mut self, count: usize) -> Self {
        self.fail_next = count;
        self
    }

    pub fn script(&self) -> DetectionScript {
        self.script.clone()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(anyhow!("scripted detector failure"));
        }
        self.script.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;

    #[test]
    fn scripted_backend_serves_queue_then_repeats() {
        let cup = Detection::new("cup", 0.9, BoundingBox::new(0.4, 0.4, 0.1, 0.1));
        let mut backend = ScriptedBackend::new().repeating(vec![cup.clone()]);
        let script = backend.script();
        script.push(Vec::new()).unwrap();
        let frame = Frame::solid(2, 2, [0, 0, 0]).unwrap();

        assert!(backend.detect(&frame).unwrap().is_empty());
        assert_eq!(backend.detect(&frame).unwrap(), vec![cup.clone()]);
        assert_eq!(backend.detect(&frame).unwrap(), vec![cup]);
        assert_eq!(script.served(), 3);
    }

    #[test]
    fn repeating_batch_can_be_swapped_while_serving() {
        let cup = Detection::new("cup", 0.9, BoundingBox::new(0.4, 0.4, 0.1, 0.1));
        let book = Detection::new("book", 0.8, BoundingBox::new(0.1, 0.1, 0.3, 0.2));
        let mut backend = ScriptedBackend::new().repeating(vec![cup.clone()]);
        let script = backend.script();
        let frame = Frame::solid(2, 2, [0, 0, 0]).unwrap();

        assert_eq!(backend.detect(&frame).unwrap(), vec![cup]);
        script.set_repeating(vec![book.clone()]).unwrap();
        assert_eq!(backend.detect(&frame).unwrap(), vec![book.clone()]);
        assert_eq!(backend.detect(&frame).unwrap(), vec![book]);
    }

    #[test]
    fn scripted_backend_can_fail() {
        let mut backend = ScriptedBackend::new().failing(1);
        let frame = Frame::solid(2, 2, [0, 0, 0]).unwrap();
        assert!(backend.detect(&frame).is_err());
        assert!(backend.detect(&frame).unwrap().is_empty());
    }
}

use std::{
    mem,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::{controls::ControlId, fade::RampId};

/// Work that runs on the next animation frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTask {
    Rescan,
    Ramp(RampId),
    Position(ControlId),
}

/// Single-threaded animation frame queue.
///
/// Tasks requested while a frame is running land in the following frame, so
/// everything scheduled by frame N's work observes the results of frame N.
#[derive(Debug)]
pub struct FrameQueue<T> {
    next: Vec<T>,
    frame: u64,
}

impl<T> Default for FrameQueue<T> {
    fn default() -> Self {
        Self {
            next: Vec::new(),
            frame: 0,
        }
    }
}

impl<T> FrameQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, task: T) {
        self.next.push(task);
    }

    /// Takes the tasks due this frame and advances the frame counter.
    pub fn begin_frame(&mut self) -> Vec<T> {
        self.frame += 1;
        mem::take(&mut self.next)
    }

    pub fn retain(&mut self, keep: impl FnMut(&T) -> bool) {
        self.next.retain(keep);
    }

    pub fn pending(&self) -> usize {
        self.next.len()
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }
}

/// Monotonic millisecond clock, the moral equivalent of `performance.now()`.
pub trait Clock {
    fn now_ms(&self) -> f64;
}

#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by.as_secs_f64() * 1000.0;
    }

    pub fn set_ms(&self, now_ms: f64) {
        *self.now.lock() = now_ms;
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        *self.now.lock()
    }
}

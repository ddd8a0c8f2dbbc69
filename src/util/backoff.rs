//! Spin/yield backoff for main-thread wait loops.

use std::hint::spin_loop;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Exponential backoff: spins briefly, then yields, then sleeps in short slices.
#[derive(Debug)]
pub struct Backoff {
    step: AtomicUsize,
}

impl Backoff {
    const SPIN_LIMIT: usize = 6;
    const YIELD_LIMIT: usize = 10;

    pub fn new() -> Self {
        Self {
            step: AtomicUsize::new(0),
        }
    }

    /// One step of waiting for another thread to make progress.
    pub fn snooze(&self) {
        let step = self.step.fetch_add(1, Ordering::Relaxed);

        if step <= Self::SPIN_LIMIT {
            for _ in 0..(1 << step) {
                spin_loop();
            }
        } else if step <= Self::YIELD_LIMIT {
            thread::yield_now();
        } else {
            thread::sleep(Duration::from_micros(10));
        }
    }
}

//! Wall-clock and blocking-time measurement for streamed completions

use std::time::{Duration, Instant};

/// Tracks total wall time and the share spent waiting on an upstream stream
#[derive(Debug, Clone)]
pub struct Timer {
    started: Instant,
    blocking: Duration,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            blocking: Duration::ZERO,
        }
    }

    /// Seconds elapsed since the timer started
    pub fn wall_time(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Seconds spent inside measured waits
    pub fn blocking_time(&self) -> f64 {
        self.blocking.as_secs_f64()
    }

    /// Await `fut`, adding the time it took to the blocking total
    pub async fn measure<F: std::future::Future>(&mut self, fut: F) -> F::Output {
        let began = Instant::now();
        let output = fut.await;
        self.blocking += began.elapsed();
        output
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

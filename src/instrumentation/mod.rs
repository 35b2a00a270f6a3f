pub mod logger;

pub use logger::{RunLog, RunLogger, StageLog};

use std::time::{Duration, Instant};

/// Elapsed wall-clock time of a run, shown as `MM:SS`.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    start: Instant,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn display(&self) -> String {
        format_elapsed(self.elapsed())
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

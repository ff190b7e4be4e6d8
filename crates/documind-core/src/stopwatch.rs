//! Elapsed-time measurement for pipeline instrumentation.

use std::time::Instant;

/// Simple stopwatch. `elapsed_ms` measures start-to-now until `stop` is
/// called, start-to-stop afterwards.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stopwatch {
    start: Option<Instant>,
    end: Option<Instant>,
}

impl Stopwatch {
    pub fn start() -> Self {
        Stopwatch {
            start: Some(Instant::now()),
            end: None,
        }
    }

    pub fn stop(&mut self) {
        if self.end.is_none() {
            self.end = Some(Instant::now());
        }
    }

    /// Elapsed milliseconds; zero if never started.
    pub fn elapsed_ms(&self) -> u64 {
        let Some(start) = self.start else {
            return 0;
        };
        let end = self.end.unwrap_or_else(Instant::now);
        end.duration_since(start).as_millis() as u64
    }

    /// Human-readable elapsed time, e.g. `"1m 12.34s"`.
    pub fn formatted(&self) -> String {
        let elapsed = self.elapsed_ms() as f64 / 1000.0;
        let minutes = (elapsed / 60.0) as u64;
        let seconds = elapsed % 60.0;
        format!("{}m {:.2}s", minutes, seconds)
    }
}

use std::collections::VecDeque;

/// Measures main-loop ticks per second over a sliding window.
///
/// Call [`tick`](TickCounter::tick) once per loop iteration with the
/// runtime's millisecond clock, then [`tps`](TickCounter::tps) to read the
/// current rate. Timestamps outside the window are pruned as ticks arrive.
#[derive(Debug)]
pub struct TickCounter {
    timestamps: VecDeque<u64>,
    window_ms: u64,
}

impl Default for TickCounter {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl TickCounter {
    /// Create a counter with the given measurement window. Zero is raised
    /// to one millisecond.
    pub fn new(window_ms: u64) -> Self {
        Self {
            timestamps: VecDeque::new(),
            window_ms: window_ms.max(1),
        }
    }

    pub fn tick(&mut self, now: u64) {
        self.timestamps.push_back(now);
        self.prune(now);
    }

    /// Ticks per second based on timestamps in the window.
    ///
    /// Returns `0.0` if fewer than two ticks have been recorded.
    pub fn tps(&self) -> f64 {
        if self.timestamps.len() < 2 {
            return 0.0;
        }
        self.timestamps.len() as f64 * 1000.0 / self.window_ms as f64
    }

    /// Remove timestamps older than `now - window`.
    fn prune(&mut self, now: u64) {
        let cutoff = now.saturating_sub(self.window_ms);
        while let Some(&front) = self.timestamps.front() {
            if front < cutoff {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

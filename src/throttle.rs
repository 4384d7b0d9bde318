// throttle.rs - every-Nth log gate, one per call site and instance

/// Lets the first occurrence through, then every `every`-th one.
#[derive(Debug, Clone)]
pub struct LogThrottle {
    every: u32,
    count: u64,
}

impl LogThrottle {
    pub fn new(every: u32) -> Self {
        Self { every: every.max(1), count: 0 }
    }

    /// Records one occurrence; returns true when it should be logged.
    pub fn tick(&mut self) -> bool {
        let log_now = self.count % u64::from(self.every) == 0;
        self.count += 1;
        log_now
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

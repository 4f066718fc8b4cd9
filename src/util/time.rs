// Copyright 2016 PingCAP, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::{Duration, Instant};

pub fn duration_to_sec(d: Duration) -> f64 {
    d.as_secs() as f64 + f64::from(d.subsec_nanos()) / 1_000_000_000.0
}

/// Logs a warning if the guarded work took longer than `threshold` to finish.
///
/// Modeled on the `SlowTimer`/`slow_log!` pair used around the apply
/// runner's `handle_applies`.
pub struct SlowTimer {
    start: Instant,
    threshold: Duration,
}

impl SlowTimer {
    pub fn new() -> SlowTimer {
        SlowTimer::with_threshold(Duration::from_millis(1000))
    }

    pub fn with_threshold(threshold: Duration) -> SlowTimer {
        SlowTimer {
            start: Instant::now(),
            threshold,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn is_slow(&self) -> bool {
        self.elapsed() >= self.threshold
    }
}

impl Default for SlowTimer {
    fn default() -> SlowTimer {
        SlowTimer::new()
    }
}

#[macro_export]
macro_rules! slow_log {
    ($t:expr, $($arg:tt)*) => {
        if $t.is_slow() {
            log::warn!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_to_sec_converts() {
        assert!((duration_to_sec(Duration::from_millis(1500)) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn slow_timer_detects_threshold() {
        let t = SlowTimer::with_threshold(Duration::from_secs(3600));
        assert!(!t.is_slow());
    }
}

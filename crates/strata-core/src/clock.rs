// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Time sources for the per-tick budget.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A monotonic time source.
pub trait Clock {
    /// Time elapsed since an arbitrary, fixed epoch.
    fn now(&self) -> Duration;
}

/// Wall-clock time backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Creates a clock whose epoch is the moment of creation.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// A manually driven clock for deterministic hosts and tests.
///
/// Clones share the same time. An optional auto-step is added after every
/// read, which makes time pass as the scheduler polls it.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
    step_nanos: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock frozen at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock that advances by `step` after every read.
    pub fn with_auto_step(step: Duration) -> Self {
        let clock = Self::default();
        clock.set_auto_step(step);
        clock
    }

    /// Moves time forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        self.nanos.fetch_add(to_nanos(delta), Ordering::SeqCst);
    }

    /// Changes the amount added after every read.
    pub fn set_auto_step(&self, step: Duration) {
        self.step_nanos.store(to_nanos(step), Ordering::SeqCst);
    }

    /// Reads the current time without applying the auto-step.
    pub fn peek(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        let step = self.step_nanos.load(Ordering::SeqCst);
        Duration::from_nanos(self.nanos.fetch_add(step, Ordering::SeqCst))
    }
}

fn to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

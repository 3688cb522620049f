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

//! The time-slicing scheduler that owns and drives every loading thread.

use crossbeam_channel::Sender;
use strata_core::{
    Clock, MonotonicClock, SchedulerConfig, StageDef, StagePhase, StagePriority, ThreadId,
    ThreadOptions,
};

use crate::error::SchedulerError;
use crate::event::LoaderEvent;
use crate::thread::{LoadThread, ThreadHooks, ThreadStatus};

/// A read-only view of one stage, for inspection by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSnapshot {
    /// The stage's name.
    pub name: String,
    /// Scheduling class.
    pub priority: StagePriority,
    /// Current phase.
    pub phase: StagePhase,
    /// Whether the stage completed or was skipped.
    pub is_finished: bool,
    /// Whether the stage was skipped.
    pub skip: bool,
    /// Fraction of work done.
    pub load_rate: f32,
    /// The stage's weight.
    pub relative_size: f64,
    /// Whether the stage is a background stage.
    pub background_loading: bool,
}

/// Creates a scheduler with the default configuration and wall-clock time.
pub fn create_scheduler() -> Scheduler {
    Scheduler::new(SchedulerConfig::default())
}

/// Owns every loading thread and time-slices them once per host tick.
///
/// The primary thread (the first one created) runs alone until its finish
/// stage runs; after that every active thread is serviced round-robin, one
/// round per visit.
pub struct Scheduler<C: Clock = MonotonicClock> {
    config: SchedulerConfig,
    clock: C,
    threads: Vec<LoadThread>,
    current_index: usize,
    active_count: usize,
    secondary_threads_enabled: bool,
    skip_this_tick: bool,
    event_sender: Option<Sender<LoaderEvent>>,
}

impl Scheduler<MonotonicClock> {
    /// Creates a scheduler measuring its budget with wall-clock time.
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_clock(config, MonotonicClock::new())
    }
}

impl Default for Scheduler<MonotonicClock> {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl<C: Clock> Scheduler<C> {
    /// Creates a scheduler measuring its budget with `clock`.
    pub fn with_clock(config: SchedulerConfig, clock: C) -> Self {
        Self {
            config,
            clock,
            threads: Vec::new(),
            current_index: 0,
            active_count: 0,
            secondary_threads_enabled: false,
            skip_this_tick: false,
            event_sender: None,
        }
    }

    /// Attaches a channel receiving [`LoaderEvent`]s for every thread.
    pub fn with_event_sender(mut self, sender: Sender<LoaderEvent>) -> Self {
        for thread in &mut self.threads {
            thread.set_event_sender(Some(sender.clone()));
        }
        self.event_sender = Some(sender);
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Registers a new loading thread.
    ///
    /// The first thread is the primary one; `options.is_primary` on a later
    /// thread is ignored. On error nothing is registered.
    pub fn create_thread(
        &mut self,
        stages: impl IntoIterator<Item = StageDef>,
        options: ThreadOptions,
        hooks: ThreadHooks,
    ) -> Result<ThreadId, SchedulerError> {
        let id = ThreadId(self.threads.len());
        if options.is_primary && !id.is_primary() {
            log::warn!("{id}: only the first thread can be primary; treating it as secondary");
        }

        let mut thread = LoadThread::create(id, stages, options, hooks)?;
        thread.set_event_sender(self.event_sender.clone());
        self.threads.push(thread);
        self.active_count += 1;
        log::debug!("{id}: registered ({} active)", self.active_count);
        Ok(id)
    }

    /// Runs loading work for at most one tick budget.
    ///
    /// The budget is checked between rounds only; a slow callback can
    /// overrun it. The tick ends early when an async stage runs.
    pub fn update(&mut self) {
        if self.active_count == 0 {
            return;
        }
        if self.skip_this_tick {
            self.skip_this_tick = false;
            log::trace!("Idle tick after progress report");
            return;
        }

        let budget = self.config.tick_budget();
        let tick_start = self.clock.now();

        while self.clock.now().saturating_sub(tick_start) < budget {
            if self.active_count == 0 {
                break;
            }

            let index = self.current_index;
            let now = self.clock.now();
            let thread = &mut self.threads[index];

            if thread.is_done() {
                self.advance_cursor();
                continue;
            }
            if thread.status() == ThreadStatus::Idle {
                thread.start(now);
            }

            if !thread.advance_frontier() {
                let emitted = thread.finalize(now);
                self.retire(index, emitted);
                self.advance_cursor();
                continue;
            }

            let report = thread.run_one_round(now);
            let is_primary = thread.is_primary();
            if report.progress_emitted && self.config.throttle_after_progress {
                self.skip_this_tick = true;
            }
            if report.reached_finish && is_primary {
                self.enable_secondary_threads();
            }

            self.advance_cursor();
            if report.yield_now {
                break;
            }
        }
    }

    /// Aborts a thread immediately, reporting failure to its completion hook.
    ///
    /// Returns `false` for unknown ids and threads that already ended.
    pub fn abort_thread(&mut self, id: ThreadId) -> bool {
        let Some(thread) = self.threads.get_mut(id.0) else {
            log::warn!("abort requested for unknown {id}");
            return false;
        };
        if !thread.abort() {
            return false;
        }
        self.retire(id.0, false);
        true
    }

    /// Whether no thread is left to run.
    pub fn is_finished(&self) -> bool {
        self.active_count == 0
    }

    /// Whether the thread's finish stage ran.
    pub fn is_thread_loaded(&self, id: ThreadId) -> bool {
        self.threads
            .get(id.0)
            .map(LoadThread::is_loaded)
            .unwrap_or(false)
    }

    /// The thread's lifecycle state.
    pub fn thread_status(&self, id: ThreadId) -> Option<ThreadStatus> {
        self.threads.get(id.0).map(LoadThread::status)
    }

    /// The thread's load percentage.
    pub fn thread_percent(&self, id: ThreadId) -> Option<u8> {
        self.threads.get(id.0).map(LoadThread::percent)
    }

    /// The thread itself.
    pub fn thread(&self, id: ThreadId) -> Option<&LoadThread> {
        self.threads.get(id.0)
    }

    /// Number of threads that have neither finished nor been aborted.
    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// Whether threads other than the primary one receive time slices.
    pub fn secondary_threads_enabled(&self) -> bool {
        self.secondary_threads_enabled
    }

    /// Looks a stage up by name.
    pub fn stage_info(&self, id: ThreadId, name: &str) -> Option<StageSnapshot> {
        let thread = self.threads.get(id.0)?;
        let graph = thread.graph()?;
        let node = graph.node(graph.index_of(name)?);
        let runtime = node.runtime();
        Some(StageSnapshot {
            name: node.name().to_string(),
            priority: node.priority(),
            phase: runtime.phase,
            is_finished: runtime.is_finished,
            skip: runtime.skip,
            load_rate: runtime.load_rate,
            relative_size: node.relative_size(),
            background_loading: node.is_background(),
        })
    }

    /// Skips a stage that has not started; it is credited as fully loaded
    /// and its dependents become ready.
    pub fn skip_stage(&mut self, id: ThreadId, name: &str) -> Result<(), SchedulerError> {
        let now = self.clock.now();
        let thread = self
            .threads
            .get_mut(id.0)
            .ok_or(SchedulerError::UnknownThread(id))?;
        let emitted = thread.skip_stage(name, now)?;
        if emitted && self.config.throttle_after_progress {
            self.skip_this_tick = true;
        }
        Ok(())
    }

    fn retire(&mut self, index: usize, progress_emitted: bool) {
        self.active_count = self.active_count.saturating_sub(1);
        if progress_emitted && self.config.throttle_after_progress {
            self.skip_this_tick = true;
        }
        if self.threads[index].is_primary() {
            // Secondaries would never run otherwise.
            self.enable_secondary_threads();
        }
        log::debug!(
            "{}: retired ({} active)",
            self.threads[index].id(),
            self.active_count
        );
    }

    fn enable_secondary_threads(&mut self) {
        if !self.secondary_threads_enabled {
            self.secondary_threads_enabled = true;
            log::debug!("Secondary threads enabled");
        }
    }

    fn advance_cursor(&mut self) {
        self.current_index = if self.secondary_threads_enabled && !self.threads.is_empty() {
            (self.current_index + 1) % self.threads.len()
        } else {
            ThreadId::PRIMARY.0
        };
    }
}

impl<C: Clock> std::fmt::Debug for Scheduler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("threads", &self.threads)
            .field("current_index", &self.current_index)
            .field("active_count", &self.active_count)
            .field("secondary_threads_enabled", &self.secondary_threads_enabled)
            .field("skip_this_tick", &self.skip_this_tick)
            .finish()
    }
}

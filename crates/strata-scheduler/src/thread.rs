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

//! A loading thread: one independent job over its own stage graph.
//!
//! "Thread" here means a logical loading job, not an OS thread. The
//! scheduler owns every thread and drives it from a single call stack.

use std::cmp::Reverse;
use std::fmt;
use std::time::Duration;

use crossbeam_channel::Sender;
use strata_core::graph::GraphOptions;
use strata_core::{
    GraphError, Outcome, StageDef, StageGraph, StageIndex, StagePhase, StagePriority, ThreadId,
    ThreadInfo, ThreadOptions,
};

use crate::error::SchedulerError;
use crate::event::LoaderEvent;
use crate::progress::ProgressReporter;

/// Lifecycle of a loading thread.
///
/// `Idle → Loading → FinishedNoResources → Finished`, or
/// `Idle → Loading → Finished`, or any state `→ Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadStatus {
    /// Created, not yet started.
    #[default]
    Idle,
    /// Being ticked.
    Loading,
    /// Loaded; background stages are still running.
    FinishedNoResources,
    /// Every stage is done.
    Finished,
    /// Stopped by the host.
    Aborted,
}

impl ThreadStatus {
    /// Whether the thread will never run again.
    pub fn is_terminal(self) -> bool {
        matches!(self, ThreadStatus::Finished | ThreadStatus::Aborted)
    }
}

type ProgressHook = Box<dyn FnMut(u8, f64)>;
type CompleteHook = Box<dyn FnMut(ThreadId, bool)>;
type LoadedHook = Box<dyn FnMut(ThreadId)>;

/// Host callbacks attached to a thread.
#[derive(Default)]
pub struct ThreadHooks {
    on_progress: Option<ProgressHook>,
    on_complete: Option<CompleteHook>,
    on_loaded: Option<LoadedHook>,
}

impl ThreadHooks {
    /// Creates an empty set of hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with `(percent, elapsed_ms)` whenever progress is reported.
    pub fn on_progress(mut self, hook: impl FnMut(u8, f64) + 'static) -> Self {
        self.on_progress = Some(Box::new(hook));
        self
    }

    /// Called once with `(thread, success)`: `true` when the thread is
    /// loaded, `false` when it is aborted.
    pub fn on_complete(mut self, hook: impl FnMut(ThreadId, bool) + 'static) -> Self {
        self.on_complete = Some(Box::new(hook));
        self
    }

    /// Called once when the thread's finish stage runs.
    pub fn on_loaded(mut self, hook: impl FnMut(ThreadId) + 'static) -> Self {
        self.on_loaded = Some(Box::new(hook));
        self
    }
}

impl fmt::Debug for ThreadHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadHooks")
            .field("on_progress", &self.on_progress.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_loaded", &self.on_loaded.is_some())
            .finish()
    }
}

/// What happened during one call to [`LoadThread::run_one_round`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundReport {
    /// At least one callback was invoked.
    pub did_work: bool,
    /// An async stage ran; the scheduler must end the tick.
    pub yield_now: bool,
    /// Progress was reported to the host.
    pub progress_emitted: bool,
    /// The finish stage ran during this round.
    pub reached_finish: bool,
}

/// One loading job: a stage graph, its ready frontier and its bookkeeping.
pub struct LoadThread {
    id: ThreadId,
    options: ThreadOptions,
    status: ThreadStatus,
    graph: Option<StageGraph>,
    ready_queue: Vec<StageIndex>,
    retired: Vec<bool>,
    reporter: ProgressReporter,
    hooks: ThreadHooks,
    events: Option<Sender<LoaderEvent>>,
    started_at: Option<Duration>,
    loaded: bool,
    success_reported: bool,
    yield_now: bool,
}

impl LoadThread {
    /// Builds the thread's graph and seeds its frontier with the source stages.
    ///
    /// `id == ThreadId::PRIMARY` makes this the primary thread: its
    /// `primary_only` stages run and its finish stage unlocks the others.
    pub fn create(
        id: ThreadId,
        stages: impl IntoIterator<Item = StageDef>,
        options: ThreadOptions,
        hooks: ThreadHooks,
    ) -> Result<Self, GraphError> {
        let graph = StageGraph::build(
            stages,
            GraphOptions {
                is_primary: id.is_primary(),
                skip_resources: options.skip_resources,
                wait_for_background: options.wait_for_background,
            },
        )?;
        let ready_queue = graph.sources();
        let retired = vec![false; graph.len()];

        Ok(Self {
            id,
            options,
            status: ThreadStatus::Idle,
            graph: Some(graph),
            ready_queue,
            retired,
            reporter: ProgressReporter::new(),
            hooks,
            events: None,
            started_at: None,
            loaded: false,
            success_reported: false,
            yield_now: false,
        })
    }

    pub(crate) fn set_event_sender(&mut self, sender: Option<Sender<LoaderEvent>>) {
        self.events = sender;
    }

    /// The thread's id.
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// The thread's label, if one was given.
    pub fn label(&self) -> Option<&str> {
        self.options.label.as_deref()
    }

    /// Whether this is the primary thread.
    pub fn is_primary(&self) -> bool {
        self.id.is_primary()
    }

    /// The thread's options.
    pub fn options(&self) -> &ThreadOptions {
        &self.options
    }

    /// Current lifecycle state.
    pub fn status(&self) -> ThreadStatus {
        self.status
    }

    /// Current load percentage. Never decreases.
    pub fn percent(&self) -> u8 {
        self.reporter.percent()
    }

    /// Whether the finish stage ran.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Whether the thread is finished or aborted.
    pub fn is_done(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the last round ran an async stage.
    pub fn yield_now(&self) -> bool {
        self.yield_now
    }

    /// Stages ready to run, in execution order.
    pub fn ready_queue(&self) -> &[StageIndex] {
        &self.ready_queue
    }

    /// The stage graph; `None` once the thread is retired.
    pub fn graph(&self) -> Option<&StageGraph> {
        self.graph.as_ref()
    }

    /// Moves the thread from `Idle` to `Loading` and reports 0 %.
    pub fn start(&mut self, now: Duration) {
        if self.status != ThreadStatus::Idle {
            return;
        }
        self.status = ThreadStatus::Loading;
        self.started_at = Some(now);
        log::info!("{}: loading started", self.display_name());
        self.send(LoaderEvent::ThreadStarted { thread: self.id });

        let percent = self.reporter.announce();
        self.emit_progress(percent, now);
    }

    /// Retires finished stages from the frontier and admits every successor
    /// whose predecessors are all finished.
    ///
    /// Skipped successors are retired on the spot, so readiness propagates
    /// through chains of skipped stages. The frontier is then stably sorted
    /// by descending priority, foreground stages before background ones.
    /// Returns whether the thread still has work.
    pub fn advance_frontier(&mut self) -> bool {
        let Some(graph) = self.graph.as_ref() else {
            return false;
        };

        let mut frontier = Vec::with_capacity(self.ready_queue.len());
        let mut finished = Vec::new();
        for &index in &self.ready_queue {
            if graph.node(index).runtime().is_finished {
                finished.push(index);
            } else {
                frontier.push(index);
            }
        }

        while let Some(index) = finished.pop() {
            if self.retired[index] {
                continue;
            }
            self.retired[index] = true;

            for &successor in graph.outputs(index) {
                if self.retired[successor]
                    || frontier.contains(&successor)
                    || !graph.inputs_finished(successor)
                {
                    continue;
                }
                if graph.node(successor).runtime().is_finished {
                    finished.push(successor);
                } else {
                    log::trace!(
                        "{}: stage '{}' is ready",
                        self.id,
                        graph.node(successor).name()
                    );
                    frontier.push(successor);
                }
            }
        }

        frontier.sort_by_key(|&index| {
            let node = graph.node(index);
            (Reverse(node.priority()), node.is_background())
        });
        self.ready_queue = frontier;
        !self.ready_queue.is_empty()
    }

    /// Gives every stage of the current frontier one step.
    ///
    /// Each stage gets at most one callback invocation. A stage whose phase
    /// has no callback left is finished without an invocation. Running an
    /// async stage sets [`yield_now`](Self::yield_now).
    pub fn run_one_round(&mut self, now: Duration) -> RoundReport {
        let mut report = RoundReport::default();
        self.yield_now = false;

        let queue = self.ready_queue.clone();
        for index in queue {
            let Some(graph) = self.graph.as_ref() else {
                break;
            };
            if graph.node(index).runtime().is_finished {
                continue;
            }
            if index == graph.finish_index() {
                self.run_finish_stage(index, now, &mut report);
                report.did_work = true;
                continue;
            }
            self.step_stage(index, now, &mut report);
        }

        report.yield_now = self.yield_now;
        report
    }

    /// Runs one step of an ordinary stage.
    fn step_stage(&mut self, index: StageIndex, now: Duration, report: &mut RoundReport) {
        let elapsed = self.elapsed(now);
        let percent = self.reporter.percent();
        let thread = ThreadInfo {
            id: self.id,
            label: self.options.label.as_deref(),
            is_primary: self.id.is_primary(),
            load_hidden: self.options.load_hidden,
            percent,
            elapsed,
        };
        let Some(graph) = self.graph.as_mut() else {
            return;
        };
        let node = graph.node_mut(index);

        if node.runtime().phase == StagePhase::Before {
            log::debug!(
                "{}: {}% stage '{}' started at {}ms",
                self.id,
                percent,
                node.name(),
                elapsed.as_millis()
            );
        }

        let mut rate_changed = false;
        let mut completed = false;

        if node.settle_phase() == StagePhase::Idle {
            completed = node.finish();
        } else if let Some(outcome) = node.invoke(thread) {
            report.did_work = true;
            if node.priority() == StagePriority::Async {
                self.yield_now = true;
            }
            match outcome {
                Outcome::Continue => {}
                Outcome::PartialProgress(rate) if rate >= 1.0 => {
                    completed = node.finish();
                }
                Outcome::PartialProgress(rate) => {
                    rate_changed = node.raise_load_rate(rate);
                }
                Outcome::Done => {
                    if node.advance_phase() == StagePhase::Idle {
                        completed = node.finish();
                    }
                }
                Outcome::Complete => {
                    completed = node.finish();
                }
            }
        }

        let finished = node.runtime().is_finished;
        let weighty = node.is_counted() && node.relative_size() > 0.0;
        if finished {
            log::debug!(
                "{}: stage '{}' finished at {}ms",
                self.id,
                node.name(),
                elapsed.as_millis()
            );
        }

        if rate_changed || finished {
            if self.refresh_progress(completed && weighty, now) {
                report.progress_emitted = true;
            }
        }
    }

    /// Runs the synthetic finish stage: the thread becomes loaded.
    fn run_finish_stage(&mut self, index: StageIndex, now: Duration, report: &mut RoundReport) {
        let Some(graph) = self.graph.as_mut() else {
            return;
        };
        graph.node_mut(index).finish();
        let outstanding = graph.has_outstanding_stages();

        self.loaded = true;
        report.reached_finish = true;
        log::info!(
            "{}: loaded after {}ms",
            self.display_name(),
            self.elapsed(now).as_millis()
        );
        if let Some(hook) = self.hooks.on_loaded.as_mut() {
            hook(self.id);
        }
        self.send(LoaderEvent::ThreadLoaded { thread: self.id });

        if outstanding && !self.options.wait_for_background {
            self.status = ThreadStatus::FinishedNoResources;
            log::debug!("{}: background stages still loading", self.id);
            self.report_success();
        }

        if self.refresh_progress(false, now) {
            report.progress_emitted = true;
        }
    }

    /// Marks the thread `Finished`, reports 100 % and success if not done
    /// yet, and releases the graph. Returns whether progress was emitted.
    pub fn finalize(&mut self, now: Duration) -> bool {
        if self.is_done() {
            return false;
        }
        self.status = ThreadStatus::Finished;

        let emitted = match self.reporter.complete() {
            Some(percent) => {
                self.emit_progress(percent, now);
                true
            }
            None => false,
        };
        self.report_success();
        log::info!(
            "{}: 100% loading finished in {}ms",
            self.display_name(),
            self.elapsed(now).as_millis()
        );
        self.release();
        emitted
    }

    /// Stops the thread immediately and reports failure.
    ///
    /// Returns `false` if the thread was already finished or aborted.
    /// Callback-owned resources are not tracked; stages must release them
    /// through their own channels.
    pub fn abort(&mut self) -> bool {
        if self.is_done() {
            return false;
        }
        self.status = ThreadStatus::Aborted;
        log::info!("{}: aborted", self.display_name());
        if let Some(hook) = self.hooks.on_complete.as_mut() {
            hook(self.id, false);
        }
        self.send(LoaderEvent::ThreadAborted { thread: self.id });
        self.release();
        true
    }

    /// Looks up a stage by name.
    pub fn stage_index(&self, name: &str) -> Result<StageIndex, SchedulerError> {
        let graph = self
            .graph
            .as_ref()
            .ok_or(SchedulerError::UnknownThread(self.id))?;
        graph
            .index_of(name)
            .ok_or_else(|| SchedulerError::UnknownStage {
                thread: self.id,
                name: name.to_string(),
            })
    }

    /// Skips a stage that has not started yet; it counts as fully loaded.
    /// Returns whether progress was emitted.
    pub fn skip_stage(&mut self, name: &str, now: Duration) -> Result<bool, SchedulerError> {
        let index = self.stage_index(name)?;
        let Some(graph) = self.graph.as_mut() else {
            return Err(SchedulerError::UnknownThread(self.id));
        };
        if index == graph.finish_index() {
            return Err(SchedulerError::ReservedStage {
                thread: self.id,
                name: name.to_string(),
            });
        }
        let node = graph.node_mut(index);
        if !node.skip() {
            return Err(SchedulerError::StageAlreadyStarted {
                thread: self.id,
                name: name.to_string(),
            });
        }
        let weighty = node.is_counted() && node.relative_size() > 0.0;
        log::debug!("{}: stage '{}' skipped", self.id, name);

        if self.status == ThreadStatus::Idle {
            // Picked up by the first refresh after the 0 % announcement.
            return Ok(false);
        }
        Ok(self.refresh_progress(weighty, now))
    }

    fn refresh_progress(&mut self, stage_completed: bool, now: Duration) -> bool {
        let Some(graph) = self.graph.as_ref() else {
            return false;
        };
        let computed = ProgressReporter::compute(graph);
        match self.reporter.observe(computed, stage_completed) {
            Some(percent) => {
                self.emit_progress(percent, now);
                true
            }
            None => false,
        }
    }

    fn emit_progress(&mut self, percent: u8, now: Duration) {
        let elapsed_ms = self.elapsed(now).as_secs_f64() * 1000.0;
        log::trace!("{}: progress {}% at {:.1}ms", self.id, percent, elapsed_ms);
        if let Some(hook) = self.hooks.on_progress.as_mut() {
            hook(percent, elapsed_ms);
        }
        self.send(LoaderEvent::Progress {
            thread: self.id,
            percent,
            elapsed_ms,
        });
    }

    fn report_success(&mut self) {
        if self.success_reported {
            return;
        }
        self.success_reported = true;
        if let Some(hook) = self.hooks.on_complete.as_mut() {
            hook(self.id, true);
        }
        self.send(LoaderEvent::ThreadCompleted {
            thread: self.id,
            success: true,
        });
    }

    fn release(&mut self) {
        self.hooks = ThreadHooks::default();
        self.events = None;
        self.graph = None;
        self.ready_queue = Vec::new();
        self.retired = Vec::new();
        self.yield_now = false;
    }

    fn elapsed(&self, now: Duration) -> Duration {
        self.started_at
            .map(|start| now.saturating_sub(start))
            .unwrap_or_default()
    }

    fn send(&self, event: LoaderEvent) {
        if let Some(sender) = &self.events {
            if let Err(e) = sender.send(event) {
                log::trace!("Dropping loader event, receiver disconnected: {e}");
            }
        }
    }

    fn display_name(&self) -> String {
        match self.label() {
            Some(label) => format!("{} ({})", self.id, label),
            None => self.id.to_string(),
        }
    }
}

impl fmt::Debug for LoadThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadThread")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("percent", &self.reporter.percent())
            .field("loaded", &self.loaded)
            .field("ready_queue", &self.ready_queue)
            .finish()
    }
}

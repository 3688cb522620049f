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

//! Static stage descriptions and the callback contract.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use super::{Outcome, StagePhase, StagePriority};
use crate::context::StageContext;

/// A callback invoked by the scheduler for one phase of a stage.
///
/// Callbacks must return promptly; a callback waiting on external work
/// should return [`Outcome::Continue`] and be polled again next round.
/// The context is borrowed for the duration of the call only.
pub trait StageCallback {
    /// Runs one step of the stage.
    fn call(&mut self, ctx: &StageContext<'_>) -> Outcome;
}

impl<F> StageCallback for F
where
    F: FnMut(&StageContext<'_>) -> Outcome,
{
    fn call(&mut self, ctx: &StageContext<'_>) -> Outcome {
        self(ctx)
    }
}

/// The per-phase callback handles of a stage.
#[derive(Default)]
pub struct StageCallbacks {
    before: Option<Box<dyn StageCallback>>,
    loop_tick: Option<Box<dyn StageCallback>>,
    after: Option<Box<dyn StageCallback>>,
}

impl StageCallbacks {
    /// Returns `true` if a callback is registered for `phase`.
    pub fn has(&self, phase: StagePhase) -> bool {
        match phase {
            StagePhase::Before => self.before.is_some(),
            StagePhase::Loop => self.loop_tick.is_some(),
            StagePhase::After => self.after.is_some(),
            StagePhase::Idle => false,
        }
    }

    /// Returns `true` if no phase has a callback.
    pub fn is_empty(&self) -> bool {
        self.before.is_none() && self.loop_tick.is_none() && self.after.is_none()
    }

    /// Returns the callback registered for `phase`, if any.
    pub fn get_mut(&mut self, phase: StagePhase) -> Option<&mut (dyn StageCallback + 'static)> {
        match phase {
            StagePhase::Before => self.before.as_deref_mut(),
            StagePhase::Loop => self.loop_tick.as_deref_mut(),
            StagePhase::After => self.after.as_deref_mut(),
            StagePhase::Idle => None,
        }
    }

    /// Starting from `phase`, returns the first phase that has a callback,
    /// or `Idle` if none remains.
    pub fn first_runnable_from(&self, mut phase: StagePhase) -> StagePhase {
        while phase != StagePhase::Idle && !self.has(phase) {
            phase = phase.next();
        }
        phase
    }
}

/// Which phases a [`Stage`] implementation provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhaseSet {
    /// The stage implements [`Stage::before`].
    pub before: bool,
    /// The stage implements [`Stage::loop_tick`].
    pub loop_tick: bool,
    /// The stage implements [`Stage::after`].
    pub after: bool,
}

impl PhaseSet {
    /// Only the one-shot setup phase.
    pub const BEFORE: PhaseSet = PhaseSet {
        before: true,
        loop_tick: false,
        after: false,
    };
    /// Only the repeated phase.
    pub const LOOP: PhaseSet = PhaseSet {
        before: false,
        loop_tick: true,
        after: false,
    };
    /// All three phases.
    pub const ALL: PhaseSet = PhaseSet {
        before: true,
        loop_tick: true,
        after: true,
    };
}

/// A stage kind with its phase logic in one type.
///
/// Implement this instead of registering closures when the phases share
/// state. Only the phases declared by [`Stage::phases`] are scheduled.
pub trait Stage {
    /// The phases this stage implements.
    fn phases(&self) -> PhaseSet;

    /// Setup step, run once when the stage's dependencies are finished.
    fn before(&mut self, _ctx: &StageContext<'_>) -> Outcome {
        Outcome::Done
    }

    /// Repeated step, run every round until it reports done.
    fn loop_tick(&mut self, _ctx: &StageContext<'_>) -> Outcome {
        Outcome::Done
    }

    /// Final step.
    fn after(&mut self, _ctx: &StageContext<'_>) -> Outcome {
        Outcome::Done
    }
}

/// Immutable description of one unit of loading work.
///
/// ```rust,ignore
/// let def = StageDef::new("load_textures")
///     .with_inputs(["load_main"])
///     .with_priority(StagePriority::Async)
///     .with_relative_size(40.0)
///     .background()
///     .resource()
///     .loop_tick(|_ctx: &StageContext<'_>| Outcome::PartialProgress(0.5));
/// ```
pub struct StageDef {
    pub(crate) name: String,
    pub(crate) priority: StagePriority,
    pub(crate) inputs: Vec<String>,
    pub(crate) relative_size: f64,
    pub(crate) background_loading: bool,
    pub(crate) is_resource: bool,
    pub(crate) primary_only: bool,
    pub(crate) callbacks: StageCallbacks,
    pub(crate) cb_param: Option<Arc<dyn Any + Send + Sync>>,
}

impl StageDef {
    /// Creates a synchronous stage with no dependencies, no weight and no callbacks.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: StagePriority::Sync,
            inputs: Vec::new(),
            relative_size: 0.0,
            background_loading: false,
            is_resource: false,
            primary_only: false,
            callbacks: StageCallbacks::default(),
            cb_param: None,
        }
    }

    /// Creates a stage whose callbacks are the phases of `stage`.
    pub fn from_stage<S: Stage + 'static>(name: impl Into<String>, stage: S) -> Self {
        let phases = stage.phases();
        let shared = Rc::new(RefCell::new(stage));
        let mut def = Self::new(name);

        if phases.before {
            let stage = Rc::clone(&shared);
            def = def.before(move |ctx: &StageContext<'_>| stage.borrow_mut().before(ctx));
        }
        if phases.loop_tick {
            let stage = Rc::clone(&shared);
            def = def.loop_tick(move |ctx: &StageContext<'_>| stage.borrow_mut().loop_tick(ctx));
        }
        if phases.after {
            let stage = Rc::clone(&shared);
            def = def.after(move |ctx: &StageContext<'_>| stage.borrow_mut().after(ctx));
        }
        def
    }

    /// Sets the scheduling class.
    pub fn with_priority(mut self, priority: StagePriority) -> Self {
        self.priority = priority;
        self
    }

    /// Declares the stages that must finish before this one starts.
    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.extend(inputs.into_iter().map(Into::into));
        self
    }

    /// Sets the weight used for the aggregate load percentage.
    /// Negative and non-finite weights are treated as zero.
    pub fn with_relative_size(mut self, size: f64) -> Self {
        self.relative_size = if size.is_finite() { size.max(0.0) } else { 0.0 };
        self
    }

    /// Marks the stage as not required for the "loaded" signal.
    pub fn background(mut self) -> Self {
        self.background_loading = true;
        self
    }

    /// Marks the stage as a resource stage, elided when resources are skipped.
    pub fn resource(mut self) -> Self {
        self.is_resource = true;
        self
    }

    /// Restricts the stage to the primary thread.
    pub fn primary_only(mut self) -> Self {
        self.primary_only = true;
        self
    }

    /// Registers the setup callback.
    pub fn before(mut self, callback: impl StageCallback + 'static) -> Self {
        self.callbacks.before = Some(Box::new(callback));
        self
    }

    /// Registers the repeated callback.
    pub fn loop_tick(mut self, callback: impl StageCallback + 'static) -> Self {
        self.callbacks.loop_tick = Some(Box::new(callback));
        self
    }

    /// Registers the final callback.
    pub fn after(mut self, callback: impl StageCallback + 'static) -> Self {
        self.callbacks.after = Some(Box::new(callback));
        self
    }

    /// Attaches an opaque payload forwarded to every callback of this stage.
    pub fn with_param<T: Any + Send + Sync>(mut self, param: T) -> Self {
        self.cb_param = Some(Arc::new(param));
        self
    }

    /// The stage's unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The stage's scheduling class.
    pub fn priority(&self) -> StagePriority {
        self.priority
    }

    /// Names of the stages this one depends on.
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// The stage's weight.
    pub fn relative_size(&self) -> f64 {
        self.relative_size
    }

    /// Whether the stage is a background stage.
    pub fn is_background(&self) -> bool {
        self.background_loading
    }

    /// Whether the stage is a resource stage.
    pub fn is_resource(&self) -> bool {
        self.is_resource
    }

    /// Whether the stage only runs on the primary thread.
    pub fn is_primary_only(&self) -> bool {
        self.primary_only
    }
}

impl fmt::Debug for StageDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageDef")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("inputs", &self.inputs)
            .field("relative_size", &self.relative_size)
            .field("background_loading", &self.background_loading)
            .field("is_resource", &self.is_resource)
            .field("primary_only", &self.primary_only)
            .field("before", &self.callbacks.has(StagePhase::Before))
            .field("loop_tick", &self.callbacks.has(StagePhase::Loop))
            .field("after", &self.callbacks.has(StagePhase::After))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        ticks: u32,
    }

    impl Stage for Counter {
        fn phases(&self) -> PhaseSet {
            PhaseSet::LOOP
        }

        fn loop_tick(&mut self, _ctx: &StageContext<'_>) -> Outcome {
            self.ticks += 1;
            Outcome::Continue
        }
    }

    #[test]
    fn builder_sets_flags_and_inputs() {
        let def = StageDef::new("textures")
            .with_inputs(["main", "binaries"])
            .with_priority(StagePriority::Async)
            .with_relative_size(-3.0)
            .background()
            .resource()
            .primary_only();

        assert_eq!(def.name(), "textures");
        assert_eq!(def.inputs(), &["main".to_string(), "binaries".to_string()]);
        assert_eq!(def.priority(), StagePriority::Async);
        assert_eq!(def.relative_size(), 0.0, "negative weights clamp to zero");
        assert!(def.is_background());
        assert!(def.is_resource());
        assert!(def.is_primary_only());
        assert!(def.callbacks.is_empty());
    }

    #[test]
    fn from_stage_registers_declared_phases_only() {
        let def = StageDef::from_stage("counter", Counter { ticks: 0 });
        assert!(!def.callbacks.has(StagePhase::Before));
        assert!(def.callbacks.has(StagePhase::Loop));
        assert!(!def.callbacks.has(StagePhase::After));
    }

    #[test]
    fn first_runnable_skips_missing_phases() {
        let callbacks = StageDef::new("s")
            .after(|_: &StageContext<'_>| Outcome::Done)
            .callbacks;
        assert_eq!(
            callbacks.first_runnable_from(StagePhase::Before),
            StagePhase::After
        );
        assert_eq!(
            StageCallbacks::default().first_runnable_from(StagePhase::Before),
            StagePhase::Idle
        );
    }
}

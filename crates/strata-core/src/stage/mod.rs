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

//! # Stages
//!
//! A **stage** is a named unit of loading work with declared dependencies.
//! The scheduler drives each stage through up to three phases, calling the
//! matching callback once per round:
//!
//! 1. **Before**: one-shot setup (open a file, issue a request).
//! 2. **Loop**: repeated until the stage reports it is done.
//! 3. **After**: one-shot teardown or hand-off.
//!
//! Phases without a callback are skipped without consuming a round.

use std::fmt;

mod def;

pub use def::{PhaseSet, Stage, StageCallback, StageCallbacks, StageDef};

/// Scheduling class of a stage.
///
/// Ordered `Finish > Async > Sync`: higher classes are run first within a
/// round. Executing an `Async` stage ends the current tick so that external
/// asynchronous work gets a chance to progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum StagePriority {
    /// Plain synchronous work.
    #[default]
    Sync,
    /// Work waiting on something outside the scheduler (fetches, decoders).
    Async,
    /// Terminal bookkeeping, run ahead of everything else once ready.
    Finish,
}

impl fmt::Display for StagePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StagePriority::Sync => write!(f, "Sync"),
            StagePriority::Async => write!(f, "Async"),
            StagePriority::Finish => write!(f, "Finish"),
        }
    }
}

/// The phase a stage is currently in.
///
/// Phases only move forward: `Before → Loop → After → Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StagePhase {
    /// The stage has not run its setup callback yet.
    #[default]
    Before,
    /// The stage is being ticked repeatedly.
    Loop,
    /// The stage is running its final callback.
    After,
    /// The stage has nothing left to run.
    Idle,
}

impl StagePhase {
    /// Returns the phase that follows this one. `Idle` is terminal.
    pub fn next(self) -> StagePhase {
        match self {
            StagePhase::Before => StagePhase::Loop,
            StagePhase::Loop => StagePhase::After,
            StagePhase::After | StagePhase::Idle => StagePhase::Idle,
        }
    }
}

/// What a stage callback reports back to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// No change; the same callback runs again next round.
    Continue,
    /// The stage is partially loaded. A rate below `1.0` keeps the current
    /// phase; a rate of `1.0` or more finishes the stage.
    PartialProgress(f32),
    /// The current phase is done; move on to the next phase with a callback.
    Done,
    /// The whole stage is finished, whatever phases remain.
    Complete,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering_matches_scheduling_order() {
        assert!(StagePriority::Finish > StagePriority::Async);
        assert!(StagePriority::Async > StagePriority::Sync);
        assert_eq!(StagePriority::default(), StagePriority::Sync);
    }

    #[test]
    fn phases_only_move_forward() {
        let mut phase = StagePhase::default();
        let mut visited = vec![phase];
        while phase != StagePhase::Idle {
            phase = phase.next();
            visited.push(phase);
        }
        assert_eq!(
            visited,
            vec![
                StagePhase::Before,
                StagePhase::Loop,
                StagePhase::After,
                StagePhase::Idle
            ]
        );
        assert_eq!(StagePhase::Idle.next(), StagePhase::Idle);
    }
}

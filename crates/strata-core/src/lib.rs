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

//! # Strata Core
//!
//! Foundational crate containing the stage model, the stage graph builder,
//! and the interface contracts shared by the loading scheduler and the
//! stages it drives.

#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod stage;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{SchedulerConfig, ThreadOptions, MAX_TICK_BUDGET_MS};
pub use context::{StageContext, ThreadId, ThreadInfo};
pub use error::{ConfigError, GraphError};
pub use graph::{GraphOptions, StageGraph, StageIndex, StageNode, StageRuntime, FINISH_STAGE_NAME};
pub use stage::{Outcome, PhaseSet, Stage, StageCallback, StageDef, StagePhase, StagePriority};

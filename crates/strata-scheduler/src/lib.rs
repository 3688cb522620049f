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

//! # Strata Scheduler
//!
//! A cooperative, time-budgeted scheduler for staged loading jobs.
//!
//! The host creates one [`Scheduler`], adds loading threads (each a DAG of
//! stages) and calls [`Scheduler::update`] once per frame. Every update runs
//! bounded slices of stage work so the frame loop is never blocked.
//!
//! ```rust,ignore
//! let mut scheduler = Scheduler::new(SchedulerConfig::default());
//! let scene = scheduler.create_thread(stages, ThreadOptions::primary(), ThreadHooks::new())?;
//! while !scheduler.is_finished() {
//!     scheduler.update();
//!     render_frame();
//! }
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod event;
pub mod progress;
pub mod scheduler;
pub mod thread;

pub use error::SchedulerError;
pub use event::LoaderEvent;
pub use progress::ProgressReporter;
pub use scheduler::{create_scheduler, Scheduler, StageSnapshot};
pub use thread::{LoadThread, RoundReport, ThreadHooks, ThreadStatus};

pub use strata_core::{
    Outcome, SchedulerConfig, Stage, StageContext, StageDef, StagePhase, StagePriority, ThreadId,
    ThreadOptions,
};

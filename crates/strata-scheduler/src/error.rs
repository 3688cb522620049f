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

//! Errors returned by scheduler operations.

use strata_core::{GraphError, ThreadId};
use thiserror::Error;

/// An error raised by a [`Scheduler`](crate::Scheduler) operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The stage set of a new thread is invalid; no thread was registered.
    #[error("Invalid stage graph: {0}")]
    Graph(#[from] GraphError),
    /// No thread has this id, or its stage graph was already released.
    #[error("Unknown or retired thread {0}")]
    UnknownThread(ThreadId),
    /// The thread has no stage with this name.
    #[error("{thread} has no stage named '{name}'")]
    UnknownStage {
        /// The thread searched.
        thread: ThreadId,
        /// The missing name.
        name: String,
    },
    /// The stage is reserved for the scheduler's own bookkeeping.
    #[error("Stage '{name}' of {thread} is managed by the scheduler")]
    ReservedStage {
        /// The owning thread.
        thread: ThreadId,
        /// The stage's name.
        name: String,
    },
    /// The stage already entered its work and can no longer be skipped.
    #[error("Stage '{name}' of {thread} has already started")]
    StageAlreadyStarted {
        /// The owning thread.
        thread: ThreadId,
        /// The stage's name.
        name: String,
    },
}

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

//! Observability events emitted by the scheduler.

use strata_core::ThreadId;

/// A lifecycle or progress notification for one loading thread.
///
/// Attach a channel with [`Scheduler::with_event_sender`](crate::Scheduler::with_event_sender)
/// to receive these alongside the per-thread hooks.
#[derive(Debug, Clone, PartialEq)]
pub enum LoaderEvent {
    /// The thread left `Idle` and began loading.
    ThreadStarted {
        /// The thread.
        thread: ThreadId,
    },
    /// The thread's load percentage was reported.
    Progress {
        /// The thread.
        thread: ThreadId,
        /// Load percentage, `0..=100`.
        percent: u8,
        /// Milliseconds since the thread started.
        elapsed_ms: f64,
    },
    /// The thread's finish stage ran: the scene is usable.
    ThreadLoaded {
        /// The thread.
        thread: ThreadId,
    },
    /// The thread's completion was reported.
    ThreadCompleted {
        /// The thread.
        thread: ThreadId,
        /// `false` only for aborted threads.
        success: bool,
    },
    /// The thread was aborted by the host.
    ThreadAborted {
        /// The thread.
        thread: ThreadId,
    },
}

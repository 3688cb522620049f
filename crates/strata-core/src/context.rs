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

//! The read-only context handed to stage callbacks.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::stage::StagePhase;

/// Identifier of a loading thread (a loading job, not an OS thread).
///
/// Ids are assigned in creation order; id `0` is the primary thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub usize);

impl ThreadId {
    /// The id of the primary thread.
    pub const PRIMARY: ThreadId = ThreadId(0);

    /// Returns `true` for the primary thread.
    pub fn is_primary(self) -> bool {
        self == Self::PRIMARY
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread#{}", self.0)
    }
}

/// A snapshot of the owning thread, as seen by a callback.
#[derive(Debug, Clone, Copy)]
pub struct ThreadInfo<'a> {
    /// The thread's id.
    pub id: ThreadId,
    /// Optional human-readable label (typically the scene path).
    pub label: Option<&'a str>,
    /// Whether this is the primary thread.
    pub is_primary: bool,
    /// Opaque flag forwarded unchanged from the thread options.
    pub load_hidden: bool,
    /// The thread's current load percentage.
    pub percent: u8,
    /// Time since the thread started loading.
    pub elapsed: Duration,
}

/// Borrowed `(thread, stage)` context passed to a [`StageCallback`](crate::StageCallback).
///
/// The context must not be retained beyond the call.
pub struct StageContext<'a> {
    /// The owning thread.
    pub thread: ThreadInfo<'a>,
    /// The stage's name.
    pub stage: &'a str,
    /// The phase whose callback is running.
    pub phase: StagePhase,
    /// The stage's load rate before this call, in `[0, 1]`.
    pub load_rate: f32,
    /// The stage's opaque payload.
    pub cb_param: Option<&'a Arc<dyn Any + Send + Sync>>,
}

impl StageContext<'_> {
    /// Returns the payload downcast to `T`, if it has that type.
    pub fn param<T: Any>(&self) -> Option<&T> {
        self.cb_param.and_then(|param| param.downcast_ref::<T>())
    }
}

impl fmt::Debug for StageContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageContext")
            .field("thread", &self.thread)
            .field("stage", &self.stage)
            .field("phase", &self.phase)
            .field("load_rate", &self.load_rate)
            .field("has_param", &self.cb_param.is_some())
            .finish()
    }
}

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

//! Defines the error types raised while building stage graphs and loading configuration.

use thiserror::Error;

/// A stage set that cannot be turned into a valid loading graph.
///
/// These are configuration errors: they are reported when a thread is
/// created, before any tick runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Two stages share the same name.
    #[error("Duplicate stage name '{name}'")]
    DuplicateStage {
        /// The repeated name.
        name: String,
    },
    /// A stage depends on a name no stage declares.
    #[error("Stage '{stage}' depends on unknown stage '{dependency}'")]
    UnknownDependency {
        /// The stage declaring the dependency.
        stage: String,
        /// The missing dependency.
        dependency: String,
    },
    /// A stage uses the name reserved for the synthetic finish stage.
    #[error("Stage name '{name}' is reserved")]
    ReservedName {
        /// The offending name.
        name: String,
    },
    /// The dependencies contain a cycle, skipped stages included.
    #[error("Dependency cycle among stages: {}", stages.join(", "))]
    Cycle {
        /// Names of the stages that could not be ordered.
        stages: Vec<String>,
    },
}

/// An error loading or validating scheduler configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    /// The configuration text is not valid RON for the expected type.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] ron::error::SpannedError),
    /// The configuration parsed but holds unusable values.
    #[error("Invalid configuration: {reason}")]
    Invalid {
        /// What is wrong with it.
        reason: String,
    },
}

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

//! Scheduler and per-thread configuration.
//!
//! Both structures deserialize from RON with every field optional:
//!
//! ```ron
//! (
//!     tick_budget_ms: 8,
//!     throttle_after_progress: false,
//! )
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default per-tick work budget, in milliseconds.
pub const MAX_TICK_BUDGET_MS: u64 = 16;

/// Configuration for the loading scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Wall-clock budget for one `update()` call, in milliseconds.
    /// The budget is checked between rounds, so a slow callback may overrun it.
    pub tick_budget_ms: u64,
    /// Skip the tick following any progress emission, giving the host a
    /// frame to react before the next burst of work.
    pub throttle_after_progress: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_budget_ms: MAX_TICK_BUDGET_MS,
            throttle_after_progress: true,
        }
    }
}

impl SchedulerConfig {
    /// Parses and validates a configuration from RON text.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let config: SchedulerConfig = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_ron_str(&text)?;
        log::debug!("Loaded scheduler configuration from {}", path.display());
        Ok(config)
    }

    /// Checks that the values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_budget_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "tick_budget_ms must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// The per-tick budget as a duration (never zero).
    pub fn tick_budget(&self) -> Duration {
        Duration::from_millis(self.tick_budget_ms.max(1))
    }
}

/// Options recognised when a loading thread is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadOptions {
    /// The "loaded" signal waits for every stage rather than only the
    /// non-background ones.
    pub wait_for_background: bool,
    /// Elide resource stages entirely.
    pub skip_resources: bool,
    /// Informational only, the scheduler ignores it: the first thread created
    /// is always the primary one, and setting this on a later thread only
    /// logs a warning.
    pub is_primary: bool,
    /// Opaque flag forwarded unchanged to stage callbacks.
    pub load_hidden: bool,
    /// Human-readable name used in logs.
    pub label: Option<String>,
}

impl ThreadOptions {
    /// Options for the primary thread.
    pub fn primary() -> Self {
        Self {
            is_primary: true,
            ..Self::default()
        }
    }

    /// Sets the label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = SchedulerConfig::from_ron_str("(tick_budget_ms: 8)").unwrap();
        assert_eq!(config.tick_budget(), Duration::from_millis(8));
        assert!(config.throttle_after_progress);

        let config = SchedulerConfig::from_ron_str("(throttle_after_progress: true)").unwrap();
        assert_eq!(config, SchedulerConfig::default());
    }

    #[test]
    fn zero_budget_is_rejected() {
        let err = SchedulerConfig::from_ron_str("(tick_budget_ms: 0)").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }), "got {err:?}");
    }

    #[test]
    fn malformed_text_is_a_parse_error() {
        let err = SchedulerConfig::from_ron_str("(tick_budget_ms: \"fast\")").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "got {err:?}");
    }

    #[test]
    fn load_reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "(tick_budget_ms: 4, throttle_after_progress: false)").unwrap();

        let config = SchedulerConfig::load(file.path()).unwrap();
        assert_eq!(config.tick_budget_ms, 4);
        assert!(!config.throttle_after_progress);

        let missing = SchedulerConfig::load(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }

    #[test]
    fn thread_options_parse_from_ron() {
        let options: ThreadOptions =
            ron::from_str("(skip_resources: true, label: Some(\"level_1.json\"))").unwrap();
        assert!(options.skip_resources);
        assert!(!options.wait_for_background);
        assert_eq!(options.label.as_deref(), Some("level_1.json"));
    }
}

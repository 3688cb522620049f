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

//! Load percentage derivation and edge-triggered reporting.

use strata_core::StageGraph;

/// Tolerance added before flooring so `0.9` of a stage reads as 90 %, not 89 %.
const PERCENT_EPSILON: f64 = 1e-4;

/// Turns stage weights and rates into a percentage and decides when it is
/// worth reporting.
///
/// The reported percentage never decreases.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    percent: u8,
    last_reported: Option<u8>,
}

impl ProgressReporter {
    /// Creates a reporter at 0 % with nothing reported yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// `floor(100 * loaded / total)` over counted stages, or 100 when the
    /// graph has no counted weight.
    pub fn compute(graph: &StageGraph) -> u8 {
        let total = graph.total_weight();
        if total <= 0.0 {
            return 100;
        }
        // Rates are f32; absorb their representation error before flooring.
        let ratio = (graph.loaded_weight() * 100.0 / total + PERCENT_EPSILON).floor();
        ratio.clamp(0.0, 100.0) as u8
    }

    /// The current percentage.
    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// The last value handed to the host, if any.
    pub fn last_reported(&self) -> Option<u8> {
        self.last_reported
    }

    /// Folds a freshly computed value in. Returns the percentage to emit
    /// when it differs from the last report or when `stage_completed` is set.
    pub fn observe(&mut self, computed: u8, stage_completed: bool) -> Option<u8> {
        self.percent = self.percent.max(computed.min(100));
        if stage_completed || self.last_reported != Some(self.percent) {
            self.last_reported = Some(self.percent);
            Some(self.percent)
        } else {
            None
        }
    }

    /// Reports the current value unconditionally (used when loading starts).
    pub fn announce(&mut self) -> u8 {
        self.last_reported = Some(self.percent);
        self.percent
    }

    /// Jumps to 100 %. Returns `Some(100)` if that was not reported yet.
    pub fn complete(&mut self) -> Option<u8> {
        self.observe(100, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::graph::GraphOptions;
    use strata_core::{Outcome, StageContext, StageDef};

    fn noop(_: &StageContext<'_>) -> Outcome {
        Outcome::Done
    }

    #[test]
    fn compute_floors_the_weighted_ratio() {
        let mut graph = StageGraph::build(
            vec![
                StageDef::new("a").with_relative_size(10.0).before(noop),
                StageDef::new("b")
                    .with_inputs(["a"])
                    .with_relative_size(30.0)
                    .loop_tick(noop),
            ],
            GraphOptions::default(),
        )
        .unwrap();
        assert_eq!(ProgressReporter::compute(&graph), 0);

        graph.node_mut(0).finish();
        assert_eq!(ProgressReporter::compute(&graph), 25);

        graph.node_mut(1).raise_load_rate(0.5);
        assert_eq!(ProgressReporter::compute(&graph), 62);

        graph.node_mut(1).finish();
        assert_eq!(ProgressReporter::compute(&graph), 100);
    }

    #[test]
    fn f32_rates_do_not_lose_a_point() {
        for (rate, expected) in [(0.3f32, 30u8), (0.7, 70), (0.9, 90)] {
            let mut graph = StageGraph::build(
                vec![StageDef::new("s").with_relative_size(10.0).loop_tick(noop)],
                GraphOptions::default(),
            )
            .unwrap();
            graph.node_mut(0).raise_load_rate(rate);
            assert_eq!(
                ProgressReporter::compute(&graph),
                expected,
                "rate {rate} on weight 10"
            );
        }
    }

    #[test]
    fn weightless_graph_is_complete() {
        let graph = StageGraph::build(Vec::new(), GraphOptions::default()).unwrap();
        assert_eq!(ProgressReporter::compute(&graph), 100);
    }

    #[test]
    fn reports_are_edge_triggered_and_monotonic() {
        let mut reporter = ProgressReporter::new();
        assert_eq!(reporter.announce(), 0);
        assert_eq!(reporter.observe(0, false), None);
        assert_eq!(reporter.observe(30, false), Some(30));
        assert_eq!(reporter.observe(30, false), None);
        assert_eq!(reporter.observe(30, true), Some(30), "stage completion forces a report");
        assert_eq!(reporter.observe(10, false), None, "percent never regresses");
        assert_eq!(reporter.percent(), 30);
        assert_eq!(reporter.complete(), Some(100));
        assert_eq!(reporter.complete(), None);
    }
}

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

//! # Stage Graph
//!
//! Turns a set of [`StageDef`]s into a validated DAG addressed by dense
//! indices. Names are resolved once at build time; everything after that
//! works on [`StageIndex`] values.
//!
//! The builder also:
//! - marks stages that must not run as *skipped* (finished from the start,
//!   with a load rate of 1, so their dependents still become ready);
//! - appends a synthetic finish stage that depends on the *target sinks*.
//!   When background stages do not gate the "loaded" signal, background
//!   sinks are peeled off repeatedly and only the remaining sinks are wired
//!   to the finish stage.

use std::collections::HashMap;

use crate::context::ThreadInfo;
use crate::error::GraphError;
use crate::stage::{Outcome, StageCallbacks, StageDef, StagePhase, StagePriority};
use crate::StageContext;

pub mod topological_sort;

pub use topological_sort::{topological_order, CycleError};

/// Index of a stage inside its [`StageGraph`].
pub type StageIndex = usize;

/// Name of the synthetic finish stage. Caller stages may not use it.
pub const FINISH_STAGE_NAME: &str = "@finish";

/// Weight of the synthetic finish stage.
pub const FINISH_STAGE_SIZE: f64 = 0.0;

/// Flags that shape a graph at build time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphOptions {
    /// The owning thread is the primary one; `primary_only` stages run.
    pub is_primary: bool,
    /// Resource stages are skipped and left out of the progress total.
    pub skip_resources: bool,
    /// The finish stage waits for every sink, background ones included.
    pub wait_for_background: bool,
}

/// Mutable per-thread state of one stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageRuntime {
    /// Current phase.
    pub phase: StagePhase,
    /// Whether the stage has completed (or was skipped).
    pub is_finished: bool,
    /// Whether the stage was skipped instead of run.
    pub skip: bool,
    /// Fraction of the stage's work done, in `[0, 1]`.
    pub load_rate: f32,
}

impl StageRuntime {
    fn pending() -> Self {
        Self {
            phase: StagePhase::Before,
            is_finished: false,
            skip: false,
            load_rate: 0.0,
        }
    }

    fn skipped() -> Self {
        Self {
            phase: StagePhase::Idle,
            is_finished: true,
            skip: true,
            load_rate: 1.0,
        }
    }
}

/// One node of the graph: the stage's static description plus its runtime state.
pub struct StageNode {
    name: String,
    priority: StagePriority,
    relative_size: f64,
    background_loading: bool,
    is_resource: bool,
    primary_only: bool,
    counted: bool,
    callbacks: StageCallbacks,
    cb_param: Option<std::sync::Arc<dyn std::any::Any + Send + Sync>>,
    runtime: StageRuntime,
}

impl StageNode {
    fn from_def(def: StageDef, options: GraphOptions) -> Self {
        let skip = (options.skip_resources && def.is_resource)
            || (!options.is_primary && def.primary_only);
        let counted = !skip && !def.callbacks.is_empty();

        Self {
            name: def.name,
            priority: def.priority,
            relative_size: def.relative_size,
            background_loading: def.background_loading,
            is_resource: def.is_resource,
            primary_only: def.primary_only,
            counted,
            callbacks: def.callbacks,
            cb_param: def.cb_param,
            runtime: if skip {
                StageRuntime::skipped()
            } else {
                StageRuntime::pending()
            },
        }
    }

    fn finish_stage() -> Self {
        Self {
            name: FINISH_STAGE_NAME.to_string(),
            priority: StagePriority::Finish,
            relative_size: FINISH_STAGE_SIZE,
            background_loading: false,
            is_resource: false,
            primary_only: false,
            counted: false,
            callbacks: StageCallbacks::default(),
            cb_param: None,
            runtime: StageRuntime::pending(),
        }
    }

    /// The stage's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The stage's scheduling class.
    pub fn priority(&self) -> StagePriority {
        self.priority
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

    /// Whether the stage contributes to the progress total.
    pub fn is_counted(&self) -> bool {
        self.counted
    }

    /// Whether the stage has any callback at all.
    pub fn has_callbacks(&self) -> bool {
        !self.callbacks.is_empty()
    }

    /// The stage's runtime state.
    pub fn runtime(&self) -> &StageRuntime {
        &self.runtime
    }

    /// Moves the phase forward past phases that have no callback and
    /// returns the phase the stage now sits in.
    pub fn settle_phase(&mut self) -> StagePhase {
        self.runtime.phase = self.callbacks.first_runnable_from(self.runtime.phase);
        self.runtime.phase
    }

    /// Leaves the current phase for the next one that has a callback.
    pub fn advance_phase(&mut self) -> StagePhase {
        let next = self.runtime.phase.next();
        self.runtime.phase = self.callbacks.first_runnable_from(next);
        self.runtime.phase
    }

    /// Invokes the callback of the current phase, if there is one.
    pub fn invoke(&mut self, thread: ThreadInfo<'_>) -> Option<Outcome> {
        let phase = self.runtime.phase;
        let ctx = StageContext {
            thread,
            stage: &self.name,
            phase,
            load_rate: self.runtime.load_rate,
            cb_param: self.cb_param.as_ref(),
        };
        let callback = self.callbacks.get_mut(phase)?;
        Some(callback.call(&ctx))
    }

    /// Raises the load rate to `rate` (clamped to `[0, 1]`). Lower rates are
    /// ignored. Returns `true` if the rate changed.
    pub fn raise_load_rate(&mut self, rate: f32) -> bool {
        let rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        if rate > self.runtime.load_rate {
            self.runtime.load_rate = rate;
            true
        } else {
            false
        }
    }

    /// Marks the stage finished with a full load rate. Returns `true` if the
    /// load rate was below 1 before the call.
    pub fn finish(&mut self) -> bool {
        let was_partial = self.runtime.load_rate < 1.0;
        self.runtime.is_finished = true;
        self.runtime.phase = StagePhase::Idle;
        self.runtime.load_rate = 1.0;
        was_partial
    }

    /// Skips a stage that has not started. Returns `false` if it already
    /// started or finished.
    pub fn skip(&mut self) -> bool {
        if self.runtime.is_finished || self.runtime.phase != StagePhase::Before {
            return false;
        }
        self.runtime = StageRuntime::skipped();
        true
    }
}

impl std::fmt::Debug for StageNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageNode")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("relative_size", &self.relative_size)
            .field("background_loading", &self.background_loading)
            .field("counted", &self.counted)
            .field("runtime", &self.runtime)
            .finish()
    }
}

/// A validated stage DAG with a synthetic finish stage appended last.
#[derive(Debug)]
pub struct StageGraph {
    nodes: Vec<StageNode>,
    inputs: Vec<Vec<StageIndex>>,
    outputs: Vec<Vec<StageIndex>>,
    by_name: HashMap<String, StageIndex>,
    finish: StageIndex,
    total_weight: f64,
}

impl StageGraph {
    /// Builds the graph for one loading thread.
    ///
    /// Fails on duplicate or reserved names, dependencies on unknown stages,
    /// and dependency cycles.
    pub fn build(
        defs: impl IntoIterator<Item = StageDef>,
        options: GraphOptions,
    ) -> Result<Self, GraphError> {
        let defs: Vec<StageDef> = defs.into_iter().collect();

        let mut by_name = HashMap::with_capacity(defs.len() + 1);
        for (index, def) in defs.iter().enumerate() {
            if def.name == FINISH_STAGE_NAME {
                return Err(GraphError::ReservedName {
                    name: def.name.clone(),
                });
            }
            if by_name.insert(def.name.clone(), index).is_some() {
                return Err(GraphError::DuplicateStage {
                    name: def.name.clone(),
                });
            }
        }

        let mut inputs: Vec<Vec<StageIndex>> = vec![Vec::new(); defs.len()];
        let mut outputs: Vec<Vec<StageIndex>> = vec![Vec::new(); defs.len()];
        for (index, def) in defs.iter().enumerate() {
            for dependency in &def.inputs {
                let parent = *by_name.get(dependency).ok_or_else(|| {
                    GraphError::UnknownDependency {
                        stage: def.name.clone(),
                        dependency: dependency.clone(),
                    }
                })?;
                if inputs[index].contains(&parent) {
                    continue;
                }
                inputs[index].push(parent);
                outputs[parent].push(index);
            }
        }

        let mut nodes: Vec<StageNode> = defs
            .into_iter()
            .map(|def| StageNode::from_def(def, options))
            .collect();

        topological_order(&outputs).map_err(|err| GraphError::Cycle {
            stages: err
                .unresolved
                .iter()
                .map(|&index| nodes[index].name.clone())
                .collect(),
        })?;

        let total_weight = nodes
            .iter()
            .filter(|node| node.counted)
            .map(|node| node.relative_size)
            .sum();

        let targets = finish_targets(&nodes, &outputs, options.wait_for_background);
        let finish = nodes.len();
        for &target in &targets {
            outputs[target].push(finish);
        }
        nodes.push(StageNode::finish_stage());
        inputs.push(targets);
        outputs.push(Vec::new());
        by_name.insert(FINISH_STAGE_NAME.to_string(), finish);

        log::trace!(
            "Built stage graph: {} stages, finish waits on {:?}",
            finish,
            inputs[finish]
                .iter()
                .map(|&index| nodes[index].name.as_str())
                .collect::<Vec<_>>()
        );

        Ok(Self {
            nodes,
            inputs,
            outputs,
            by_name,
            finish,
            total_weight,
        })
    }

    /// Number of nodes, the finish stage included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always `false`: a graph holds at least its finish stage.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Index of the synthetic finish stage.
    pub fn finish_index(&self) -> StageIndex {
        self.finish
    }

    /// Looks a stage up by name.
    pub fn index_of(&self, name: &str) -> Option<StageIndex> {
        self.by_name.get(name).copied()
    }

    /// The node at `index`.
    pub fn node(&self, index: StageIndex) -> &StageNode {
        &self.nodes[index]
    }

    /// The node at `index`, mutably.
    pub fn node_mut(&mut self, index: StageIndex) -> &mut StageNode {
        &mut self.nodes[index]
    }

    /// All nodes in index order.
    pub fn nodes(&self) -> impl Iterator<Item = (StageIndex, &StageNode)> {
        self.nodes.iter().enumerate()
    }

    /// Direct predecessors of `index`.
    pub fn inputs(&self, index: StageIndex) -> &[StageIndex] {
        &self.inputs[index]
    }

    /// Direct successors of `index`.
    pub fn outputs(&self, index: StageIndex) -> &[StageIndex] {
        &self.outputs[index]
    }

    /// Nodes without predecessors.
    pub fn sources(&self) -> Vec<StageIndex> {
        (0..self.nodes.len())
            .filter(|&index| self.inputs[index].is_empty())
            .collect()
    }

    /// Nodes without successors.
    pub fn sinks(&self) -> Vec<StageIndex> {
        (0..self.nodes.len())
            .filter(|&index| self.outputs[index].is_empty())
            .collect()
    }

    /// Whether every predecessor of `index` is finished.
    pub fn inputs_finished(&self, index: StageIndex) -> bool {
        self.inputs[index]
            .iter()
            .all(|&parent| self.nodes[parent].runtime.is_finished)
    }

    /// Whether any stage other than the finish stage is still unfinished.
    pub fn has_outstanding_stages(&self) -> bool {
        self.nodes
            .iter()
            .enumerate()
            .any(|(index, node)| index != self.finish && !node.runtime.is_finished)
    }

    /// Sum of the weights of counted stages.
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Weighted sum of load rates over counted stages.
    pub fn loaded_weight(&self) -> f64 {
        self.nodes
            .iter()
            .filter(|node| node.counted)
            .map(|node| f64::from(node.runtime.load_rate) * node.relative_size)
            .sum()
    }
}

/// Sinks the finish stage depends on.
fn finish_targets(
    nodes: &[StageNode],
    outputs: &[Vec<StageIndex>],
    wait_for_background: bool,
) -> Vec<StageIndex> {
    let mut removed = vec![false; nodes.len()];
    let is_sink =
        |index: StageIndex, removed: &[bool]| outputs[index].iter().all(|&child| removed[child]);

    if !wait_for_background {
        loop {
            let peeled: Vec<StageIndex> = (0..nodes.len())
                .filter(|&index| {
                    !removed[index] && nodes[index].background_loading && is_sink(index, &removed)
                })
                .collect();
            if peeled.is_empty() {
                break;
            }
            for index in peeled {
                removed[index] = true;
            }
        }
    }

    (0..nodes.len())
        .filter(|&index| !removed[index] && is_sink(index, &removed))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &StageContext<'_>) -> Outcome {
        Outcome::Done
    }

    fn names(graph: &StageGraph, indices: &[StageIndex]) -> Vec<String> {
        let mut names: Vec<String> = indices
            .iter()
            .map(|&index| graph.node(index).name().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn finish_stage_is_appended_after_sinks() {
        let graph = StageGraph::build(
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

        assert_eq!(graph.len(), 3);
        let finish = graph.finish_index();
        assert_eq!(graph.node(finish).name(), FINISH_STAGE_NAME);
        assert_eq!(graph.node(finish).priority(), StagePriority::Finish);
        assert_eq!(names(&graph, graph.inputs(finish)), vec!["b"]);
        assert_eq!(names(&graph, &graph.sources()), vec!["a"]);
        assert_eq!(graph.total_weight(), 40.0);
    }

    #[test]
    fn background_sinks_are_peeled_transitively() {
        // a -> b (fg sink), a -> c (bg) -> d (bg sink)
        let defs = vec![
            StageDef::new("a").before(noop),
            StageDef::new("b").with_inputs(["a"]).before(noop),
            StageDef::new("c").with_inputs(["a"]).background().before(noop),
            StageDef::new("d").with_inputs(["c"]).background().before(noop),
        ];
        let graph = StageGraph::build(defs, GraphOptions::default()).unwrap();
        assert_eq!(names(&graph, graph.inputs(graph.finish_index())), vec!["b"]);
    }

    #[test]
    fn peeling_exposes_foreground_parents() {
        // a (fg) -> t (bg sink): a becomes the target.
        let defs = vec![
            StageDef::new("a").before(noop),
            StageDef::new("t").with_inputs(["a"]).background().before(noop),
        ];
        let graph = StageGraph::build(defs, GraphOptions::default()).unwrap();
        assert_eq!(names(&graph, graph.inputs(graph.finish_index())), vec!["a"]);
    }

    #[test]
    fn waiting_for_background_wires_every_sink() {
        let defs = vec![
            StageDef::new("a").before(noop),
            StageDef::new("b").with_inputs(["a"]).before(noop),
            StageDef::new("c").with_inputs(["a"]).background().before(noop),
        ];
        let options = GraphOptions {
            wait_for_background: true,
            ..GraphOptions::default()
        };
        let graph = StageGraph::build(defs, options).unwrap();
        assert_eq!(
            names(&graph, graph.inputs(graph.finish_index())),
            vec!["b", "c"]
        );
    }

    #[test]
    fn skipped_stages_start_finished_and_uncounted() {
        let defs = vec![
            StageDef::new("r")
                .resource()
                .with_relative_size(50.0)
                .loop_tick(noop),
            StageDef::new("p")
                .primary_only()
                .with_relative_size(5.0)
                .before(noop),
            StageDef::new("s").with_relative_size(10.0).before(noop),
        ];
        let options = GraphOptions {
            skip_resources: true,
            is_primary: false,
            ..GraphOptions::default()
        };
        let graph = StageGraph::build(defs, options).unwrap();

        for name in ["r", "p"] {
            let node = graph.node(graph.index_of(name).unwrap());
            assert!(node.runtime().skip, "{name} should be skipped");
            assert!(node.runtime().is_finished);
            assert_eq!(node.runtime().load_rate, 1.0);
            assert!(!node.is_counted());
        }
        assert_eq!(graph.total_weight(), 10.0);
        assert_eq!(graph.loaded_weight(), 0.0);
    }

    #[test]
    fn stages_without_callbacks_are_not_counted() {
        let graph = StageGraph::build(
            vec![StageDef::new("marker").with_relative_size(7.0)],
            GraphOptions::default(),
        )
        .unwrap();
        assert_eq!(graph.total_weight(), 0.0);
    }

    #[test]
    fn empty_stage_set_yields_a_lone_finish_stage() {
        let graph = StageGraph::build(Vec::new(), GraphOptions::default()).unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.sources(), vec![graph.finish_index()]);
    }

    #[test]
    fn configuration_errors_are_reported() {
        let duplicate = StageGraph::build(
            vec![StageDef::new("a"), StageDef::new("a")],
            GraphOptions::default(),
        );
        assert_eq!(
            duplicate.unwrap_err(),
            GraphError::DuplicateStage { name: "a".into() }
        );

        let dangling = StageGraph::build(
            vec![StageDef::new("a").with_inputs(["ghost"])],
            GraphOptions::default(),
        );
        assert_eq!(
            dangling.unwrap_err(),
            GraphError::UnknownDependency {
                stage: "a".into(),
                dependency: "ghost".into()
            }
        );

        let reserved =
            StageGraph::build(vec![StageDef::new(FINISH_STAGE_NAME)], GraphOptions::default());
        assert!(matches!(reserved, Err(GraphError::ReservedName { .. })));
    }

    #[test]
    fn cycles_are_rejected_with_their_members() {
        let defs = vec![
            StageDef::new("root"),
            StageDef::new("x").with_inputs(["root", "y"]),
            StageDef::new("y").with_inputs(["x"]),
        ];
        let err = StageGraph::build(defs, GraphOptions::default()).unwrap_err();
        assert_eq!(
            err,
            GraphError::Cycle {
                stages: vec!["x".into(), "y".into()]
            }
        );
    }

    #[test]
    fn load_rate_only_rises() {
        let mut graph = StageGraph::build(
            vec![StageDef::new("a").loop_tick(noop)],
            GraphOptions::default(),
        )
        .unwrap();
        let node = graph.node_mut(0);
        assert!(node.raise_load_rate(0.5));
        assert!(!node.raise_load_rate(0.25));
        assert!(!node.raise_load_rate(f32::NAN));
        assert_eq!(node.runtime().load_rate, 0.5);
        assert!(node.finish());
        assert!(!node.skip(), "finished stages cannot be skipped");
    }
}

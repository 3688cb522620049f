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

//! Kahn's algorithm over a dense, index-addressed graph.

use std::collections::VecDeque;

use super::StageIndex;

/// The nodes left over when a cycle prevents a full ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError {
    /// Nodes that never reached an in-degree of zero, in index order.
    pub unresolved: Vec<StageIndex>,
}

/// Orders the nodes so that every edge points forward.
///
/// `outputs[i]` lists the successors of node `i`; every index in it must be
/// below `outputs.len()`.
pub fn topological_order(outputs: &[Vec<StageIndex>]) -> Result<Vec<StageIndex>, CycleError> {
    let node_count = outputs.len();

    let mut in_degree = vec![0usize; node_count];
    for children in outputs {
        for &child in children {
            in_degree[child] += 1;
        }
    }

    let mut queue: VecDeque<StageIndex> = (0..node_count)
        .filter(|&index| in_degree[index] == 0)
        .collect();

    let mut order = Vec::with_capacity(node_count);
    while let Some(parent) = queue.pop_front() {
        order.push(parent);
        for &child in &outputs[parent] {
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                queue.push_back(child);
            }
        }
    }

    if order.len() == node_count {
        Ok(order)
    } else {
        let unresolved = (0..node_count)
            .filter(|&index| in_degree[index] > 0)
            .collect();
        Err(CycleError { unresolved })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_a_diamond() {
        // 0 -> 1, 0 -> 2, 1 -> 3, 2 -> 3
        let outputs = vec![vec![1, 2], vec![3], vec![3], vec![]];
        let order = topological_order(&outputs).unwrap();
        let position = |node| order.iter().position(|&n| n == node).unwrap();
        assert_eq!(order.len(), 4);
        assert!(position(0) < position(1));
        assert!(position(0) < position(2));
        assert!(position(1) < position(3));
        assert!(position(2) < position(3));
    }

    #[test]
    fn reports_the_nodes_on_a_cycle() {
        // 0 -> 1 -> 2 -> 1, 3 isolated
        let outputs = vec![vec![1], vec![2], vec![1], vec![]];
        let err = topological_order(&outputs).unwrap_err();
        assert_eq!(err.unresolved, vec![1, 2]);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let outputs = vec![vec![0]];
        assert_eq!(
            topological_order(&outputs),
            Err(CycleError { unresolved: vec![0] })
        );
    }
}

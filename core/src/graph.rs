// Copyright 2024, The Kaspa AIO Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! Dependency graph ordering shared by the catalog loader, the selection
//! validator and the service monitor.

use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Raised when a declared dependency graph is not acyclic. Carries the nodes
/// that participate in (or are downstream of) a cycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Circular dependency involving: {}", .0.join(", "))]
pub struct CircularDependency(pub Vec<String>);

/// Kahn's algorithm over the subgraph induced by `nodes`.
///
/// `deps` maps a node to the set of nodes it depends on; an entry `A -> {B}`
/// means B must be ordered before A. Edges pointing outside `nodes` are
/// ignored so a caller can order a subset of a larger graph. Ties are broken
/// alphabetically so the result is deterministic.
pub fn topological_sort(
    nodes: &BTreeSet<String>,
    deps: &HashMap<String, BTreeSet<String>>,
) -> Result<Vec<String>, CircularDependency> {
    let mut indegree: BTreeMap<&str, usize> = nodes.iter().map(|n| (n.as_str(), 0)).collect();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for node in nodes {
        if let Some(node_deps) = deps.get(node) {
            for dep in node_deps.iter().filter(|d| nodes.contains(*d)) {
                *indegree.get_mut(node.as_str()).unwrap() += 1;
                dependents.entry(dep.as_str()).or_default().push(node.as_str());
            }
        }
    }

    let mut ready: BTreeSet<&str> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(node, _)| *node)
        .collect();
    let mut sorted = Vec::with_capacity(nodes.len());

    while let Some(node) = ready.iter().next().copied() {
        ready.remove(node);
        sorted.push(node.to_string());
        for dependent in dependents.remove(node).unwrap_or_default() {
            let degree = indegree.get_mut(dependent).unwrap();
            *degree -= 1;
            if *degree == 0 {
                ready.insert(dependent);
            }
        }
    }

    if sorted.len() < nodes.len() {
        let remaining = nodes
            .iter()
            .filter(|n| !sorted.contains(n))
            .cloned()
            .collect::<Vec<_>>();
        return Err(CircularDependency(remaining));
    }
    Ok(sorted)
}

#[cfg(test)]
mod test {
    use super::*;

    fn deps_of(pairs: &[(&str, &[&str])]) -> HashMap<String, BTreeSet<String>> {
        pairs
            .iter()
            .map(|(node, deps)| (node.to_string(), deps.iter().map(|d| d.to_string()).collect()))
            .collect()
    }

    fn nodes_of(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn it_orders_dependencies_first() {
        let nodes = nodes_of(&["explorer", "indexer", "node", "db"]);
        let deps = deps_of(&[("explorer", &["indexer"]), ("indexer", &["node", "db"])]);
        let sorted = topological_sort(&nodes, &deps).unwrap();
        let pos = |name: &str| sorted.iter().position(|n| n == name).unwrap();
        assert!(pos("node") < pos("indexer"));
        assert!(pos("db") < pos("indexer"));
        assert!(pos("indexer") < pos("explorer"));
    }

    #[test]
    fn it_is_deterministic_for_unrelated_nodes() {
        let nodes = nodes_of(&["c", "a", "b"]);
        let sorted = topological_sort(&nodes, &HashMap::new()).unwrap();
        assert_eq!(sorted, vec!["a", "b", "c"]);
    }

    #[test]
    fn it_ignores_edges_outside_the_node_set() {
        let nodes = nodes_of(&["indexer"]);
        let deps = deps_of(&[("indexer", &["node"])]);
        let sorted = topological_sort(&nodes, &deps).unwrap();
        assert_eq!(sorted, vec!["indexer"]);
    }

    #[test]
    fn it_detects_a_cycle() {
        let nodes = nodes_of(&["a", "b", "c"]);
        let deps = deps_of(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]);
        let err = topological_sort(&nodes, &deps).unwrap_err();
        assert_eq!(err.0.len(), 3);
    }

    #[test]
    fn an_empty_graph_sorts_to_an_empty_order() {
        assert!(topological_sort(&BTreeSet::new(), &HashMap::new()).unwrap().is_empty());
    }
}

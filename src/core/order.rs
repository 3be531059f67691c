//! Build ordering between parts.
//!
//! Parts are ordered only by explicit `after` edges. Parts with no path
//! between them are independent and land in the same wave; within a wave
//! parts keep declaration order.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;

use crate::core::part::Part;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("part `{part}` is ordered after unknown part `{missing}`")]
    UnknownPart { part: String, missing: String },

    #[error("part `{part}` cannot be ordered after itself")]
    SelfReference { part: String },

    #[error("`after` dependencies form a cycle through part `{part}`")]
    Cycle { part: String },
}

/// Dependency graph over parts; an edge `a -> b` means `b` is after `a`.
#[derive(Debug, Clone)]
pub struct PartGraph {
    graph: DiGraph<String, ()>,
    /// Declaration index of each node.
    order: HashMap<NodeIndex, usize>,
}

impl PartGraph {
    pub fn new<'a, I>(parts: I) -> Result<Self, OrderError>
    where
        I: IntoIterator<Item = &'a Part>,
    {
        let parts: Vec<&Part> = parts.into_iter().collect();
        let mut graph = DiGraph::new();
        let mut by_name = HashMap::new();
        let mut order = HashMap::new();

        for (idx, part) in parts.iter().enumerate() {
            let node = graph.add_node(part.name.clone());
            by_name.insert(part.name.as_str(), node);
            order.insert(node, idx);
        }

        for part in &parts {
            let node = by_name[part.name.as_str()];
            for dep in &part.after {
                if dep == &part.name {
                    return Err(OrderError::SelfReference {
                        part: part.name.clone(),
                    });
                }
                let dep_node = by_name
                    .get(dep.as_str())
                    .copied()
                    .ok_or_else(|| OrderError::UnknownPart {
                        part: part.name.clone(),
                        missing: dep.clone(),
                    })?;
                if !graph.contains_edge(dep_node, node) {
                    graph.add_edge(dep_node, node, ());
                }
            }
        }

        toposort(&graph, None).map_err(|cycle| OrderError::Cycle {
            part: graph[cycle.node_id()].clone(),
        })?;

        Ok(PartGraph { graph, order })
    }

    /// Group parts into waves: every part's dependencies sit in earlier
    /// waves.
    pub fn waves(&self) -> Vec<Vec<String>> {
        let Ok(sorted) = toposort(&self.graph, None) else {
            return Vec::new();
        };

        let mut level: HashMap<NodeIndex, usize> = HashMap::new();
        for node in &sorted {
            let depth = self
                .graph
                .neighbors_directed(*node, petgraph::Direction::Incoming)
                .map(|dep| level.get(&dep).copied().unwrap_or(0) + 1)
                .max()
                .unwrap_or(0);
            level.insert(*node, depth);
        }

        let height = level.values().copied().max().map_or(0, |m| m + 1);
        let mut waves: Vec<Vec<NodeIndex>> = vec![Vec::new(); height];
        for (node, depth) in level {
            waves[depth].push(node);
        }

        waves
            .into_iter()
            .map(|mut wave| {
                wave.sort_by_key(|node| self.order[node]);
                wave.into_iter()
                    .map(|node| self.graph[node].clone())
                    .collect()
            })
            .collect()
    }

    /// Parts that must finish before `part` starts.
    pub fn dependencies(&self, part: &str) -> Vec<String> {
        self.graph
            .node_indices()
            .find(|n| self.graph[*n] == part)
            .map(|node| {
                self.graph
                    .neighbors_directed(node, petgraph::Direction::Incoming)
                    .map(|dep| self.graph[dep].clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

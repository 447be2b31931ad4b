//! Structural statistics over a finished graph.

use std::collections::VecDeque;

use super::{Graph, NodeId};

/// Summary written into the document metadata.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub nodes: usize,
    /// Undirected edges, each counted once.
    pub edges: usize,
    pub components: usize,
    /// Independent cycles, `E - V + C`.
    pub loops: usize,
    pub max_degree: usize,
    /// Nodes with a single neighbour (tube ends).
    pub dead_ends: usize,
}

impl Graph {
    /// Number of distinct neighbours of `id`.
    pub fn degree(&self, id: NodeId) -> Option<usize> {
        let node = self.node(id)?;
        let mut neighbours: Vec<NodeId> = node.edges().to_vec();
        neighbours.sort_unstable();
        neighbours.dedup();
        Some(neighbours.len())
    }

    /// Connected components as lists of ids, each sorted, ordered by smallest id.
    pub fn connected_components(&self) -> Vec<Vec<NodeId>> {
        let count = self.node_count();
        let mut visited = vec![false; count];
        let mut components = Vec::new();

        for start in 0..count {
            if visited[start] {
                continue;
            }
            visited[start] = true;
            let mut component = Vec::new();
            let mut queue = VecDeque::from([start]);

            while let Some(id) = queue.pop_front() {
                component.push(id);
                let Some(node) = self.node(id) else { continue };
                for &next in node.edges() {
                    if next < count && !visited[next] {
                        visited[next] = true;
                        queue.push_back(next);
                    }
                }
            }

            component.sort_unstable();
            components.push(component);
        }

        components
    }

    /// Cycle rank of the graph: how many edges loop closure added beyond a forest.
    pub fn cycle_rank(&self) -> usize {
        let edges = self.unique_edges().len();
        let components = self.connected_components().len();
        (edges + components).saturating_sub(self.node_count())
    }

    pub fn stats(&self) -> GraphStats {
        let edges = self.unique_edges().len();
        let components = self.connected_components().len();
        let degrees: Vec<usize> = self.nodes().filter_map(|n| self.degree(n.id)).collect();

        GraphStats {
            nodes: self.node_count(),
            edges,
            components,
            loops: (edges + components).saturating_sub(self.node_count()),
            max_degree: degrees.iter().copied().max().unwrap_or(0),
            dead_ends: degrees.iter().filter(|&&d| d == 1).count(),
        }
    }
}

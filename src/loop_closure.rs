//! Loop closure: turn the grown tree into a graph with cycles.
//!
//! Every unordered pair of nodes that touch in space but share no edge
//! and no parent/child relation is a candidate. Each candidate is linked
//! independently with the configured probability.

use log::debug;
use rand::Rng;

use crate::config::LoopClosureParams;
use crate::graph::{Graph, GraphError, Node, NodeId};

pub struct LoopClosure<'a> {
    params: &'a LoopClosureParams,
}

impl<'a> LoopClosure<'a> {
    pub fn new(params: &'a LoopClosureParams) -> Self {
        Self { params }
    }

    /// Two nodes are spatially adjacent when their tube sections overlap,
    /// scaled by `reach_factor`.
    pub fn are_adjacent(&self, a: &Node, b: &Node) -> bool {
        a.position.distance(&b.position) <= self.params.reach_factor * (a.radius + b.radius)
    }

    /// Eligible pairs `(a, b)` with `a < b`, computed on the graph as it stands.
    pub fn candidates(&self, graph: &Graph) -> Vec<(NodeId, NodeId)> {
        let nodes: Vec<&Node> = graph.nodes().collect();
        let mut pairs = Vec::new();

        for (i, a) in nodes.iter().enumerate() {
            for b in &nodes[i + 1..] {
                if !are_connected(a, b) && self.are_adjacent(a, b) {
                    pairs.push((a.id.min(b.id), a.id.max(b.id)));
                }
            }
        }

        pairs
    }

    /// Run the pass. Returns the number of edges added.
    pub fn run<R: Rng>(&self, graph: &mut Graph, rng: &mut R) -> Result<usize, GraphError> {
        let candidates = self.candidates(graph);
        let mut added = 0;

        for (a, b) in &candidates {
            if rng.gen_bool(self.params.probability) {
                graph.add_edge(*a, *b)?;
                added += 1;
            }
        }

        debug!(
            "loop closure on graph {}: {} of {} candidate pairs linked",
            graph.index(),
            added,
            candidates.len()
        );
        Ok(added)
    }
}

/// Already linked by an edge or by a parent/child relation.
pub fn are_connected(a: &Node, b: &Node) -> bool {
    a.is_linked_to(b.id) || b.is_linked_to(a.id) || a.parent == Some(b.id) || b.parent == Some(a.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Position;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// Path 0-1-2 bent so that 0 and 2 overlap in space.
    fn bent_path() -> Graph {
        let mut graph = Graph::new("bent", 0);
        graph.spawn(None, Position::ORIGIN, 1.0).unwrap();
        graph.spawn(Some(0), Position::new(1.0, 0.0, 0.0), 1.0).unwrap();
        graph.spawn(Some(1), Position::new(0.5, 0.8, 0.0), 1.0).unwrap();
        graph
    }

    #[test]
    fn test_only_unconnected_adjacent_pair_is_a_candidate() {
        let params = LoopClosureParams::default();
        let closure = LoopClosure::new(&params);
        assert_eq!(closure.candidates(&bent_path()), vec![(0, 2)]);
    }

    #[test]
    fn test_distant_nodes_are_not_candidates() {
        let params = LoopClosureParams::default();
        let closure = LoopClosure::new(&params);
        let graph = crate::graph::tests::path_graph(5.0);
        assert!(closure.candidates(&graph).is_empty());
    }

    #[test]
    fn test_closing_edge_appears_about_half_the_time() {
        let params = LoopClosureParams::default();
        let closure = LoopClosure::new(&params);

        let mut closed = 0;
        for seed in 0..1000 {
            let mut graph = bent_path();
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let added = closure.run(&mut graph, &mut rng).unwrap();
            if graph.node(0).unwrap().is_linked_to(2) {
                assert!(graph.node(2).unwrap().is_linked_to(0));
                assert_eq!(added, 1);
                closed += 1;
            }
        }
        assert!((430..=570).contains(&closed), "closed {} of 1000", closed);
    }

    #[test]
    fn test_probability_one_links_every_candidate_once() {
        let params = LoopClosureParams { probability: 1.0, ..Default::default() };
        let closure = LoopClosure::new(&params);
        let mut graph = bent_path();
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        assert_eq!(closure.run(&mut graph, &mut rng).unwrap(), 1);
        assert_eq!(closure.run(&mut graph, &mut rng).unwrap(), 0);
        assert_eq!(graph.node(0).unwrap().edges(), &[1, 2]);
    }
}

//! Angular growth driven by directional probability fields.
//!
//! The generator is a small state machine:
//!
//! ```text
//! Seeding -> Expanding { frontier, iteration } ... -> Terminated
//! ```
//!
//! Seeding places the root and its first ring of children using Perlin
//! noise alone. Each expanding step takes the node at `frontier` in
//! creation order, builds a field that favours continuing the
//! grandparent -> parent -> node direction, and spawns up to `max_fanout`
//! children one node radius away. After `min_nodes` steps the loop-closure
//! pass runs once and the graph is final.

use log::debug;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::stratify::Stratifier;
use super::{sample_radius, GrowthReport};
use crate::config::GenerationConfig;
use crate::field::{BearingDistribution, DirectionalField};
use crate::graph::{Graph, GraphError, NodeId, Position};
use crate::loop_closure::LoopClosure;
use crate::seeds::GraphSeeds;

/// Where the generator stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrowthState {
    /// Nothing placed yet
    Seeding,
    /// Next step expands the node at creation order `frontier`
    Expanding { frontier: usize, iteration: usize },
    /// Loop closure done, graph is final
    Terminated,
}

pub struct AngularGrowth<'a> {
    config: &'a GenerationConfig,
    field: DirectionalField<'a>,
    stratifier: Stratifier<'a>,
    graph: Graph,
    rng: ChaCha8Rng,
    closure_rng: ChaCha8Rng,
    state: GrowthState,
    iterations: usize,
    stepped_down: usize,
    loops_closed: usize,
}

impl<'a> AngularGrowth<'a> {
    pub fn new(config: &'a GenerationConfig, graph: Graph, seeds: &GraphSeeds) -> Self {
        Self {
            config,
            field: DirectionalField::new(&config.field),
            stratifier: Stratifier::new(&config.stratification, config.generation.dimension),
            graph,
            rng: ChaCha8Rng::seed_from_u64(seeds.growth),
            closure_rng: ChaCha8Rng::seed_from_u64(seeds.loop_closure),
            state: GrowthState::Seeding,
            iterations: 0,
            stepped_down: 0,
            loops_closed: 0,
        }
    }

    pub fn state(&self) -> GrowthState {
        self.state
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Frontier steps taken so far.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Advance by one state transition.
    pub fn step(&mut self) -> Result<GrowthState, GraphError> {
        self.state = match self.state {
            GrowthState::Seeding => {
                self.seed()?;
                GrowthState::Expanding { frontier: 1, iteration: 0 }
            }
            GrowthState::Expanding { iteration, .. } if iteration >= self.config.generation.min_nodes => {
                self.close_loops()?;
                GrowthState::Terminated
            }
            GrowthState::Expanding { frontier, iteration } => {
                // A frontier that outran the graph is pulled back to the newest node.
                let frontier = frontier.min(self.graph.node_count().saturating_sub(1));
                self.expand(frontier)?;
                self.iterations += 1;
                GrowthState::Expanding { frontier: frontier + 1, iteration: iteration + 1 }
            }
            GrowthState::Terminated => GrowthState::Terminated,
        };
        Ok(self.state)
    }

    /// Step until terminated.
    pub fn run(mut self) -> Result<GrowthReport, GraphError> {
        while self.step()? != GrowthState::Terminated {}
        debug!(
            "graph {}: {} nodes after {} frontier steps ({} step-downs, {} loops)",
            self.graph.index(),
            self.graph.node_count(),
            self.iterations,
            self.stepped_down,
            self.loops_closed
        );
        Ok(GrowthReport {
            graph: self.graph,
            iterations: self.iterations,
            stepped_down: self.stepped_down,
            loops_closed: self.loops_closed,
        })
    }

    /// Root at the origin plus its first ring of children, directions from noise alone.
    fn seed(&mut self) -> Result<(), GraphError> {
        let radius = sample_radius(&self.config.growth, &mut self.rng);
        let root = self.graph.spawn(None, Position::ORIGIN, radius)?;

        let field = self.field.perlin_field(&mut self.rng);
        let max_fanout = self.config.growth.max_fanout;
        let count = self.rng.gen_range(max_fanout.min(2)..=max_fanout);
        self.spawn_children(root, &field, count)?;
        self.graph.deactivate(root)
    }

    fn expand(&mut self, frontier: usize) -> Result<(), GraphError> {
        let Some(current) = self.graph.node_at(frontier) else {
            return Ok(());
        };
        let current_id = current.id;
        let current_position = current.position;

        let parent = self.graph.parent_of(current_id);
        let parent_bearing = parent.map(|p| p.position.bearing_to(&current_position));
        let grandparent_bearing = parent.and_then(|p| {
            self.graph
                .parent_of(p.id)
                .map(|g| g.position.bearing_to(&p.position))
        });

        let field = self.field.combine(parent_bearing, grandparent_bearing, &mut self.rng);
        let count = self.rng.gen_range(0..=self.config.growth.max_fanout);
        self.spawn_children(current_id, &field, count)?;
        self.graph.deactivate(current_id)
    }

    /// Spawn `count` children of `parent`, one parent radius away along sampled bearings.
    fn spawn_children(
        &mut self,
        parent: NodeId,
        field: &BearingDistribution,
        count: usize,
    ) -> Result<(), GraphError> {
        let (origin, distance) = match self.graph.node(parent) {
            Some(node) => (node.position, node.radius),
            None => return Err(GraphError::UnknownNode(parent)),
        };

        for _ in 0..count {
            let bearing = field.sample(&mut self.rng) as f64;
            let placement = self.stratifier.place(&origin, bearing, distance, &mut self.rng);
            if placement.stepped_down {
                self.stepped_down += 1;
            }
            let radius = sample_radius(&self.config.growth, &mut self.rng);
            self.graph.spawn(Some(parent), placement.position, radius)?;
        }
        Ok(())
    }

    fn close_loops(&mut self) -> Result<(), GraphError> {
        if self.config.loop_closure.enabled {
            let closure = LoopClosure::new(&self.config.loop_closure);
            self.loops_closed = closure.run(&mut self.graph, &mut self.closure_rng)?;
        }
        Ok(())
    }
}

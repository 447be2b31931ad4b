//! Probabilistic growth on a 2D lattice.
//!
//! The root sits on the centre cell. Each pass visits the nodes that are
//! still active; a node picks a random number of its free 4-connected
//! neighbour cells, favouring cells close to the root, spawns a child in
//! each and is then deactivated. Growth stops once every node is inactive
//! or the pass budget is spent.

use log::{debug, trace};
use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::GrowthReport;
use crate::config::{GenerationConfig, GridParams};
use crate::graph::{Graph, GraphError, NodeId, Position};
use crate::seeds::GraphSeeds;
use crate::tilemap::{manhattan, Tilemap};

type Cell = (usize, usize);

/// Node radius on the lattice: neighbouring cells just touch.
pub fn cell_radius(params: &GridParams) -> f64 {
    params.cell_size / 2.0
}

pub struct GridGrowth<'a> {
    config: &'a GenerationConfig,
    graph: Graph,
    occupancy: Tilemap<Option<NodeId>>,
    /// Cell of every node, indexed by id
    cells: Vec<Cell>,
    root_cell: Cell,
    rng: ChaCha8Rng,
}

impl<'a> GridGrowth<'a> {
    /// Lay out the lattice for `config.generation.size`. Fails with
    /// `GridTooLarge` instead of allocating an oversized grid.
    pub fn new(config: &'a GenerationConfig, graph: Graph, seeds: &GraphSeeds) -> Result<Self, GraphError> {
        let [size_x, size_y, _] = config.generation.size;
        let too_large = || GraphError::GridTooLarge { size_x, size_y, cell_size: config.grid.cell_size };
        let (width, height) = config.grid.dimensions(config.generation.size).ok_or_else(too_large)?;
        let occupancy = Tilemap::new(width, height).ok_or_else(too_large)?;

        Ok(Self {
            config,
            graph,
            occupancy,
            cells: Vec::new(),
            root_cell: (width / 2, height / 2),
            rng: ChaCha8Rng::seed_from_u64(seeds.growth),
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Node occupying `cell`, if any.
    pub fn occupant(&self, cell: Cell) -> Option<NodeId> {
        self.occupancy.get(cell.0, cell.1).copied().flatten()
    }

    /// World position of a cell, with the root cell at the origin.
    pub fn cell_position(&self, cell: Cell) -> Position {
        let size = self.config.grid.cell_size;
        Position::new(
            (cell.0 as f64 - self.root_cell.0 as f64) * size,
            (cell.1 as f64 - self.root_cell.1 as f64) * size,
            0.0,
        )
    }

    /// Put a node on `cell`. Fails if the cell is taken.
    pub fn place_node(&mut self, parent: Option<NodeId>, cell: Cell) -> Result<NodeId, GraphError> {
        if let Some(occupant) = self.occupant(cell) {
            return Err(GraphError::CellOccupied { x: cell.0, y: cell.1, occupant });
        }
        let position = self.cell_position(cell);
        let id = self.graph.spawn(parent, position, cell_radius(&self.config.grid))?;
        self.occupancy.set(cell.0, cell.1, Some(id));
        self.cells.push(cell);
        Ok(id)
    }

    fn free_neighbors(&self, cell: Cell) -> Vec<Cell> {
        self.occupancy
            .neighbors(cell.0, cell.1)
            .into_iter()
            .filter(|&c| self.occupant(c).is_none())
            .collect()
    }

    pub fn run(mut self) -> Result<GrowthReport, GraphError> {
        self.place_node(None, self.root_cell)?;

        let mut passes = 0;
        while passes < self.config.generation.min_nodes && !self.graph.all_inactive() {
            // Nodes created during the pass wait for the next one.
            let existing = self.graph.node_count();
            for id in 0..existing {
                self.expand(id)?;
            }
            passes += 1;
            trace!("grid pass {}: {} nodes", passes, self.graph.node_count());
        }

        debug!(
            "graph {}: {} nodes on a {}x{} grid after {} passes",
            self.graph.index(),
            self.graph.node_count(),
            self.occupancy.width,
            self.occupancy.height,
            passes
        );
        Ok(GrowthReport {
            graph: self.graph,
            iterations: passes,
            stepped_down: 0,
            loops_closed: 0,
        })
    }

    fn expand(&mut self, id: NodeId) -> Result<(), GraphError> {
        if !self.graph.node(id).is_some_and(|n| n.is_active()) {
            return Ok(());
        }
        let mut candidates = self.free_neighbors(self.cells[id]);
        let count = if candidates.is_empty() { 0 } else { self.rng.gen_range(0..candidates.len()) };
        for _ in 0..count {
            let weights: Vec<f64> = candidates
                .iter()
                .map(|&c| 1.0 / manhattan(c, self.root_cell).max(1) as f64)
                .collect();
            let Ok(dist) = WeightedIndex::new(&weights) else {
                break;
            };
            let cell = candidates.swap_remove(dist.sample(&mut self.rng));
            self.place_node(Some(id), cell)?;
        }
        self.graph.deactivate(id)
    }
}

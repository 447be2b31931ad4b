//! Lava-tube skeletons: a sinuous main tube with arcing side branches.
//!
//! The main path advances one unit along x per node and meanders on
//! y (and z in 3D) following phase-shifted sine waves plus Gaussian
//! jitter. Each side branch leaves the main path, swings out laterally and
//! either bends back to rejoin it further down (closing a loop) or ends as
//! a dead-end spur.

use std::f64::consts::{FRAC_PI_2, PI};

use log::{debug, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use super::GrowthReport;
use crate::config::{GenerationConfig, SplineParams};
use crate::graph::{Graph, GraphError, NodeId, Position};
use crate::seeds::GraphSeeds;

/// Phase of the vertical wave relative to the lateral one.
const VERTICAL_PHASE: f64 = 1.2;
/// Branches try to stay this many samples away from either end of the main path.
const BRANCH_MARGIN: usize = 10;
/// Range of the vertical lift applied along a branch arc.
const BRANCH_LIFT: (f64, f64) = (-2.0, 2.5);
/// Per-node and per-branch radius variation.
const RADIUS_JITTER: (f64, f64) = (0.9, 1.1);

pub struct SplineGrowth<'a> {
    params: &'a SplineParams,
    three_d: bool,
    graph: Graph,
    rng: ChaCha8Rng,
}

impl<'a> SplineGrowth<'a> {
    pub fn new(config: &'a GenerationConfig, graph: Graph, seeds: &GraphSeeds) -> Self {
        Self {
            params: &config.spline,
            three_d: config.generation.dimension.is_3d(),
            graph,
            rng: ChaCha8Rng::seed_from_u64(seeds.growth),
        }
    }

    fn tube_radius(&self) -> f64 {
        (self.params.major_radius + self.params.minor_radius) / 2.0
    }

    pub fn run(mut self) -> Result<GrowthReport, GraphError> {
        let main = self.main_path()?;

        let mut rejoined = 0;
        for branch in 0..self.params.branches {
            if self.branch(branch, &main)? {
                rejoined += 1;
            }
        }

        debug!(
            "graph {}: lava tube with {} main nodes, {} total, {} rejoining branches",
            self.graph.index(),
            main.len(),
            self.graph.node_count(),
            rejoined
        );
        Ok(GrowthReport {
            graph: self.graph,
            iterations: main.len(),
            stepped_down: 0,
            loops_closed: rejoined,
        })
    }

    /// Lay out the main tube. Returns its node ids in order.
    fn main_path(&mut self) -> Result<Vec<NodeId>, GraphError> {
        let p = self.params;
        let lateral = noise(p.lateral_jitter);
        let vertical = noise(p.vertical_jitter);
        let base_radius = self.tube_radius();

        let mut ids = Vec::with_capacity(p.length);
        let mut previous = None;
        for i in 0..p.length {
            let t = i as f64;
            let y = p.amplitude * (p.frequency * t).sin() + sample(&lateral, &mut self.rng);
            let z = if self.three_d {
                p.vertical_amplitude * (p.frequency * t + VERTICAL_PHASE).sin()
                    + sample(&vertical, &mut self.rng)
            } else {
                0.0
            };
            let radius = base_radius * self.rng.gen_range(RADIUS_JITTER.0..=RADIUS_JITTER.1);

            let id = self.graph.spawn(previous, Position::new(t, y, z), radius)?;
            ids.push(id);
            previous = Some(id);
        }
        Ok(ids)
    }

    /// Grow one side branch off `main`. Returns whether it rejoined.
    fn branch(&mut self, index: usize, main: &[NodeId]) -> Result<bool, GraphError> {
        let p = self.params;
        let blen = self.rng.gen_range(p.branch_length[0]..=p.branch_length[1]).min(main.len());
        // Both ends sit on the main path, so a branch needs room for at least one node between.
        if blen < 3 {
            warn!("branch {} skipped: main path of {} nodes is too short", index, main.len());
            return Ok(false);
        }

        let slack = main.len() - blen;
        let leave = if slack >= 2 * BRANCH_MARGIN {
            self.rng.gen_range(BRANCH_MARGIN..=slack - BRANCH_MARGIN)
        } else {
            self.rng.gen_range(0..=slack)
        };
        let offset = self.rng.gen_range(p.branch_offset.min..=p.branch_offset.max);
        let lift = if self.three_d {
            self.rng.gen_range(BRANCH_LIFT.0..=BRANCH_LIFT.1)
        } else {
            0.0
        };
        let rejoins = self.rng.gen_bool(p.p_rejoin);
        let radius = self.tube_radius() * self.rng.gen_range(RADIUS_JITTER.0..=RADIUS_JITTER.1);

        let last = blen - 1;
        let mut previous = main[leave];
        for k in 1..last {
            let t = k as f64 / last as f64;
            let arc = if rejoins { (PI * t).sin() } else { (FRAC_PI_2 * t).sin() };
            let anchor = self
                .graph
                .node(main[leave + k])
                .map(|n| n.position)
                .ok_or(GraphError::UnknownNode(main[leave + k]))?;
            let position = Position::new(anchor.x, anchor.y + offset * arc, anchor.z + lift * arc);
            previous = self.graph.spawn(Some(previous), position, radius)?;
        }

        if rejoins {
            self.graph.add_edge(previous, main[leave + last])?;
        }
        Ok(rejoins)
    }
}

fn noise(std_dev: f64) -> Option<Normal<f64>> {
    Normal::new(0.0, std_dev).ok()
}

fn sample<R: Rng>(normal: &Option<Normal<f64>>, rng: &mut R) -> f64 {
    normal.as_ref().map_or(0.0, |n| n.sample(rng))
}

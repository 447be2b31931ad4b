//! Growth algorithms that turn a seed into a cave skeleton.
//!
//! | Algorithm            | Layout           | Loops                      |
//! |----------------------|------------------|----------------------------|
//! | `gaussian_perlin`    | angular, 2D/3D   | loop-closure pass          |
//! | `probabilistic_grid` | 2D lattice       | loop-closure pass          |
//! | `procedural_spline`  | lava-tube spline | branches that rejoin       |

pub mod angular;
pub mod grid;
pub mod spline;
pub mod stratify;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub use angular::{AngularGrowth, GrowthState};
pub use grid::GridGrowth;
pub use spline::SplineGrowth;
pub use stratify::{Placement, Stratifier};

use crate::config::{Algorithm, Dimension, GenerationConfig, GrowthParams};
use crate::graph::{Graph, GraphError};
use crate::loop_closure::LoopClosure;
use crate::seeds::GraphSeeds;

/// A finished skeleton and what happened while growing it.
#[derive(Clone, Debug)]
pub struct GrowthReport {
    pub graph: Graph,
    /// Frontier steps or grid passes, depending on the algorithm
    pub iterations: usize,
    /// Nodes placed one layer below their parent
    pub stepped_down: usize,
    /// Edges added by loop closure or by rejoining branches
    pub loops_closed: usize,
}

/// Grow graph `seeds.index` of a run with the configured algorithm.
pub fn grow(config: &GenerationConfig, name: &str, seeds: &GraphSeeds) -> Result<GrowthReport, GraphError> {
    let graph = Graph::new(name, seeds.index);

    match config.generation.algorithm {
        Algorithm::GaussianPerlin => AngularGrowth::new(config, graph, seeds).run(),
        Algorithm::ProbabilisticGrid => {
            let mut report = GridGrowth::new(config, graph, seeds)?.run()?;
            if config.loop_closure.enabled {
                let mut rng = ChaCha8Rng::seed_from_u64(seeds.loop_closure);
                let closure = LoopClosure::new(&config.loop_closure);
                report.loops_closed = closure.run(&mut report.graph, &mut rng)?;
            }
            Ok(report)
        }
        Algorithm::ProceduralSpline => SplineGrowth::new(config, graph, seeds).run(),
    }
}

/// Node radius drawn uniformly from `[min_radius, max_radius]`.
pub fn sample_radius<R: Rng>(params: &GrowthParams, rng: &mut R) -> f64 {
    if params.max_radius > params.min_radius {
        rng.gen_range(params.min_radius..=params.max_radius)
    } else {
        params.min_radius
    }
}

/// Radius recorded in the document metadata for this configuration.
pub fn nominal_radius(config: &GenerationConfig) -> f64 {
    match config.generation.algorithm {
        Algorithm::GaussianPerlin => config.growth.max_radius,
        Algorithm::ProbabilisticGrid => grid::cell_radius(&config.grid),
        Algorithm::ProceduralSpline => (config.spline.major_radius + config.spline.minor_radius) / 2.0,
    }
}

/// The grid variant only lays out a plane.
pub fn effective_dimension(config: &GenerationConfig) -> Dimension {
    match config.generation.algorithm {
        Algorithm::ProbabilisticGrid => Dimension::TwoD,
        _ => config.generation.dimension,
    }
}

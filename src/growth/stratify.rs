//! Vertical placement of new nodes.
//!
//! In 3D mode a new node either stays near its parent's level with a small
//! Gaussian jitter, or drops one layer to simulate a vertical passage down
//! to a lower gallery. In 2D mode every node stays on the parent's plane.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::config::{Dimension, StratificationParams};
use crate::graph::Position;

/// Where a new node ends up.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub position: Position,
    pub stepped_down: bool,
}

pub struct Stratifier<'a> {
    params: &'a StratificationParams,
    dimension: Dimension,
    jitter: Option<Normal<f64>>,
}

impl<'a> Stratifier<'a> {
    pub fn new(params: &'a StratificationParams, dimension: Dimension) -> Self {
        Self {
            params,
            dimension,
            jitter: Normal::new(params.z_mean, params.z_std_dev).ok(),
        }
    }

    /// Place a node `distance` away from `origin` along `bearing` (degrees).
    ///
    /// Evaluated independently for every node.
    pub fn place<R: Rng>(&self, origin: &Position, bearing: f64, distance: f64, rng: &mut R) -> Placement {
        if !self.dimension.is_3d() {
            return Placement {
                position: origin.offset_polar(distance, bearing),
                stepped_down: false,
            };
        }

        if rng.gen_bool(self.params.step_down_probability) {
            let mut position = origin.offset_polar(distance * self.params.xy_shift, bearing);
            position.z = origin.z - self.params.layer_step;
            Placement { position, stepped_down: true }
        } else {
            let mut position = origin.offset_polar(distance, bearing);
            let dz = match &self.jitter {
                Some(normal) => normal.sample(rng),
                None => self.params.z_mean,
            };
            position.z = origin.z + dz;
            Placement { position, stepped_down: false }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_flat_mode_keeps_the_plane() {
        let params = StratificationParams { step_down_probability: 1.0, ..Default::default() };
        let strat = Stratifier::new(&params, Dimension::TwoD);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let placed = strat.place(&Position::ORIGIN, 90.0, 2.0, &mut rng);
        assert!(!placed.stepped_down);
        assert_eq!(placed.position.z, 0.0);
        assert!((placed.position.y - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_step_down_drops_one_layer_and_widens() {
        let params = StratificationParams { step_down_probability: 1.0, ..Default::default() };
        let strat = Stratifier::new(&params, Dimension::ThreeD);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let origin = Position::new(0.0, 0.0, 10.0);
        let placed = strat.place(&origin, 0.0, 5.0, &mut rng);
        assert!(placed.stepped_down);
        assert_eq!(placed.position.z, 10.0 - params.layer_step);
        assert!((placed.position.x - 5.0 * params.xy_shift).abs() < 1e-9);
    }

    #[test]
    fn test_jitter_stays_close_to_mean() {
        let params = StratificationParams { step_down_probability: 0.0, ..Default::default() };
        let strat = Stratifier::new(&params, Dimension::ThreeD);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..200 {
            let placed = strat.place(&Position::ORIGIN, 45.0, 1.0, &mut rng);
            assert!(!placed.stepped_down);
            // 0.1 standard deviation: ten sigma is far beyond any draw here.
            assert!(placed.position.z.abs() < 1.0);
        }
    }

    #[test]
    fn test_step_down_rate_matches_probability() {
        let params = StratificationParams::default();
        let strat = Stratifier::new(&params, Dimension::ThreeD);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let drops = (0..5000)
            .filter(|_| strat.place(&Position::ORIGIN, 0.0, 1.0, &mut rng).stepped_down)
            .count();
        assert!((350..650).contains(&drops), "{} drops out of 5000", drops);
    }
}

//! Configuration for cave generation.
//!
//! Every parameter of a run lives in one immutable [`GenerationConfig`]
//! that is passed by reference into the generators. It can be loaded
//! from TOML; missing tables and fields fall back to their defaults.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};

/// Timestamp format shared by generation names and document dates.
pub const TIMESTAMP_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";

/// Current local time in [`TIMESTAMP_FORMAT`].
pub fn timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

// =============================================================================
// ENUMERATED SETTINGS
// =============================================================================

/// Whether nodes may leave the z = 0 plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum Dimension {
    #[serde(rename = "2D")]
    #[value(name = "2d")]
    TwoD,
    #[serde(rename = "3D")]
    #[value(name = "3d")]
    ThreeD,
}

impl Dimension {
    pub fn is_3d(self) -> bool {
        self == Dimension::ThreeD
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::TwoD => write!(f, "2D"),
            Dimension::ThreeD => write!(f, "3D"),
        }
    }
}

/// Kind of underground structure recorded in the document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UndergroundType {
    #[serde(rename = "CAVE")]
    Cave,
    #[serde(rename = "MINE")]
    Mine,
    #[serde(rename = "LAVATUBE")]
    LavaTube,
}

/// Growth algorithm used to build a graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum Algorithm {
    /// Angular growth driven by Gaussian and Perlin direction fields
    #[serde(rename = "gaussian_perlin")]
    #[value(name = "gaussian_perlin")]
    GaussianPerlin,
    /// Random walk over a 2D occupancy grid
    #[serde(rename = "probabilistic_grid")]
    #[value(name = "probabilistic_grid")]
    ProbabilisticGrid,
    /// Sinusoidal lava-tube skeleton with side branches
    #[serde(rename = "procedural_spline")]
    #[value(name = "procedural_spline")]
    ProceduralSpline,
}

impl Algorithm {
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::GaussianPerlin => "gaussian_perlin",
            Algorithm::ProbabilisticGrid => "probabilistic_grid",
            Algorithm::ProceduralSpline => "procedural_spline",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// PARAMETER GROUPS
// =============================================================================

/// Inclusive `[min, max]` interval for uniformly sampled parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub min: f64,
    pub max: f64,
}

impl Span {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn is_ordered(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }
}

/// Run-level settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Name of the run, also the output directory name.
    pub name: String,
    /// Number of independent graphs to generate.
    pub count: usize,
    /// Nominal extent of the environment (x, y, z).
    pub size: [f64; 3],
    pub dimension: Dimension,
    pub underground_type: UndergroundType,
    pub algorithm: Algorithm,
    /// Frontier iteration budget of the growth stepper.
    pub min_nodes: usize,
    /// Generate the graphs of a batch on the rayon pool.
    pub parallel: bool,
    pub output_dir: PathBuf,
    /// Master seed. Random when absent.
    pub seed: Option<u64>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            name: format!("Generation_{}", timestamp()),
            count: 1,
            size: [500.0, 100.0, 100.0],
            dimension: Dimension::ThreeD,
            underground_type: UndergroundType::Cave,
            algorithm: Algorithm::GaussianPerlin,
            min_nodes: 50,
            parallel: false,
            output_dir: PathBuf::from("data"),
            seed: None,
        }
    }
}

/// Fan-out and node sizing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthParams {
    /// Maximum children created per expanded node.
    pub max_fanout: usize,
    pub min_radius: f64,
    pub max_radius: f64,
}

impl Default for GrowthParams {
    fn default() -> Self {
        Self {
            max_fanout: 2,
            min_radius: 1.0,
            max_radius: 7.0,
        }
    }
}

/// Weights applied when mixing direction distributions.
///
/// The historical mix averages the parent and grandparent lobes and
/// leaves the Perlin term out, hence `perlin = 0.0` by default.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldWeights {
    pub parent: f64,
    pub grandparent: f64,
    pub perlin: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            parent: 0.5,
            grandparent: 0.5,
            perlin: 0.0,
        }
    }
}

/// Ranges the Perlin field draws its parameters from on every call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerlinRanges {
    pub scale: Span,
    pub octaves: [u32; 2],
    pub persistence: Span,
    pub lacunarity: Span,
}

impl Default for PerlinRanges {
    fn default() -> Self {
        Self {
            scale: Span::new(1.0, 10.0),
            octaves: [1, 4],
            persistence: Span::new(0.1, 5.0),
            lacunarity: Span::new(1.0, 2.0),
        }
    }
}

/// Directional probability field parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldParams {
    /// Standard deviation of the Gaussian lobe, in unit-circle terms.
    pub gaussian_sigma: f64,
    pub weights: FieldWeights,
    pub perlin: PerlinRanges,
}

impl Default for FieldParams {
    fn default() -> Self {
        Self {
            gaussian_sigma: 0.5,
            weights: FieldWeights::default(),
            perlin: PerlinRanges::default(),
        }
    }
}

/// Vertical placement rule used in 3D mode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StratificationParams {
    /// Chance that a new node drops to the layer below.
    pub step_down_probability: f64,
    /// Height of one layer.
    pub layer_step: f64,
    /// Factor applied to the planar offset of a dropping node.
    pub xy_shift: f64,
    pub z_mean: f64,
    pub z_std_dev: f64,
}

impl Default for StratificationParams {
    fn default() -> Self {
        Self {
            step_down_probability: 0.1,
            layer_step: 4.0,
            xy_shift: 1.2,
            z_mean: 0.0,
            z_std_dev: 0.1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopClosureParams {
    pub enabled: bool,
    /// Chance of linking one eligible pair.
    pub probability: f64,
    /// Two nodes are adjacent when closer than `reach_factor * (r_a + r_b)`.
    pub reach_factor: f64,
}

impl Default for LoopClosureParams {
    fn default() -> Self {
        Self {
            enabled: true,
            probability: 0.5,
            reach_factor: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridParams {
    /// World distance between neighbouring grid cells.
    pub cell_size: f64,
}

impl Default for GridParams {
    fn default() -> Self {
        Self { cell_size: 2.0 }
    }
}

/// Largest lattice the grid algorithm will allocate.
pub const MAX_GRID_CELLS: usize = 1 << 24;

impl GridParams {
    /// Cells per axis covering a world of `size`, at least 3 each.
    /// `None` when the lattice would exceed [`MAX_GRID_CELLS`].
    pub fn dimensions(&self, size: [f64; 3]) -> Option<(usize, usize)> {
        let width = self.extent(size[0])?;
        let height = self.extent(size[1])?;
        width
            .checked_mul(height)
            .filter(|&cells| cells <= MAX_GRID_CELLS)
            .map(|_| (width, height))
    }

    fn extent(&self, size: f64) -> Option<usize> {
        let cells = (size / self.cell_size).floor();
        (cells.is_finite() && cells <= MAX_GRID_CELLS as f64).then(|| (cells as usize).max(3))
    }
}

/// Lava-tube skeleton parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplineParams {
    /// Number of samples on the main path.
    pub length: usize,
    /// Lateral sine amplitude of the main path.
    pub amplitude: f64,
    pub frequency: f64,
    pub lateral_jitter: f64,
    pub vertical_amplitude: f64,
    pub vertical_jitter: f64,
    pub branches: usize,
    pub branch_length: [usize; 2],
    pub branch_offset: Span,
    /// Chance that a branch bends back onto the main path.
    pub p_rejoin: f64,
    pub major_radius: f64,
    pub minor_radius: f64,
}

impl Default for SplineParams {
    fn default() -> Self {
        Self {
            length: 100,
            amplitude: 12.0,
            frequency: 0.08,
            lateral_jitter: 0.7,
            vertical_amplitude: 3.5,
            vertical_jitter: 0.5,
            branches: 2,
            branch_length: [18, 36],
            branch_offset: Span::new(6.0, 14.0),
            p_rejoin: 0.7,
            major_radius: 2.4,
            minor_radius: 1.4,
        }
    }
}

/// External mesh tool invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshToolConfig {
    pub enabled: bool,
    /// Tool executable. Looked up on PATH as `blender` when absent.
    pub program: Option<PathBuf>,
    /// Script handed to the tool.
    pub script: PathBuf,
    /// Run without a UI.
    pub background: bool,
}

impl Default for MeshToolConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            program: None,
            script: PathBuf::from("src/blender.py"),
            background: true,
        }
    }
}

// =============================================================================
// TOP LEVEL
// =============================================================================

/// All parameters of a generation run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub generation: GenerationSettings,
    pub growth: GrowthParams,
    pub field: FieldParams,
    pub stratification: StratificationParams,
    pub loop_closure: LoopClosureParams,
    pub grid: GridParams,
    pub spline: SplineParams,
    pub mesh: MeshToolConfig,
}

impl GenerationConfig {
    /// Read and validate a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: GenerationConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check parameter ranges. Called before any generation starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let gen = &self.generation;
        ensure(gen.count > 0, "generation.count must be at least 1")?;
        ensure(!gen.name.trim().is_empty(), "generation.name must not be empty")?;
        ensure(
            gen.size.iter().all(|s| s.is_finite() && *s > 0.0),
            "generation.size entries must be positive and finite",
        )?;

        let growth = &self.growth;
        ensure(
            growth.min_radius > 0.0 && growth.min_radius.is_finite(),
            "growth.min_radius must be positive",
        )?;
        ensure(
            growth.max_radius >= growth.min_radius && growth.max_radius.is_finite(),
            "growth.max_radius must be at least growth.min_radius",
        )?;

        let field = &self.field;
        ensure(field.gaussian_sigma > 0.0, "field.gaussian_sigma must be positive")?;
        let w = field.weights;
        ensure(
            w.parent >= 0.0 && w.grandparent >= 0.0 && w.perlin >= 0.0,
            "field.weights must be non-negative",
        )?;
        ensure(
            w.parent + w.grandparent + w.perlin > 0.0,
            "field.weights must not all be zero",
        )?;
        let perlin = &field.perlin;
        ensure(
            perlin.scale.is_ordered() && perlin.scale.min > 0.0,
            "field.perlin.scale must be a positive ordered range",
        )?;
        ensure(
            perlin.octaves[0] >= 1 && perlin.octaves[0] <= perlin.octaves[1],
            "field.perlin.octaves must be an ordered range starting at 1 or more",
        )?;
        ensure(perlin.persistence.is_ordered(), "field.perlin.persistence must be ordered")?;
        ensure(perlin.lacunarity.is_ordered(), "field.perlin.lacunarity must be ordered")?;

        let strat = &self.stratification;
        ensure(
            is_probability(strat.step_down_probability),
            "stratification.step_down_probability must lie in [0, 1]",
        )?;
        ensure(strat.z_std_dev >= 0.0, "stratification.z_std_dev must be non-negative")?;

        let closure = &self.loop_closure;
        ensure(is_probability(closure.probability), "loop_closure.probability must lie in [0, 1]")?;
        ensure(closure.reach_factor >= 0.0, "loop_closure.reach_factor must be non-negative")?;

        ensure(
            self.grid.cell_size > 0.0 && self.grid.cell_size.is_finite(),
            "grid.cell_size must be positive",
        )?;
        if gen.algorithm == Algorithm::ProbabilisticGrid {
            ensure(
                self.grid.dimensions(gen.size).is_some(),
                "generation.size is too large for grid.cell_size",
            )?;
        }

        let spline = &self.spline;
        ensure(spline.length >= 2, "spline.length must be at least 2")?;
        ensure(
            spline.branch_length[0] >= 2 && spline.branch_length[0] <= spline.branch_length[1],
            "spline.branch_length must be an ordered range starting at 2 or more",
        )?;
        ensure(spline.branch_offset.is_ordered(), "spline.branch_offset must be ordered")?;
        ensure(is_probability(spline.p_rejoin), "spline.p_rejoin must lie in [0, 1]")?;
        ensure(
            spline.major_radius > 0.0 && spline.minor_radius > 0.0,
            "spline radii must be positive",
        )?;

        Ok(())
    }
}

fn ensure(condition: bool, message: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::Invalid(message.to_string()))
    }
}

fn is_probability(p: f64) -> bool {
    (0.0..=1.0).contains(&p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GenerationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.generation.min_nodes, 50);
        assert_eq!(config.generation.size, [500.0, 100.0, 100.0]);
        assert_eq!(config.growth.max_fanout, 2);
        assert_eq!(config.growth.max_radius, 7.0);
        assert_eq!(config.field.weights.perlin, 0.0);
        assert!(config.generation.name.starts_with("Generation_"));
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config = GenerationConfig::from_toml_str(
            r#"
            [generation]
            name = "tubes"
            algorithm = "probabilistic_grid"
            dimension = "2D"

            [field.weights]
            perlin = 1.0
            "#,
        )
        .unwrap();

        assert_eq!(config.generation.name, "tubes");
        assert_eq!(config.generation.algorithm, Algorithm::ProbabilisticGrid);
        assert_eq!(config.generation.dimension, Dimension::TwoD);
        assert_eq!(config.generation.count, 1);
        assert_eq!(config.field.weights.parent, 0.5);
        assert_eq!(config.field.weights.perlin, 1.0);
        assert_eq!(config.growth, GrowthParams::default());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = GenerationConfig::default();
        config.growth.min_radius = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = GenerationConfig::default();
        config.field.weights = FieldWeights { parent: 0.0, grandparent: 0.0, perlin: 0.0 };
        assert!(config.validate().is_err());

        let mut config = GenerationConfig::default();
        config.loop_closure.probability = 1.5;
        assert!(config.validate().is_err());

        let mut config = GenerationConfig::default();
        config.field.perlin.octaves = [0, 2];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_size_must_be_positive_and_finite() {
        for size in [[0.0, 100.0, 100.0], [500.0, -1.0, 100.0], [500.0, 100.0, f64::NAN], [f64::INFINITY, 1.0, 1.0]] {
            let mut config = GenerationConfig::default();
            config.generation.size = size;
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "size {:?} accepted",
                size
            );
        }
    }

    #[test]
    fn test_oversized_grid_is_rejected() {
        let mut config = GenerationConfig::default();
        config.generation.size = [1e12, 1e12, 100.0];
        assert!(config.validate().is_ok());

        config.generation.algorithm = Algorithm::ProbabilisticGrid;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.generation.size = [500.0, 100.0, 100.0];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_grid_dimensions() {
        let grid = GridParams { cell_size: 2.0 };
        assert_eq!(grid.dimensions([1.0, 100.0, 0.0]), Some((3, 50)));
        assert_eq!(grid.dimensions([1e12, 1e12, 0.0]), None);
        assert_eq!(grid.dimensions([1e12, 2.0, 0.0]), None);
        assert_eq!(grid.dimensions([f64::NAN, 2.0, 0.0]), None);
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        let err = GenerationConfig::from_toml_str("[generation\nname = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let err = GenerationConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_enum_display_matches_document_values() {
        assert_eq!(Dimension::ThreeD.to_string(), "3D");
        assert_eq!(Algorithm::ProceduralSpline.to_string(), "procedural_spline");
    }
}

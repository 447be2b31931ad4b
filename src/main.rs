use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};

use cave_generator::batch::{self, Generator};
use cave_generator::config::{Algorithm, Dimension, GenerationConfig};
use cave_generator::error::GenerationError;
use cave_generator::mesh::MeshTool;

#[derive(Parser, Debug)]
#[command(name = "cave_generator")]
#[command(about = "Generate procedural cave and lava-tube graphs")]
struct Args {
    /// Name of the generation run (also its output directory)
    #[arg(short, long)]
    name: Option<String>,

    /// Existing graph to regenerate the mesh from (file, graph directory or run directory)
    #[arg(short, long)]
    graph: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Master seed (uses random seed if not specified)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Number of graphs to generate
    #[arg(long)]
    count: Option<usize>,

    /// Growth iteration budget per graph
    #[arg(long)]
    nodes: Option<usize>,

    /// Growth algorithm
    #[arg(long, value_enum)]
    algorithm: Option<Algorithm>,

    /// 2d keeps every node on the z = 0 plane
    #[arg(long, value_enum)]
    dimension: Option<Dimension>,

    /// Generate the graphs of a batch in parallel
    #[arg(long)]
    parallel: bool,

    /// Build a mesh for every saved graph with the external tool
    #[arg(long)]
    mesh: bool,

    /// Output directory for generated runs
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl Args {
    fn apply(&self, config: &mut GenerationConfig) {
        let gen = &mut config.generation;
        if let Some(name) = &self.name {
            gen.name = name.clone();
        }
        if let Some(seed) = self.seed {
            gen.seed = Some(seed);
        }
        if let Some(count) = self.count {
            gen.count = count;
        }
        if let Some(nodes) = self.nodes {
            gen.min_nodes = nodes;
        }
        if let Some(algorithm) = self.algorithm {
            gen.algorithm = algorithm;
        }
        if let Some(dimension) = self.dimension {
            gen.dimension = dimension;
        }
        if let Some(output) = &self.output {
            gen.output_dir = output.clone();
        }
        gen.parallel |= self.parallel;
        config.mesh.enabled |= self.mesh;
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), GenerationError> {
    let mut config = match &args.config {
        Some(path) => {
            info!("loading configuration from {}", path.display());
            GenerationConfig::load(path)?
        }
        None => GenerationConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    if let Some(path) = &args.graph {
        return regenerate(&config, path);
    }

    let generator = Generator::new(&config);
    let results = generator.run();
    let total = results.len();
    let saved: Vec<(usize, PathBuf)> = results
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .map(|summary| (summary.index, summary.dir.clone()))
        .collect();
    info!(
        "{} of {} graph(s) saved under {} (seed {})",
        saved.len(),
        total,
        generator.run_dir().display(),
        generator.seeds().master
    );

    if config.mesh.enabled && !saved.is_empty() {
        match MeshTool::from_config(&config.mesh) {
            Ok(tool) => {
                let failures = batch::mesh_graphs(&tool, &config.generation.name, &saved);
                if failures > 0 {
                    warn!("{} mesh run(s) failed; graphs are kept", failures);
                }
            }
            Err(e) => warn!("skipping mesh stage: {}", e),
        }
    }

    let failed = total - saved.len();
    if failed > 0 {
        return Err(GenerationError::Batch { failed, total });
    }
    Ok(())
}

fn regenerate(config: &GenerationConfig, path: &Path) -> Result<(), GenerationError> {
    let tool = MeshTool::from_config(&config.mesh)?;
    let regen = batch::regenerate(path, &config.generation.output_dir, &tool)?;
    info!(
        "regenerated {} graph(s) as {} ({} mesh failure(s))",
        regen.graphs.len(),
        regen.name,
        regen.mesh_failures
    );
    Ok(())
}

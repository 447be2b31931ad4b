//! Multi-graph runs and regeneration from saved graphs.
//!
//! A run produces `count` independent graphs. Each one is grown, cleaned
//! up, stamped with metadata and saved to `<output_dir>/<name>/<index>/`
//! before anything else touches it. Graphs share nothing, so the batch can
//! run on the rayon pool; results always come back in index order and a
//! failing graph does not stop the others.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, error, info, log_enabled, trace, warn, Level};
use rayon::prelude::*;

use crate::config::{timestamp, Algorithm, GenerationConfig};
use crate::error::GenerationError;
use crate::graph::document::DOCUMENT_FILE;
use crate::graph::{Graph, GraphMetadata, GraphStats};
use crate::growth::{self, effective_dimension, nominal_radius, GrowthReport};
use crate::mesh::MeshTool;
use crate::seeds::RunSeeds;

/// Outcome of one saved graph.
#[derive(Clone, Debug)]
pub struct GraphSummary {
    pub index: usize,
    /// Directory holding the graph's `data.json`
    pub dir: PathBuf,
    pub stats: GraphStats,
    pub duration: Duration,
}

pub struct Generator<'a> {
    config: &'a GenerationConfig,
    seeds: RunSeeds,
}

impl<'a> Generator<'a> {
    pub fn new(config: &'a GenerationConfig) -> Self {
        Self {
            config,
            seeds: RunSeeds::from_option(config.generation.seed),
        }
    }

    pub fn seeds(&self) -> RunSeeds {
        self.seeds
    }

    pub fn run_dir(&self) -> PathBuf {
        self.config.generation.output_dir.join(&self.config.generation.name)
    }

    pub fn graph_dir(&self, index: usize) -> PathBuf {
        self.run_dir().join(index.to_string())
    }

    /// Grow, post-process and stamp graph `index`. Nothing is written.
    pub fn generate_graph(&self, index: usize) -> Result<Graph, GenerationError> {
        let started = Instant::now();
        let seeds = self.seeds.for_graph(index);
        debug!("graph {}: {}", index, seeds);

        let report = growth::grow(self.config, &self.config.generation.name, &seeds)?;
        let GrowthReport { mut graph, iterations, stepped_down, loops_closed } = report;
        debug!(
            "graph {}: grown in {} iterations, {} step-downs, {} extra edges",
            index, iterations, stepped_down, loops_closed
        );

        post_process(&mut graph);

        let stats = graph.stats();
        let metadata = self.metadata(&graph, index, &stats, started.elapsed());
        graph.attach_metadata(metadata)?;
        Ok(graph)
    }

    /// Generate graph `index` and save it under its own directory.
    pub fn generate_and_save(&self, index: usize) -> Result<GraphSummary, GenerationError> {
        info!("== graph {} of {} ==", index, self.config.generation.name);
        let started = Instant::now();

        let graph = self.generate_graph(index)?;
        let dir = self.graph_dir(index);
        let path = graph.save(&dir)?;

        let summary = GraphSummary {
            index,
            dir,
            stats: graph.stats(),
            duration: started.elapsed(),
        };
        info!(
            "== graph {} done: {} nodes, {} edges, {} loops in {:.2}s -> {} ==",
            index,
            summary.stats.nodes,
            summary.stats.edges,
            summary.stats.loops,
            summary.duration.as_secs_f64(),
            path.display()
        );
        Ok(summary)
    }

    /// Generate every graph of the run. Results are in index order.
    pub fn run(&self) -> Vec<Result<GraphSummary, GenerationError>> {
        let count = self.config.generation.count;
        info!(
            "generating {} graph(s) named {} with {} (seed {})",
            count, self.config.generation.name, self.config.generation.algorithm, self.seeds.master
        );

        let results: Vec<_> = if self.config.generation.parallel {
            (0..count).into_par_iter().map(|index| self.generate_and_save(index)).collect()
        } else {
            (0..count).map(|index| self.generate_and_save(index)).collect()
        };

        for (index, result) in results.iter().enumerate() {
            if let Err(e) = result {
                error!("graph {} failed: {}", index, e);
            }
        }
        results
    }

    fn metadata(&self, graph: &Graph, index: usize, stats: &GraphStats, elapsed: Duration) -> GraphMetadata {
        let gen = &self.config.generation;
        GraphMetadata {
            generation_name: gen.name.clone(),
            date: timestamp(),
            generation_size: gen.size,
            generation_dimension: effective_dimension(self.config),
            generation_type: gen.underground_type,
            selected_algorithm: gen.algorithm.name().to_string(),
            nodes_number: graph.node_count(),
            nodes_radius: nominal_radius(self.config),
            generation_index: index,
            seed: Some(self.seeds.master),
            edges_number: stats.edges,
            loops: stats.loops,
            components: stats.components,
            deactivated_number: graph.deactivated_count(),
            generation_duration_s: elapsed.as_secs_f64(),
            field: (gen.algorithm == Algorithm::GaussianPerlin).then(|| self.config.field.clone()),
        }
    }
}

/// Clean a grown graph before it is persisted.
pub fn post_process(graph: &mut Graph) {
    let removed = graph.dedup_edges();
    if removed > 0 {
        debug!("graph {}: removed {} duplicate edge entries", graph.index(), removed);
    }

    if log_enabled!(Level::Trace) {
        for (id, row) in graph.create_adjacency_matrix(graph.node_count()).iter().enumerate() {
            let line: String = row.iter().map(|&cell| if cell > 0 { '1' } else { '.' }).collect();
            trace!("{:>5} {}", id, line);
        }
    }
}

/// Saved graphs found under a path, as `(index, directory)` pairs.
///
/// `path` may be a `data.json` file, a directory holding one, or a run
/// directory with one numbered subdirectory per graph. Relative paths that
/// do not exist as given are also tried under `output_dir`.
pub fn discover_graphs(path: &Path, output_dir: &Path) -> Result<Vec<(usize, PathBuf)>, GenerationError> {
    let root = [path.to_path_buf(), output_dir.join(path)]
        .into_iter()
        .find(|candidate| candidate.exists())
        .ok_or_else(|| GenerationError::GraphNotFound(path.to_path_buf()))?;

    if root.is_file() {
        let dir = root.parent().map(Path::to_path_buf).unwrap_or_default();
        return Ok(vec![(0, dir)]);
    }
    if root.join(DOCUMENT_FILE).is_file() {
        return Ok(vec![(0, root)]);
    }

    let entries = fs::read_dir(&root).map_err(|_| GenerationError::GraphNotFound(root.clone()))?;
    let mut graphs: Vec<(usize, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let index: usize = entry.file_name().to_str()?.parse().ok()?;
            let dir = entry.path();
            dir.join(DOCUMENT_FILE).is_file().then_some((index, dir))
        })
        .collect();
    graphs.sort_by_key(|(index, _)| *index);

    if graphs.is_empty() {
        return Err(GenerationError::GraphNotFound(root));
    }
    Ok(graphs)
}

/// Run name used when regenerating from `path`.
pub fn regeneration_name(path: &Path) -> String {
    let base = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| name != DOCUMENT_FILE)
        .or_else(|| {
            path.parent()
                .and_then(Path::file_name)
                .map(|name| name.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "graph".to_string());
    format!("{}_regen_{}", base, timestamp())
}

/// Result of a regeneration.
#[derive(Clone, Debug)]
pub struct Regeneration {
    pub name: String,
    pub graphs: Vec<(usize, PathBuf)>,
    pub mesh_failures: usize,
}

/// Re-run the mesh stage on saved graphs without growing anything.
///
/// Every graph is loaded and validated before the first tool run, so a
/// broken document aborts the whole regeneration up front.
pub fn regenerate(path: &Path, output_dir: &Path, tool: &MeshTool) -> Result<Regeneration, GenerationError> {
    let graphs = discover_graphs(path, output_dir)?;
    for (index, dir) in &graphs {
        let graph = Graph::load(dir)?;
        debug!("graph {} at {} loaded: {} nodes", index, dir.display(), graph.node_count());
    }

    let name = regeneration_name(path);
    info!("regenerating {} graph(s) from {} as {}", graphs.len(), path.display(), name);
    let mesh_failures = mesh_graphs(tool, &name, &graphs);

    Ok(Regeneration { name, graphs, mesh_failures })
}

/// Run the mesh tool once per saved graph. Returns how many runs failed.
pub fn mesh_graphs(tool: &MeshTool, name: &str, graphs: &[(usize, PathBuf)]) -> usize {
    let mut failures = 0;
    for (index, dir) in graphs {
        match tool.run(dir, *index, name) {
            Ok(report) => info!("mesh for graph {} done in {:.2}s", index, report.duration.as_secs_f64()),
            Err(e) => {
                // The graph is already on disk; only the mesh is missing.
                warn!("graph {} kept at {} without a mesh", index, dir.display());
                error!("mesh for graph {} failed: {}", index, e);
                failures += 1;
            }
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Dimension;

    fn config(output: &Path, count: usize) -> GenerationConfig {
        let mut config = GenerationConfig::default();
        config.generation.name = "batch_test".to_string();
        config.generation.count = count;
        config.generation.min_nodes = 15;
        config.generation.output_dir = output.to_path_buf();
        config.generation.seed = Some(42);
        config
    }

    #[test]
    fn test_graph_is_saved_under_run_and_index() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path(), 1);
        let generator = Generator::new(&config);

        let summary = generator.generate_and_save(0).unwrap();
        assert_eq!(summary.dir, tmp.path().join("batch_test").join("0"));

        let loaded = Graph::load(&summary.dir).unwrap();
        let meta = loaded.metadata().unwrap();
        assert_eq!(meta.generation_name, "batch_test");
        assert_eq!(meta.nodes_number, loaded.node_count());
        assert_eq!(meta.selected_algorithm, "gaussian_perlin");
        assert_eq!(meta.seed, Some(42));
        assert_eq!(meta.edges_number, summary.stats.edges);
        assert!(meta.field.is_some());
    }

    #[test]
    fn test_saved_coordinates_and_radii_are_bit_exact() {
        let tmp = tempfile::tempdir().unwrap();
        let algorithms = [Algorithm::GaussianPerlin, Algorithm::ProbabilisticGrid, Algorithm::ProceduralSpline];
        for (seed, algorithm) in (0..12).zip(algorithms.into_iter().cycle()) {
            let mut config = config(tmp.path(), 1);
            config.generation.min_nodes = 50;
            config.generation.seed = Some(seed);
            config.generation.algorithm = algorithm;
            let generator = Generator::new(&config);

            let generated = generator.generate_graph(0).unwrap();
            let summary = generator.generate_and_save(0).unwrap();
            let loaded = Graph::load(&summary.dir).unwrap();

            assert_eq!(loaded.node_count(), generated.node_count());
            for (a, b) in generated.nodes().zip(loaded.nodes()) {
                assert_eq!(a.position.x.to_bits(), b.position.x.to_bits(), "seed {} node {} x", seed, a.id);
                assert_eq!(a.position.y.to_bits(), b.position.y.to_bits(), "seed {} node {} y", seed, a.id);
                assert_eq!(a.position.z.to_bits(), b.position.z.to_bits(), "seed {} node {} z", seed, a.id);
                assert_eq!(a.radius.to_bits(), b.radius.to_bits(), "seed {} node {} radius", seed, a.id);
            }
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let seq_dir = tempfile::tempdir().unwrap();
        let par_dir = tempfile::tempdir().unwrap();
        let sequential = config(seq_dir.path(), 4);
        let mut parallel = config(par_dir.path(), 4);
        parallel.generation.parallel = true;

        let a = Generator::new(&sequential).run();
        let b = Generator::new(&parallel).run();
        assert_eq!(a.len(), 4);
        for (index, (x, y)) in a.iter().zip(&b).enumerate() {
            let (x, y) = (x.as_ref().unwrap(), y.as_ref().unwrap());
            assert_eq!(x.index, index);
            assert_eq!(y.index, index);
            assert_eq!(x.stats, y.stats);
        }
    }

    #[test]
    fn test_graphs_of_a_run_differ() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path(), 2);
        let generator = Generator::new(&config);
        let first = generator.generate_graph(0).unwrap();
        let second = generator.generate_graph(1).unwrap();
        let positions = |g: &Graph| g.nodes().map(|n| (n.position.x, n.position.y)).collect::<Vec<_>>();
        assert_ne!(positions(&first), positions(&second));
    }

    #[test]
    fn test_grid_metadata_is_flat_without_field_echo() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config(tmp.path(), 1);
        config.generation.algorithm = Algorithm::ProbabilisticGrid;
        let graph = Generator::new(&config).generate_graph(0).unwrap();
        let meta = graph.metadata().unwrap();
        assert_eq!(meta.generation_dimension, Dimension::TwoD);
        assert_eq!(meta.selected_algorithm, "probabilistic_grid");
        assert!(meta.field.is_none());
    }

    #[test]
    fn test_discover_accepts_file_dir_and_run() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path(), 3);
        let generator = Generator::new(&config);
        for result in generator.run() {
            result.unwrap();
        }

        let run = generator.run_dir();
        let found = discover_graphs(&run, tmp.path()).unwrap();
        assert_eq!(found.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1, 2]);

        let single = discover_graphs(&generator.graph_dir(1), tmp.path()).unwrap();
        assert_eq!(single, vec![(0, generator.graph_dir(1))]);

        let file = generator.graph_dir(2).join(DOCUMENT_FILE);
        assert_eq!(discover_graphs(&file, tmp.path()).unwrap(), vec![(0, generator.graph_dir(2))]);

        // Relative run name resolved under the output directory.
        let by_name = discover_graphs(Path::new("batch_test"), tmp.path()).unwrap();
        assert_eq!(by_name.len(), 3);
    }

    #[test]
    fn test_missing_graph_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let err = discover_graphs(Path::new("nope"), tmp.path()).unwrap_err();
        assert!(matches!(err, GenerationError::GraphNotFound(_)));

        let empty = tmp.path().join("empty");
        fs::create_dir_all(&empty).unwrap();
        assert!(matches!(
            discover_graphs(&empty, tmp.path()),
            Err(GenerationError::GraphNotFound(_))
        ));
    }

    #[test]
    fn test_regeneration_name() {
        let name = regeneration_name(Path::new("data/caves"));
        assert!(name.starts_with("caves_regen_"));
        let from_file = regeneration_name(Path::new("data/caves/0/data.json"));
        assert!(from_file.starts_with("0_regen_"));
    }

    #[test]
    fn test_regenerate_rejects_broken_document() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("broken");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(DOCUMENT_FILE), "{ not json").unwrap();

        let tool = MeshTool::new("/nonexistent/mesh-tool-binary", "unused.py", true);
        let err = regenerate(&dir, tmp.path(), &tool).unwrap_err();
        assert!(matches!(err, GenerationError::Document(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_regenerate_meshes_every_saved_graph() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path(), 2);
        let generator = Generator::new(&config);
        for result in generator.run() {
            result.unwrap();
        }

        let tool = MeshTool::new("true", "unused.py", true);
        let regen = regenerate(&generator.run_dir(), tmp.path(), &tool).unwrap();
        assert_eq!(regen.graphs.len(), 2);
        assert_eq!(regen.mesh_failures, 0);
        assert!(regen.name.starts_with("batch_test_regen_"));

        let failing = MeshTool::new("false", "unused.py", true);
        let regen = regenerate(&generator.run_dir(), tmp.path(), &failing).unwrap();
        assert_eq!(regen.mesh_failures, 2);
        // Saved graphs survive a failed mesh run.
        assert!(Graph::load(generator.graph_dir(0)).is_ok());
    }
}

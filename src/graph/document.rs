//! Persisted JSON form of a graph.
//!
//! The document is the only state that leaves the generator: the mesh and
//! display tools read it, and `-g` regeneration reads it back. Conversion
//! goes through explicit DTOs so the on-disk schema never follows the
//! in-memory layout by accident.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{Graph, GraphError, NodeId, Position};
use crate::config::{Dimension, FieldParams, UndergroundType};

/// File name of a saved graph inside its directory.
pub const DOCUMENT_FILE: &str = "data.json";

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("graph document {0} not found")]
    NotFound(PathBuf),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid graph document: {0}")]
    Invalid(String),

    #[error("graph {0} has no metadata attached")]
    MissingMetadata(String),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Whole-graph metadata, written once when the run finishes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphMetadata {
    pub generation_name: String,
    pub date: String,
    pub generation_size: [f64; 3],
    pub generation_dimension: Dimension,
    pub generation_type: UndergroundType,
    pub selected_algorithm: String,
    pub nodes_number: usize,
    /// Largest radius the configuration allowed.
    pub nodes_radius: f64,

    // Free-form run information. Optional so documents from other tools load.
    #[serde(default)]
    pub generation_index: usize,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub edges_number: usize,
    #[serde(default)]
    pub loops: usize,
    #[serde(default)]
    pub components: usize,
    #[serde(default)]
    pub deactivated_number: usize,
    #[serde(default)]
    pub generation_duration_s: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<FieldParams>,
}

/// One node as written to disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeDocument {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub edges: Vec<NodeId>,
    pub coordinates: Position,
    pub radius: f64,
    pub active: bool,
}

/// The persisted graph: metadata fields at top level plus the node table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(flatten)]
    pub metadata: GraphMetadata,
    /// Keyed on disk by the stringified id, stored here in id order.
    #[serde(serialize_with = "serialize_nodes", deserialize_with = "deserialize_nodes")]
    pub nodes: Vec<NodeDocument>,
}

fn serialize_nodes<S: Serializer>(nodes: &[NodeDocument], serializer: S) -> Result<S::Ok, S::Error> {
    use serde::ser::SerializeMap;
    let mut map = serializer.serialize_map(Some(nodes.len()))?;
    for node in nodes {
        map.serialize_entry(&node.id.to_string(), node)?;
    }
    map.end()
}

fn deserialize_nodes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<NodeDocument>, D::Error> {
    use serde::de::Error;
    let table: BTreeMap<String, NodeDocument> = BTreeMap::deserialize(deserializer)?;
    let mut nodes = Vec::with_capacity(table.len());
    for (key, node) in table {
        let id: NodeId = key
            .parse()
            .map_err(|_| D::Error::custom(format!("node key {key:?} is not an integer")))?;
        if id != node.id {
            return Err(D::Error::custom(format!("node key {key} holds node {}", node.id)));
        }
        nodes.push(node);
    }
    nodes.sort_by_key(|node| node.id);
    Ok(nodes)
}

impl Graph {
    /// Build the persisted form. Edge lists are deduplicated on the way out.
    pub fn to_document(&self) -> Result<GraphDocument, DocumentError> {
        let metadata = self
            .metadata()
            .cloned()
            .ok_or_else(|| DocumentError::MissingMetadata(self.name().to_string()))?;

        let nodes = self
            .nodes()
            .map(|node| {
                let mut edges = Vec::with_capacity(node.edges().len());
                for &e in node.edges() {
                    if !edges.contains(&e) {
                        edges.push(e);
                    }
                }
                NodeDocument {
                    id: node.id,
                    parent: node.parent,
                    edges,
                    coordinates: node.position,
                    radius: node.radius,
                    active: node.is_active(),
                }
            })
            .collect();

        Ok(GraphDocument { metadata, nodes })
    }

    /// Rebuild a graph from a document, checking the schema invariants.
    pub fn from_document(document: GraphDocument) -> Result<Graph, DocumentError> {
        let GraphDocument { metadata, nodes } = document;

        for (expected, node) in nodes.iter().enumerate() {
            if node.id != expected {
                return Err(DocumentError::Invalid(format!(
                    "node ids are not contiguous: expected {expected}, found {}",
                    node.id
                )));
            }
        }
        if metadata.nodes_number != nodes.len() {
            return Err(DocumentError::Invalid(format!(
                "nodes_number is {} but {} nodes are present",
                metadata.nodes_number,
                nodes.len()
            )));
        }

        let mut graph = Graph::new(metadata.generation_name.clone(), metadata.generation_index);
        for node in &nodes {
            graph.add_node(node.id, None, &[], node.coordinates, node.radius, node.active)?;
        }

        let count = nodes.len();
        if count == 0 {
            return Err(DocumentError::Invalid("document has no root node".to_string()));
        }
        // Node 0 is the single root; every other node hangs off another node.
        for node in &nodes {
            match node.parent {
                None if node.id != 0 => {
                    return Err(DocumentError::Invalid(format!(
                        "node {} has no parent but node 0 is the root",
                        node.id
                    )));
                }
                None => {}
                Some(_) if node.id == 0 => {
                    return Err(DocumentError::Invalid("root node 0 has a parent".to_string()));
                }
                Some(parent) if parent == node.id => {
                    return Err(DocumentError::Invalid(format!("node {parent} is its own parent")));
                }
                Some(parent) if parent >= count => {
                    return Err(DocumentError::Invalid(format!(
                        "node {} has unknown parent {parent}",
                        node.id
                    )));
                }
                Some(parent) => {
                    if let Some(slot) = graph.node_mut(node.id) {
                        slot.parent = Some(parent);
                    }
                }
            }
            for &e in &node.edges {
                if e == node.id {
                    return Err(DocumentError::Invalid(format!("node {e} has an edge to itself")));
                }
                if e >= count {
                    return Err(DocumentError::Invalid(format!(
                        "node {} has an edge to unknown node {e}",
                        node.id
                    )));
                }
            }
        }

        // One symmetric insertion per undirected pair keeps the lists duplicate-free
        // even when the file only recorded one direction.
        let mut pairs: Vec<(NodeId, NodeId)> = nodes
            .iter()
            .flat_map(|node| node.edges.iter().map(move |&e| (node.id.min(e), node.id.max(e))))
            .collect();
        pairs.sort_unstable();
        pairs.dedup();
        for (a, b) in pairs {
            graph.add_edge(a, b)?;
        }

        graph.attach_metadata(metadata)?;
        Ok(graph)
    }

    /// Write `<dir>/data.json`, creating `dir` first. Returns the file path.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf, DocumentError> {
        let dir = dir.as_ref();
        let document = self.to_document()?;

        fs::create_dir_all(dir).map_err(|source| DocumentError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(DOCUMENT_FILE);
        let file = File::create(&path).map_err(|source| DocumentError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::to_writer_pretty(BufWriter::new(file), &document)?;
        Ok(path)
    }

    /// Load a graph from a `data.json` file or a directory holding one.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Graph, DocumentError> {
        let path = document_path(path.as_ref());
        if !path.is_file() {
            return Err(DocumentError::NotFound(path));
        }
        let file = File::open(&path).map_err(|source| DocumentError::Io {
            path: path.clone(),
            source,
        })?;
        let document: GraphDocument = serde_json::from_reader(BufReader::new(file))?;
        Graph::from_document(document)
    }
}

/// Resolve a directory to the document inside it.
pub fn document_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(DOCUMENT_FILE)
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
impl GraphMetadata {
    pub(crate) fn for_test(name: &str) -> Self {
        Self {
            generation_name: name.to_string(),
            date: "2024_01_01_00_00_00".to_string(),
            generation_size: [500.0, 100.0, 100.0],
            generation_dimension: Dimension::ThreeD,
            generation_type: UndergroundType::Cave,
            selected_algorithm: "gaussian_perlin".to_string(),
            nodes_number: 0,
            nodes_radius: 7.0,
            generation_index: 0,
            seed: None,
            edges_number: 0,
            loops: 0,
            components: 0,
            deactivated_number: 0,
            generation_duration_s: 0.0,
            field: None,
        }
    }
}

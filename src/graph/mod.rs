//! Graph container for generated cave skeletons.
//!
//! Nodes live in an append-only arena kept in creation order. Creation order
//! is what the growth algorithms step through, so it is stored explicitly
//! and kept apart from the id lookup used to resolve edges.

pub mod analysis;
pub mod document;
pub mod node;

use std::collections::HashMap;

pub use analysis::GraphStats;
pub use document::{DocumentError, GraphDocument, GraphMetadata, NodeDocument};
pub use node::{Node, NodeId, Position};

/// Errors raised when a mutation would break the graph's structure.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("node {0} already exists")]
    DuplicateNode(NodeId),

    #[error("node {found} is out of order, next id is {expected}")]
    OutOfOrder { expected: NodeId, found: NodeId },

    #[error("node {0} does not exist")]
    UnknownNode(NodeId),

    #[error("node {id} has invalid radius {radius}")]
    InvalidRadius { id: NodeId, radius: f64 },

    #[error("grid cell ({x}, {y}) is already occupied by node {occupant}")]
    CellOccupied { x: usize, y: usize, occupant: NodeId },

    #[error("a {size_x} x {size_y} world at cell size {cell_size} exceeds the grid cell limit")]
    GridTooLarge { size_x: f64, size_y: f64, cell_size: f64 },

    #[error("metadata is already attached to graph {0}")]
    MetadataAlreadySet(String),
}

/// A generated cave graph: nodes, symmetric edges and run metadata.
#[derive(Clone, Debug)]
pub struct Graph {
    name: String,
    index: usize,
    /// Arena in creation (= growth) order.
    nodes: Vec<Node>,
    /// Id to arena slot.
    slots: HashMap<NodeId, usize>,
    deactivated_count: usize,
    metadata: Option<GraphMetadata>,
}

impl Graph {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
            nodes: Vec::new(),
            slots: HashMap::new(),
            deactivated_count: 0,
            metadata: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of nodes, which is also the next id to allocate.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn next_id(&self) -> NodeId {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes whose active flag is currently cleared.
    pub fn deactivated_count(&self) -> usize {
        self.deactivated_count
    }

    pub fn all_inactive(&self) -> bool {
        self.deactivated_count == self.nodes.len()
    }

    pub fn metadata(&self) -> Option<&GraphMetadata> {
        self.metadata.as_ref()
    }

    /// Attach the run metadata. It can be set once per graph.
    pub fn attach_metadata(&mut self, metadata: GraphMetadata) -> Result<(), GraphError> {
        if self.metadata.is_some() {
            return Err(GraphError::MetadataAlreadySet(self.name.clone()));
        }
        self.metadata = Some(metadata);
        Ok(())
    }

    /// Add a node and link it to `parent` and every id in `edges`.
    ///
    /// Ids must be allocated densely: `id` has to equal `next_id()`. Every
    /// referenced node must already exist. Nothing is modified on error.
    pub fn add_node(
        &mut self,
        id: NodeId,
        parent: Option<NodeId>,
        edges: &[NodeId],
        position: Position,
        radius: f64,
        active: bool,
    ) -> Result<&Node, GraphError> {
        if self.slots.contains_key(&id) {
            return Err(GraphError::DuplicateNode(id));
        }
        if id != self.next_id() {
            return Err(GraphError::OutOfOrder { expected: self.next_id(), found: id });
        }
        if !(radius > 0.0 && radius.is_finite()) {
            return Err(GraphError::InvalidRadius { id, radius });
        }
        for &other in parent.iter().chain(edges) {
            if !self.contains(other) {
                return Err(GraphError::UnknownNode(other));
            }
        }

        let slot = self.nodes.len();
        self.nodes.push(Node::new(id, parent, position, radius, active));
        self.slots.insert(id, slot);
        if !active {
            self.deactivated_count += 1;
        }

        if let Some(parent) = parent {
            self.add_edge(id, parent)?;
        }
        for &other in edges {
            self.add_edge(id, other)?;
        }

        Ok(&self.nodes[slot])
    }

    /// Create an active node at the next id, linked to `parent`.
    pub fn spawn(&mut self, parent: Option<NodeId>, position: Position, radius: f64) -> Result<NodeId, GraphError> {
        let id = self.next_id();
        self.add_node(id, parent, &[], position, radius, true).map(|node| node.id)
    }

    /// Record `b` on `a` and `a` on `b`. No deduplication happens here.
    pub fn add_edge(&mut self, a: NodeId, b: NodeId) -> Result<(), GraphError> {
        let slot_a = self.slot(a)?;
        let slot_b = self.slot(b)?;
        self.nodes[slot_a].add_edge(b);
        self.nodes[slot_b].add_edge(a);
        Ok(())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(&id).map(|&slot| &self.nodes[slot])
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let slot = *self.slots.get(&id)?;
        Some(&mut self.nodes[slot])
    }

    /// Node by creation order rather than by id.
    pub fn node_at(&self, order: usize) -> Option<&Node> {
        self.nodes.get(order)
    }

    /// Nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn root(&self) -> Option<&Node> {
        self.nodes.first()
    }

    /// Parent of `id`, if both exist.
    pub fn parent_of(&self, id: NodeId) -> Option<&Node> {
        self.node(id)?.parent.and_then(|p| self.node(p))
    }

    pub fn activate(&mut self, id: NodeId) -> Result<(), GraphError> {
        let slot = self.slot(id)?;
        if !self.nodes[slot].is_active() {
            self.nodes[slot].activate();
            self.deactivated_count -= 1;
        }
        Ok(())
    }

    pub fn deactivate(&mut self, id: NodeId) -> Result<(), GraphError> {
        let slot = self.slot(id)?;
        if self.nodes[slot].is_active() {
            self.nodes[slot].deactivate();
            self.deactivated_count += 1;
        }
        Ok(())
    }

    /// Every `(node, neighbour)` pair over all edge lists.
    ///
    /// Not deduplicated: an undirected edge shows up once per direction.
    pub fn get_edges(&self) -> Vec<(NodeId, NodeId)> {
        self.nodes
            .iter()
            .flat_map(|node| node.edges().iter().map(move |&neighbor| (node.id, neighbor)))
            .collect()
    }

    /// Canonical edge set: each undirected edge once, as `(min, max)`, sorted.
    pub fn unique_edges(&self) -> Vec<(NodeId, NodeId)> {
        let mut edges: Vec<(NodeId, NodeId)> = self
            .get_edges()
            .into_iter()
            .map(|(a, b)| (a.min(b), a.max(b)))
            .collect();
        edges.sort_unstable();
        edges.dedup();
        edges
    }

    /// Build an `n`×`n` 0/1 adjacency matrix from the current edges.
    ///
    /// Rebuilt from scratch on every call. Pairs with an id outside `n` are skipped.
    pub fn create_adjacency_matrix(&self, n: usize) -> Vec<Vec<u8>> {
        let mut matrix = vec![vec![0u8; n]; n];
        for (u, v) in self.get_edges() {
            if u < n && v < n {
                matrix[u][v] = 1;
                matrix[v][u] = 1;
            }
        }
        matrix
    }

    /// Nodes whose distance to `origin` is strictly greater than `radius`.
    ///
    /// Despite the name this returns the far nodes, matching the historical
    /// behaviour; see [`is_beyond_radius`]. Loop closure does not use it.
    pub fn get_neighbors_within_radius(&self, origin: NodeId, radius: f64) -> Result<Vec<&Node>, GraphError> {
        let center = self.node(origin).ok_or(GraphError::UnknownNode(origin))?.position;
        Ok(self
            .nodes
            .iter()
            .filter(|node| is_beyond_radius(center.distance(&node.position), radius))
            .collect())
    }

    /// Drop duplicate neighbours from every edge list. Returns the number removed.
    pub fn dedup_edges(&mut self) -> usize {
        self.nodes.iter_mut().map(Node::dedup_edges).sum()
    }

    fn slot(&self, id: NodeId) -> Result<usize, GraphError> {
        self.slots.get(&id).copied().ok_or(GraphError::UnknownNode(id))
    }
}

/// Comparison used by [`Graph::get_neighbors_within_radius`]: "farther than".
pub fn is_beyond_radius(distance: f64, radius: f64) -> bool {
    distance > radius
}

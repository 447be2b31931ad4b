//! A single point of the cave skeleton.

use serde::{Deserialize, Serialize};

/// Node identifier. Allocated densely from 0 by the owning graph.
pub type NodeId = usize;

/// Free-space coordinates of a node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance in 3D.
    pub fn distance(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Planar bearing from `self` towards `other`, in degrees within [0, 360).
    pub fn bearing_to(&self, other: &Position) -> f64 {
        let degrees = (other.y - self.y).atan2(other.x - self.x).to_degrees();
        degrees.rem_euclid(360.0)
    }

    /// Point reached by walking `distance` along `bearing` (degrees) in the XY plane.
    pub fn offset_polar(&self, distance: f64, bearing: f64) -> Position {
        let theta = bearing.to_radians();
        Position {
            x: self.x + distance * theta.cos(),
            y: self.y + distance * theta.sin(),
            z: self.z,
        }
    }
}

/// A cave node: position, tube radius and adjacency.
///
/// Nodes do no validation of their own. The graph guarantees unique ids
/// and that every edge target exists.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub position: Position,
    pub radius: f64,
    edges: Vec<NodeId>,
    active: bool,
}

impl Node {
    /// Create a node with an empty edge list.
    ///
    /// The edge list is never pre-seeded with the parent: the graph links
    /// parent and child through its symmetric `add_edge`, which keeps a
    /// single mechanism responsible for adjacency.
    pub fn new(id: NodeId, parent: Option<NodeId>, position: Position, radius: f64, active: bool) -> Self {
        Self {
            id,
            parent,
            position,
            radius,
            edges: Vec::new(),
            active,
        }
    }

    /// Append a neighbour. Duplicates are allowed here and removed by `dedup_edges`.
    pub fn add_edge(&mut self, neighbor: NodeId) {
        self.edges.push(neighbor);
    }

    pub fn edges(&self) -> &[NodeId] {
        &self.edges
    }

    pub fn is_linked_to(&self, other: NodeId) -> bool {
        self.edges.contains(&other)
    }

    /// Remove repeated neighbours, keeping the first occurrence of each.
    /// Returns how many entries were dropped.
    pub fn dedup_edges(&mut self) -> usize {
        let before = self.edges.len();
        let mut seen = Vec::with_capacity(before);
        self.edges.retain(|id| {
            if seen.contains(id) {
                false
            } else {
                seen.push(*id);
                true
            }
        });
        before - self.edges.len()
    }

    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    pub fn activate(&mut self) {
        self.active = true;
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

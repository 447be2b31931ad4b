//! Cave generation library
//!
//! Re-exports modules for use by the binary and tools.

pub mod batch;
pub mod config;
pub mod error;
pub mod field;
pub mod graph;
pub mod growth;
pub mod loop_closure;
pub mod mesh;
pub mod seeds;
pub mod tilemap;

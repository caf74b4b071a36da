//! Mesh routing: connectivity reports in, per-peer relay tables out.

pub mod algorithm;
pub mod engine;
pub mod mesh;

pub use algorithm::{compute_routing_tables, Mesh, RoutingTable};
pub use engine::{MeshRoutingEngine, SessionRouting};
pub use mesh::MeshStore;

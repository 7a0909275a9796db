// src/graph/mod.rs

//! Workflow graph model.
//!
//! - [`model`] holds the persisted node/edge/port/workflow shapes.
//! - [`registry`] maps each node type to its default ports, config and
//!   executor.
//! - [`validate`] checks structural well-formedness.
//! - [`edit`] applies atomic add/remove mutations.
//! - [`adjacency`] answers predecessor/successor queries.
//! - [`persist`] reads and writes workflow JSON.

pub mod adjacency;
pub mod edit;
pub mod model;
pub mod persist;
pub mod registry;
pub mod validate;

pub use adjacency::Adjacency;
pub use edit::{apply_edit, EditOutcome, GraphEdit};
pub use model::{Edge, Node, Port, Position, Workflow};
pub use persist::{load_workflow, save_workflow};
pub use registry::{NodeDefinition, NodeRegistry};
pub use validate::{validate, validate_for_run};

// src/graph/persist.rs

use std::fs;
use std::path::Path;

use crate::errors::Result;
use crate::graph::model::Workflow;

/// Read a workflow in its persisted JSON shape.
///
/// Only deserialises; call [`crate::graph::validate`] before running it.
pub fn load_workflow(path: impl AsRef<Path>) -> Result<Workflow> {
    let contents = fs::read_to_string(path.as_ref())?;
    let workflow: Workflow = serde_json::from_str(&contents)?;
    Ok(workflow)
}

/// Write `workflow` as pretty-printed JSON.
pub fn save_workflow(path: impl AsRef<Path>, workflow: &Workflow) -> Result<()> {
    let json = serde_json::to_string_pretty(workflow)?;
    fs::write(path.as_ref(), json)?;
    Ok(())
}

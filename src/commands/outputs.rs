use anyhow::Result;
use converge::{Declaration, Resolver, StateStore};
use serde_json::Value;
use std::collections::BTreeMap;

use super::Project;
use crate::Context;
use crate::engine::differ::render_value;
use crate::ui;

pub fn run(ctx: &Context, json: bool) -> Result<()> {
    let project = Project::load(ctx)?;
    let store = crate::state::open_existing(&project.state_path)?;
    let outputs = stored(&project.declaration, &store)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outputs)?);
    } else if outputs.is_empty() {
        ui::info("No outputs available");
    } else {
        print(&outputs);
    }
    Ok(())
}

/// Resolve the declaration's stack outputs against recorded state
pub fn stored(declaration: &Declaration, store: &dyn StateStore) -> Result<BTreeMap<String, Value>> {
    let snapshot = store.load()?;
    let resolver = Resolver::from_records(&snapshot.records);
    Ok(resolver.resolve_outputs(&declaration.outputs, false))
}

pub fn print(outputs: &BTreeMap<String, Value>) {
    if outputs.is_empty() {
        return;
    }
    ui::section("Outputs");
    for (key, value) in outputs {
        ui::kv(key, &render_value(value));
    }
}

use anyhow::Result;
use converge::Reconciler;

use super::{Project, read_only_store};
use crate::Context;
use crate::engine::differ;
use crate::ui;

pub fn run(ctx: &Context, diff: bool, json: bool) -> Result<()> {
    let project = Project::load(ctx)?;
    let registry = project.registry()?;
    let store = read_only_store(&project.state_path)?;

    let preview = Reconciler::new(&registry, store.as_ref()).preview(&project.declaration)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&preview)?);
        return Ok(());
    }

    if ctx.verbose > 0 {
        ui::kv("state", &project.state_path.display().to_string());
    }
    differ::display_preview(&preview, diff);
    Ok(())
}

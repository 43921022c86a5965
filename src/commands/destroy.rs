use anyhow::Result;
use converge::Declaration;

use super::Project;
use crate::Context;
use crate::engine::{self, ApplyOptions, Outcome};
use crate::ui;

pub fn run(ctx: &Context, yes: bool, json: bool) -> Result<()> {
    let project = Project::load(ctx)?;
    if !project.state_path.exists() {
        if !json {
            ui::info("Nothing to destroy: no state recorded");
        }
        return Ok(());
    }

    let registry = project.registry()?;
    let options = project.file.execute_options(None)?;
    let store = crate::state::open(&project.state_path)?;

    let opts = ApplyOptions {
        yes,
        json,
        diff: false,
        quiet: ctx.quiet,
    };

    match engine::execute(&registry, &store, &options, &Declaration::new(), &opts)? {
        Outcome::Ran(report) => engine::finish(&report, &opts),
        Outcome::UpToDate | Outcome::Aborted => Ok(()),
    }
}

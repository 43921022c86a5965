use anyhow::Result;

use super::Project;
use crate::Context;
use crate::cli::ApplyArgs;
use crate::engine::{self, ApplyOptions, Outcome};

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let project = Project::load(ctx)?;
    let registry = project.registry()?;
    let options = project.file.execute_options(args.jobs)?;
    let store = crate::state::open(&project.state_path)?;

    let opts = ApplyOptions {
        yes: args.yes,
        json: args.json,
        diff: args.diff,
        quiet: ctx.quiet,
    };

    match engine::execute(&registry, &store, &options, &project.declaration, &opts)? {
        Outcome::Ran(report) => engine::finish(&report, &opts),
        Outcome::UpToDate => {
            let outputs = super::outputs::stored(&project.declaration, &store)?;
            if opts.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "changed": false,
                        "outputs": outputs,
                    }))?
                );
            } else if !opts.quiet {
                super::outputs::print(&outputs);
            }
            Ok(())
        }
        Outcome::Aborted => Ok(()),
    }
}

//! Execution with UI integration: preview, confirm, converge, summarize

use anyhow::{Result, bail};
use colored::Colorize;
use converge::{
    Declaration, ExecuteOptions, ProviderRegistry, Reconciler, RunReport, RunSummary, StateStore,
};

use crate::progress::RunProgress;
use crate::ui;

use super::differ::{display_preview, render_value};

/// Options for a converging command
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Skip confirmation prompts
    pub yes: bool,
    /// Print the run report as JSON instead of text
    pub json: bool,
    /// Show input diffs in the plan
    pub diff: bool,
    /// Suppress non-essential output
    pub quiet: bool,
}

/// How a converging command ended
#[derive(Debug)]
pub enum Outcome {
    /// Nothing to change; no provider was called
    UpToDate,
    /// The user declined the plan
    Aborted,
    /// The run went ahead
    Ran(RunReport),
}

/// Preview, confirm, then converge `declaration`
///
/// Pass an empty declaration to tear everything down.
pub fn execute(
    registry: &ProviderRegistry,
    store: &dyn StateStore,
    options: &ExecuteOptions,
    declaration: &Declaration,
    opts: &ApplyOptions,
) -> Result<Outcome> {
    // 1. Work out what will change
    let preview = Reconciler::new(registry, store).preview(declaration)?;
    let show_plan = !opts.json && !opts.quiet;
    if show_plan {
        display_preview(&preview, opts.diff);
    }

    if !preview.summary.has_changes() {
        log::info!("Plan has no changes");
        return Ok(Outcome::UpToDate);
    }

    // 2. Confirm (unless --yes)
    if !opts.yes {
        if opts.json || !console::Term::stderr().is_term() {
            bail!("Refusing to apply changes without confirmation; pass --yes");
        }
        if !confirm_proceed()? {
            println!();
            println!("  {} Aborted", "✗".red());
            return Ok(Outcome::Aborted);
        }
    }

    // 3. Converge
    if show_plan {
        println!();
        println!(
            "  {} Applying {} resources...",
            "→".cyan(),
            preview.plan.total_resources()
        );
    }

    let mut progress = RunProgress::new(preview.plan.total_resources(), opts.json || opts.quiet);
    let retries = progress.retry_notice();
    let report = Reconciler::new(registry, store)
        .with_options(options.clone())
        .with_retry_callback(&retries)
        .run(declaration, &mut progress);
    progress.finish();

    match report {
        Ok(report) => Ok(Outcome::Ran(report)),
        Err(converge::Error::Aborted { source, report }) => {
            report_abort(&report, opts)?;
            Err(anyhow::Error::new(*source).context("Run aborted; reload state and re-run"))
        }
        Err(e) => Err(e.into()),
    }
}

/// Show where an aborted run left every resource
fn report_abort(report: &RunReport, opts: &ApplyOptions) -> Result<()> {
    if opts.json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else if !opts.quiet {
        print_summary(&report.summary);
        print_problems(report);
    }
    Ok(())
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(false)
        .interact()?;

    Ok(confirmed)
}

/// Print the run report, then fail if anything did not converge
pub fn finish(report: &RunReport, opts: &ApplyOptions) -> Result<()> {
    if opts.json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else if !opts.quiet {
        print_summary(&report.summary);
        print_problems(report);
        print_outputs(report);
    }

    if !report.is_success() {
        let problems = report.summary.failed + report.summary.blocked + report.summary.cancelled;
        bail!("{problems} resources did not converge");
    }
    Ok(())
}

/// Print final summary
fn print_summary(summary: &RunSummary) {
    println!();
    if summary.is_success() {
        println!("  {} Converged successfully!", "✓".green().bold());
    } else {
        println!("  {} Converged with errors", "⚠".yellow().bold());
    }

    let lines = [
        (summary.created, "created"),
        (summary.updated, "updated"),
        (summary.replaced, "replaced"),
        (summary.deleted, "deleted"),
        (summary.unchanged, "unchanged"),
    ];
    for (count, label) in lines {
        if count > 0 {
            println!("    • {count} resources {label}");
        }
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
    if summary.blocked > 0 {
        println!("    • {} {} blocked", summary.blocked, "resources".yellow());
    }
    if summary.cancelled > 0 {
        println!("    • {} {} cancelled", summary.cancelled, "resources".yellow());
    }
}

fn print_problems(report: &RunReport) {
    let problems: Vec<_> = report.problems().collect();
    if problems.is_empty() {
        return;
    }
    ui::section("Problems");
    for node in problems {
        println!(
            "  {} {:<32} {}",
            ui::report_symbol(node),
            node.name,
            ui::report_line(node)
        );
    }
}

fn print_outputs(report: &RunReport) {
    if report.outputs.is_empty() {
        return;
    }
    ui::section("Outputs");
    for (key, value) in &report.outputs {
        ui::kv(key, &render_value(value));
    }
}

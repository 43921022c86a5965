//! Progress reporting for reconciliation runs.

use colored::Colorize;
use converge::{NodeReport, ProgressCallback, ProviderError, RetryCallback};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

use crate::ui;

const BAR_TEMPLATE: &str = "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}";

/// Progress bar over every resource of a run, one line per finished resource
pub struct RunProgress {
    bar: ProgressBar,
    quiet: bool,
}

impl RunProgress {
    /// `total` counts every resource the run touches, deletions included
    pub fn new(total: usize, quiet: bool) -> Self {
        let interactive = console::Term::stderr().is_term();
        let target = if quiet || !interactive {
            ProgressDrawTarget::hidden()
        } else {
            ProgressDrawTarget::stderr()
        };
        let bar = ProgressBar::with_draw_target(Some(total as u64), target);
        bar.set_style(
            ProgressStyle::with_template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Self { bar, quiet }
    }

    fn line(&self, text: String) {
        print_line(&self.bar, self.quiet, text);
    }

    /// Retry callback printing through this bar
    pub fn retry_notice(&self) -> RetryNotice {
        RetryNotice {
            bar: self.bar.clone(),
            quiet: self.quiet,
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for RunProgress {
    fn on_batch_start(&mut self, index: usize, names: &[String], deleting: bool) {
        let verb = if deleting { "Deleting" } else { "Applying" };
        log::debug!("Batch {}: {}", index + 1, names.join(", "));
        self.bar
            .set_message(format!("{verb} batch {} ({} resources)", index + 1, names.len()));
    }

    fn on_resource_complete(&mut self, report: &NodeReport) {
        self.line(format!(
            "  {} {:<32} {}",
            ui::report_symbol(report),
            report.name,
            ui::report_line(report)
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&mut self) {
        self.bar.tick();
    }
}

fn print_line(bar: &ProgressBar, quiet: bool, text: String) {
    if quiet {
        return;
    }
    if bar.is_hidden() {
        println!("{text}");
    } else {
        bar.println(text);
    }
}

/// Announces retried provider calls above the progress bar
pub struct RetryNotice {
    bar: ProgressBar,
    quiet: bool,
}

impl RetryCallback for RetryNotice {
    fn on_retry(
        &self,
        resource: &str,
        attempt: u32,
        max_attempts: u32,
        error: &ProviderError,
        delay: Duration,
    ) {
        log::debug!("{resource}: attempt {attempt}/{max_attempts} failed: {error}");
        print_line(
            &self.bar,
            self.quiet,
            format!(
                "  {} {:<32} attempt {attempt}/{max_attempts} failed ({}), retrying in {:.1}s",
                "↻".yellow(),
                resource,
                error.message,
                delay.as_secs_f64()
            ),
        );
    }
}

impl Drop for RunProgress {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

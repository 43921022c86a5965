use colored::{ColoredString, Colorize};
use converge::{Action, NodeReport, Status};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Resource Markers
// ============================================================================

/// Plan marker for an action, colored by impact
pub fn action_symbol(action: Action) -> ColoredString {
    let symbol = action.symbol();
    match action {
        Action::NoOp => symbol.dimmed(),
        Action::Create => symbol.green(),
        Action::Update => symbol.yellow(),
        Action::Replace => symbol.magenta(),
        Action::Delete => symbol.red(),
    }
}

/// Result marker for a finished resource
pub fn report_symbol(report: &NodeReport) -> ColoredString {
    match report.status {
        Status::Ready if report.action.is_some_and(|a| a.is_change()) => "✓".green(),
        Status::Ready => "○".dimmed(),
        Status::Failed => "✗".red(),
        Status::Cancelled => "⊘".yellow(),
        _ if report.is_blocked() => "⊘".dimmed(),
        _ => "?".dimmed(),
    }
}

/// Past tense of an action, for result listings
pub fn past_tense(action: Action) -> &'static str {
    match action {
        Action::NoOp => "unchanged",
        Action::Create => "created",
        Action::Update => "updated",
        Action::Replace => "replaced",
        Action::Delete => "deleted",
    }
}

/// One-line description of how a resource ended
pub fn report_line(report: &NodeReport) -> String {
    use converge::Detail;

    match (&report.detail, report.action) {
        (Some(Detail::Blocked { by }), _) => format!("blocked by {by}"),
        (Some(Detail::Cancelled { reason }), _) => format!("cancelled: {reason}"),
        (Some(Detail::Error { message }), _) => message.clone(),
        (None, Some(action @ (Action::Create | Action::Update | Action::Replace))) => {
            match &report.identity {
                Some(identity) => format!("{} ({identity})", past_tense(action)),
                None => past_tense(action).to_string(),
            }
        }
        (None, Some(action)) => past_tense(action).to_string(),
        (None, None) => report.status.to_string(),
    }
}

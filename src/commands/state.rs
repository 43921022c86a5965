use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use colored::Colorize;
use converge::StateRecord;
use ledger::SqliteStore;

use crate::Context;
use crate::cli::StateCommand;
use crate::ui;

pub fn run(ctx: &Context, cmd: StateCommand) -> Result<()> {
    let path = super::state_path(ctx)?;
    let store = crate::state::open_existing(&path)?;

    match cmd {
        StateCommand::List => list(ctx, &store),
        StateCommand::Show { name } => show(&store, &name),
        StateCommand::Rm { name, yes } => remove(&store, &name, yes),
    }
}

fn list(ctx: &Context, store: &SqliteStore) -> Result<()> {
    let snapshot = store.snapshot()?;

    if !ctx.quiet {
        ui::header(&format!("State (revision {})", snapshot.revision));
        if let Some(path) = store.path() {
            ui::dim(&path.display().to_string());
        }
        println!();
    }

    if snapshot.is_empty() {
        ui::info("No resources recorded");
        return Ok(());
    }

    for (name, record) in &snapshot.records {
        println!("  {}", row(name, record));
    }
    if !ctx.quiet {
        println!();
        ui::dim(&format!("{} resources", snapshot.len()));
    }
    Ok(())
}

fn row(name: &str, record: &StateRecord) -> String {
    format!(
        "{:<32} {:<24} {:<28} {}",
        name,
        record.resource_type,
        record.live_identity,
        age(record.updated_at, Utc::now()).as_str().dimmed()
    )
}

/// Coarse "time ago" for a record
fn age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(then);
    if elapsed.num_days() > 0 {
        format!("{}d ago", elapsed.num_days())
    } else if elapsed.num_hours() > 0 {
        format!("{}h ago", elapsed.num_hours())
    } else if elapsed.num_minutes() > 0 {
        format!("{}m ago", elapsed.num_minutes())
    } else {
        "just now".to_string()
    }
}

fn show(store: &SqliteStore, name: &str) -> Result<()> {
    let snapshot = store.snapshot()?;
    let Some(record) = snapshot.get(name) else {
        bail!("No resource named `{name}` in state");
    };

    ui::header(name);
    ui::kv("type", &record.resource_type);
    ui::kv("identity", &record.live_identity);
    ui::kv("updated", &record.updated_at.to_rfc3339());
    if !record.dependencies.is_empty() {
        let deps: Vec<&str> = record.dependencies.iter().map(String::as_str).collect();
        ui::kv("depends on", &deps.join(", "));
    }

    ui::section("Outputs");
    println!("{}", serde_json::to_string_pretty(&record.outputs())?);
    Ok(())
}

fn remove(store: &SqliteStore, name: &str, yes: bool) -> Result<()> {
    let snapshot = store.snapshot()?;
    let Some(record) = snapshot.get(name) else {
        bail!("No resource named `{name}` in state");
    };

    ui::warn(&format!(
        "`{name}` ({}) will be forgotten; the live resource is not deleted",
        record.live_identity
    ));
    if !yes && !confirm_forget()? {
        println!("  {} Aborted", "✗".red());
        return Ok(());
    }

    let revision = store.delete(name, snapshot.revision)?;
    log::info!("Removed {name} from state (revision {revision})");
    ui::success(&format!("Forgot {name}"));
    Ok(())
}

fn confirm_forget() -> Result<bool> {
    if !console::Term::stderr().is_term() {
        bail!("Refusing to edit state without confirmation; pass --yes");
    }
    Ok(dialoguer::Confirm::new()
        .with_prompt("Forget this resource?")
        .default(false)
        .interact()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge::{Inputs, StateStore};
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn store_with(names: &[&str]) -> (TempDir, SqliteStore) {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::open(&temp.path().join("state.db")).unwrap();
        for (i, name) in names.iter().enumerate() {
            let record = StateRecord::new(
                "bucket",
                format!("bucket-{i}"),
                Inputs::new(),
                Default::default(),
                BTreeSet::new(),
            );
            store.commit(name, &record, i as u64).unwrap();
        }
        (temp, store)
    }

    #[test]
    fn test_row_format() {
        let (_temp, store) = store_with(&["assets"]);
        let snapshot = store.snapshot().unwrap();
        let line = row("assets", snapshot.get("assets").unwrap());
        assert!(line.starts_with("assets"));
        assert!(line.contains("bucket-0"));
    }

    #[test]
    fn test_age() {
        let now = Utc::now();
        assert_eq!(age(now, now), "just now");
        assert_eq!(age(now - chrono::Duration::minutes(5), now), "5m ago");
        assert_eq!(age(now - chrono::Duration::hours(3), now), "3h ago");
        assert_eq!(age(now - chrono::Duration::days(2), now), "2d ago");
    }

    #[test]
    fn test_remove_forgets_record() {
        let (_temp, store) = store_with(&["assets", "logs"]);
        remove(&store, "assets", true).unwrap();

        let snapshot = store.snapshot().unwrap();
        assert!(snapshot.get("assets").is_none());
        assert!(snapshot.get("logs").is_some());
    }

    #[test]
    fn test_remove_unknown_fails() {
        let (_temp, store) = store_with(&["assets"]);
        let err = remove(&store, "nope", true).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_show_unknown_fails() {
        let (_temp, store) = store_with(&[]);
        assert!(show(&store, "nope").is_err());
    }
}

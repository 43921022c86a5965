//! Plan display

use colored::Colorize;
use converge::{Action, Inputs, Preview, PreviewEntry};
use similar::{ChangeTag, TextDiff};

/// Display a preview in a user-friendly format
pub fn display_preview(preview: &Preview, show_diff: bool) {
    let changes: Vec<&PreviewEntry> = preview
        .entries
        .iter()
        .filter(|entry| entry.action.is_change() || !entry.retired.is_empty())
        .collect();

    if changes.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Execution Plan".bold()
    );
    println!("│");

    for entry in &changes {
        let symbol = crate::ui::action_symbol(entry.action);
        let pad = " ".repeat(3usize.saturating_sub(entry.action.symbol().len()));
        println!(
            "│ {symbol}{pad} {:<32} {}",
            entry.name,
            entry.resource_type.dimmed()
        );

        if let Some(note) = change_note(entry) {
            println!("│       {}", note.dimmed());
        }

        if show_diff {
            for (tag, line) in input_diff(entry.old_inputs.as_ref(), entry.new_inputs.as_ref()) {
                match tag {
                    ChangeTag::Delete => println!("│       {}", format!("- {line}").red()),
                    ChangeTag::Insert => println!("│       {}", format!("+ {line}").green()),
                    ChangeTag::Equal => {}
                }
            }
        }
    }
    println!("│");

    if !preview.outputs.is_empty() {
        println!("│ {}", "Outputs".bold());
        for (key, value) in &preview.outputs {
            println!("│   {key} = {}", render_value(value));
        }
        println!("│");
    }

    let summary = &preview.summary;
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Plan: {} to create, {} to update, {} to replace, {} to delete",
        summary.additions.to_string().green(),
        summary.modifications.to_string().yellow(),
        summary.replacements.to_string().magenta(),
        summary.removals.to_string().red()
    );
    if summary.retired > 0 {
        println!(
            "│       {} superseded resources left over from an earlier replace",
            summary.retired.to_string().red()
        );
    }
    println!("└─────────────────────────────────────────────────────┘");
}

/// Why an entry changes, when there is more to say than its action
fn change_note(entry: &PreviewEntry) -> Option<String> {
    let mut parts = Vec::new();
    if matches!(entry.action, Action::Update | Action::Replace) && !entry.changed.is_empty() {
        let changed: Vec<&str> = entry.changed.iter().map(String::as_str).collect();
        parts.push(format!("changed: {}", changed.join(", ")));
    }
    if !entry.unknown.is_empty() {
        let unknown: Vec<&str> = entry.unknown.iter().map(String::as_str).collect();
        parts.push(format!("known after apply: {}", unknown.join(", ")));
    }
    if !entry.retired.is_empty() {
        parts.push(format!("still to delete: {}", entry.retired.join(", ")));
    }
    (!parts.is_empty()).then(|| parts.join("; "))
}

/// Changed lines between two input sets rendered as pretty JSON
pub fn input_diff(old: Option<&Inputs>, new: Option<&Inputs>) -> Vec<(ChangeTag, String)> {
    let old_text = old.map(pretty).unwrap_or_default();
    let new_text = new.map(pretty).unwrap_or_default();
    let diff = TextDiff::from_lines(&old_text, &new_text);

    diff.iter_all_changes()
        .filter_map(|change| {
            let line = change.value().trim_end().to_string();
            match change.tag() {
                ChangeTag::Equal => None,
                tag => Some((tag, line)),
            }
        })
        .collect()
}

fn pretty(inputs: &Inputs) -> String {
    let mut text = serde_json::to_string_pretty(inputs).unwrap_or_default();
    text.push('\n');
    text
}

/// Compact rendering of a value for one-line display
pub fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn inputs(pairs: &[(&str, serde_json::Value)]) -> Inputs {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    #[test]
    fn test_input_diff_shows_changed_lines() {
        let old = inputs(&[("name", json!("a")), ("port", json!(80))]);
        let new = inputs(&[("name", json!("a")), ("port", json!(443))]);
        let diff = input_diff(Some(&old), Some(&new));

        assert_eq!(
            diff,
            vec![
                (ChangeTag::Delete, "  \"port\": 80".to_string()),
                (ChangeTag::Insert, "  \"port\": 443".to_string()),
            ]
        );
    }

    #[test]
    fn test_input_diff_for_creation() {
        let new = inputs(&[("name", json!("a"))]);
        let diff = input_diff(None, Some(&new));
        assert!(diff.iter().all(|(tag, _)| *tag == ChangeTag::Insert));
        assert!(diff.iter().any(|(_, line)| line.contains("\"name\": \"a\"")));
    }

    #[test]
    fn test_change_note() {
        let entry = PreviewEntry {
            name: "svc".to_string(),
            resource_type: "service".to_string(),
            action: Action::Update,
            changed: BTreeSet::from(["image".to_string()]),
            old_inputs: None,
            new_inputs: None,
            unknown: BTreeSet::from(["task_arn".to_string()]),
            retired: Vec::new(),
        };
        assert_eq!(
            change_note(&entry).unwrap(),
            "changed: image; known after apply: task_arn"
        );
    }

    #[test]
    fn test_change_note_lists_leftovers() {
        let entry = PreviewEntry {
            name: "sg".to_string(),
            resource_type: "security_group".to_string(),
            action: Action::NoOp,
            changed: BTreeSet::new(),
            old_inputs: None,
            new_inputs: None,
            unknown: BTreeSet::new(),
            retired: vec!["sg-1".to_string()],
        };
        assert_eq!(change_note(&entry).unwrap(), "still to delete: sg-1");
    }

    #[test]
    fn test_render_value() {
        assert_eq!(render_value(&json!("x")), "x");
        assert_eq!(render_value(&json!(3)), "3");
    }
}

//! State database location and access
//!
//! The database itself is [`ledger::SqliteStore`]; this module decides
//! which file a command works on:
//!
//! 1. `--state` on the command line
//! 2. `settings.state` in the declaration file, relative to that file
//! 3. `<state_dir>/<project>.db` (see [`crate::paths`])

use anyhow::{Context, Result, bail};
use ledger::SqliteStore;
use std::path::{Path, PathBuf};

use crate::config::DeclarationFile;
use crate::paths;

/// Work out the state database path for a declaration
pub fn resolve_path(
    explicit: Option<&Path>,
    file: Option<&DeclarationFile>,
    declaration: &Path,
) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(paths::expand(&path.to_string_lossy()));
    }

    let settings = file.map(|f| &f.settings);
    if let Some(state) = settings.and_then(|s| s.state.as_deref()) {
        let base = declaration.parent().unwrap_or_else(|| Path::new("."));
        return Ok(paths::relative_to(base, state));
    }

    let project = settings
        .and_then(|s| s.project.clone())
        .unwrap_or_else(|| paths::project_name(declaration));
    paths::state_file(&project)
}

/// Open (creating if needed) the state database
pub fn open(path: &Path) -> Result<SqliteStore> {
    log::debug!("Opening state database {}", path.display());
    SqliteStore::open(path).with_context(|| format!("Could not open state database {}", path.display()))
}

/// Open a state database that must already exist
pub fn open_existing(path: &Path) -> Result<SqliteStore> {
    if !path.exists() {
        bail!("No state recorded at {}", path.display());
    }
    open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge::{Inputs, StateRecord, StateStore};
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    #[test]
    fn test_explicit_path_wins() {
        let file = DeclarationFile::parse("[settings]\nstate = \"from-file.db\"\n").unwrap();
        let path = resolve_path(
            Some(Path::new("/tmp/explicit.db")),
            Some(&file),
            Path::new("/srv/app/keel.toml"),
        )
        .unwrap();
        assert_eq!(path, PathBuf::from("/tmp/explicit.db"));
    }

    #[test]
    fn test_settings_path_relative_to_declaration() {
        let file = DeclarationFile::parse("[settings]\nstate = \".keel/state.db\"\n").unwrap();
        let path = resolve_path(None, Some(&file), Path::new("/srv/app/keel.toml")).unwrap();
        assert_eq!(path, PathBuf::from("/srv/app/.keel/state.db"));
    }

    #[test]
    fn test_project_setting_names_default_file() {
        let file = DeclarationFile::parse("[settings]\nproject = \"playnativa\"\n").unwrap();
        let path = resolve_path(None, Some(&file), Path::new("/srv/app/keel.toml")).unwrap();
        assert_eq!(path.file_name().unwrap(), "playnativa.db");
    }

    #[test]
    fn test_open_existing_requires_file() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nothing.db");
        assert!(open_existing(&missing).is_err());
        assert!(!missing.exists());
    }

    #[test]
    fn test_open_then_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("state.db");

        let store = open(&path).unwrap();
        let record = StateRecord::new("bucket", "bucket-1", Inputs::new(), Default::default(), BTreeSet::new());
        store.commit("assets", &record, 0).unwrap();
        drop(store);

        let store = open_existing(&path).unwrap();
        let snapshot = store.load().unwrap();
        assert_eq!(snapshot.revision, 1);
        assert_eq!(snapshot.get("assets").unwrap().live_identity, "bucket-1");
    }
}

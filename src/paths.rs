//! Path resolution for keel state files
//!
//! # Environment Variables
//!
//! - `KEEL_STATE_DIR` - Override the state directory
//!
//! # Path Resolution Priority
//!
//! For state_dir():
//! 1. `KEEL_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/keel` (if set)
//! 3. Platform default:
//!    - Windows: `%LOCALAPPDATA%\keel`
//!    - macOS/Linux: `~/.local/state/keel`
//!
//! A project's state file is `<state_dir>/<project>.db` unless the
//! declaration or the command line names one explicitly.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "KEEL_STATE_DIR";

/// Project name used when nothing better is known
pub const DEFAULT_PROJECT: &str = "default";

/// Get the keel state directory path
pub fn state_dir() -> Result<PathBuf> {
    state_dir_with(|key| std::env::var(key).ok())
}

/// [`state_dir`] with an explicit environment lookup
pub fn state_dir_with(env: impl Fn(&str) -> Option<String>) -> Result<PathBuf> {
    // 1. Check environment variable override
    if let Some(dir) = env(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    // 2. Check XDG_STATE_HOME
    if let Some(xdg_state) = env("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join("keel");
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    // 3. Platform default
    #[cfg(windows)]
    {
        if let Some(local_app_data) = dirs::data_local_dir() {
            let path = local_app_data.join("keel");
            log::debug!("Using Windows state dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join("keel");
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Project name for a declaration file: the name of its directory
pub fn project_name(declaration: &Path) -> String {
    declaration
        .canonicalize()
        .ok()
        .as_deref()
        .unwrap_or(declaration)
        .parent()
        .and_then(Path::file_name)
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map_or_else(|| DEFAULT_PROJECT.to_string(), sanitize)
}

/// Default state file for a project
pub fn state_file(project: &str) -> Result<PathBuf> {
    Ok(state_dir()?.join(format!("{}.db", sanitize(project))))
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

/// Resolve `path` against `base` unless it is already absolute
pub fn relative_to(base: &Path, path: &str) -> PathBuf {
    let expanded = expand(path);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_state_dir_env_override() {
        let result = state_dir_with(env_of(&[(ENV_STATE_DIR, "/custom/state/path")])).unwrap();
        assert_eq!(result, PathBuf::from("/custom/state/path"));
    }

    #[test]
    fn test_state_dir_env_override_with_tilde() {
        let home = dirs::home_dir().unwrap();
        let result = state_dir_with(env_of(&[(ENV_STATE_DIR, "~/keel-state")])).unwrap();
        assert_eq!(result, home.join("keel-state"));
    }

    #[test]
    fn test_override_beats_xdg() {
        let result = state_dir_with(env_of(&[
            (ENV_STATE_DIR, "/override"),
            ("XDG_STATE_HOME", "/xdg"),
        ]))
        .unwrap();
        assert_eq!(result, PathBuf::from("/override"));
    }

    #[test]
    fn test_xdg_state_home() {
        let result = state_dir_with(env_of(&[("XDG_STATE_HOME", "/tmp/xdg-state-test")])).unwrap();
        assert_eq!(result, PathBuf::from("/tmp/xdg-state-test/keel"));
    }

    #[cfg(unix)]
    #[test]
    fn test_default_state_dir_unix() {
        let result = state_dir_with(env_of(&[])).unwrap();
        let home = dirs::home_dir().unwrap();
        assert_eq!(result, home.join(".local").join("state").join("keel"));
    }

    #[test]
    fn test_project_name_from_directory() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = temp.path().join("playnativa");
        std::fs::create_dir(&dir).unwrap();
        let file = dir.join("keel.toml");
        std::fs::write(&file, "").unwrap();

        assert_eq!(project_name(&file), "playnativa");
    }

    #[test]
    fn test_project_name_sanitized() {
        assert_eq!(project_name(Path::new("/srv/my app/keel.toml")), "my_app");
    }

    #[test]
    fn test_relative_to() {
        let base = Path::new("/srv/app");
        assert_eq!(relative_to(base, "state.db"), PathBuf::from("/srv/app/state.db"));
        assert_eq!(relative_to(base, "/var/keel.db"), PathBuf::from("/var/keel.db"));
    }

    #[test]
    fn test_expand_absolute() {
        assert_eq!(expand("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_expand_unknown_env_var_unchanged() {
        let result = expand("/path/$NONEXISTENT_VAR_12345/file");
        assert_eq!(result, PathBuf::from("/path/$NONEXISTENT_VAR_12345/file"));
    }
}

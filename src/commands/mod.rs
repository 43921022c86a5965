//! Command implementations
//!
//! - `preview` - show what `up` would change
//! - `up` - converge the declaration
//! - `destroy` - delete everything recorded
//! - `state` - inspect and edit recorded state
//! - `outputs` - stack outputs from recorded state

pub mod destroy;
pub mod outputs;
pub mod preview;
pub mod state;
pub mod up;

use anyhow::{Context as AnyhowContext, Result};
use converge::{Declaration, MemoryStore, ProviderRegistry, StateStore};
use std::path::{Path, PathBuf};

use crate::Context;
use crate::config::DeclarationFile;
use crate::provider;

/// A loaded declaration file and where its state lives
pub struct Project {
    pub file: DeclarationFile,
    pub declaration: Declaration,
    pub state_path: PathBuf,
}

impl Project {
    pub fn load(ctx: &Context) -> Result<Self> {
        let file = DeclarationFile::load(&ctx.file)?;
        let declaration = file
            .declaration()
            .with_context(|| format!("Invalid declaration in {}", ctx.file.display()))?;
        let state_path = crate::state::resolve_path(ctx.state.as_deref(), Some(&file), &ctx.file)?;
        log::debug!(
            "Project {}: {} resources, state at {}",
            ctx.file.display(),
            declaration.len(),
            state_path.display()
        );
        Ok(Self {
            file,
            declaration,
            state_path,
        })
    }

    pub fn registry(&self) -> Result<ProviderRegistry> {
        provider::registry(&self.file)
    }
}

/// State path for commands that can work without a declaration file
pub fn state_path(ctx: &Context) -> Result<PathBuf> {
    let file = if ctx.file.exists() {
        Some(DeclarationFile::load(&ctx.file)?)
    } else {
        None
    };
    crate::state::resolve_path(ctx.state.as_deref(), file.as_ref(), &ctx.file)
}

/// Recorded state for read-only use; an absent database reads as empty
pub fn read_only_store(path: &Path) -> Result<Box<dyn StateStore>> {
    if path.exists() {
        Ok(Box::new(crate::state::open(path)?))
    } else {
        log::debug!("No state at {}, previewing against empty state", path.display());
        Ok(Box::new(MemoryStore::new()))
    }
}

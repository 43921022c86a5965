//! Provider adapters available to the CLI
//!
//! Cloud adapters live outside this binary; what ships here is enough to
//! drive a declaration end to end:
//!
//! - [`simulated`] - mints identities and attributes in process
//! - [`command`] - delegates every operation to a shell command

pub mod command;
pub mod simulated;

use anyhow::{Result, bail};
use converge::{DiffVerdict, Inputs, ProviderRegistry, changed_properties};
use std::sync::Arc;

use crate::config::{DeclarationFile, ProviderKind, TypeConfig};

pub use command::CommandProvider;
pub use simulated::SimulatedProvider;

/// Build the registry for a declaration file
///
/// Every `[types]` entry gets its own adapter. Types without an entry fall
/// back to `settings.default_provider` when set; otherwise planning rejects
/// them.
pub fn registry(file: &DeclarationFile) -> Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    for (resource_type, config) in &file.types {
        registry = match config.provider {
            ProviderKind::Simulated => registry.register(
                resource_type.clone(),
                Arc::new(SimulatedProvider::new(resource_type, config.clone())?),
            ),
            ProviderKind::Command => registry.register(
                resource_type.clone(),
                Arc::new(CommandProvider::new(resource_type, config.clone())?),
            ),
        };
    }

    match file.settings.default_provider {
        None => {}
        Some(ProviderKind::Simulated) => {
            registry = registry
                .with_fallback(Arc::new(SimulatedProvider::new("*", TypeConfig::default())?));
        }
        Some(ProviderKind::Command) => {
            bail!("default_provider = \"command\" is not supported; configure commands per type")
        }
    }

    log::debug!("Provider registry: {registry:?}");
    Ok(registry)
}

/// Classify a change using a type's `replace_on` list
///
/// `can_update` is false for adapters that have no way to modify in place.
pub(crate) fn classify(config: &TypeConfig, old: &Inputs, new: &Inputs, can_update: bool) -> DiffVerdict {
    let changed = changed_properties(old, new);
    if changed.is_empty() {
        DiffVerdict::NoChange
    } else if !can_update || changed.iter().any(|key| config.replace_on.contains(key)) {
        DiffVerdict::RequiresReplace
    } else {
        DiffVerdict::InPlaceUpdate
    }
}

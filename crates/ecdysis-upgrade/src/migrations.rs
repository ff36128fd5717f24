// crates/ecdysis-upgrade/src/migrations.rs
//
// Migration handler registry.
//
// Each upgrade name maps to a handler that performs the version-specific work
// in two stages: a startup stage run by the new binary before consensus
// resumes, and a consensus stage run at the recorded upgrade height with the
// consensus driver's private state. Handlers are registered by name when the
// node is built; the upgrade manager looks them up by descriptor name.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ecdysis_core::error::EcdysisError;
use ecdysis_core::upgrade::PendingUpgrade;

/// Context handed to both handler stages.
#[derive(Debug, Clone)]
pub struct MigrationContext {
    /// Snapshot of the pending upgrade being executed.
    pub upgrade: PendingUpgrade,
    /// The node's data directory.
    pub data_dir: PathBuf,
}

impl MigrationContext {
    pub fn new(upgrade: &PendingUpgrade, data_dir: &Path) -> Self {
        Self {
            upgrade: upgrade.clone(),
            data_dir: data_dir.to_path_buf(),
        }
    }

    /// Name of the upgrade being executed.
    pub fn name(&self) -> &str {
        &self.upgrade.descriptor.name
    }
}

/// Version-specific upgrade logic.
///
/// `C` is the consensus driver's private context, passed through opaquely to
/// the consensus stage. Errors are propagated verbatim by the upgrade manager
/// and are never retried there.
pub trait MigrationHandler<C>: Send + Sync {
    /// Run work that must happen once on the new binary, before consensus resumes.
    fn startup_upgrade(&self, ctx: &MigrationContext) -> Result<(), EcdysisError>;

    /// Run work that must happen inside consensus at the upgrade height.
    fn consensus_upgrade(&self, ctx: &MigrationContext, private: &mut C) -> Result<(), EcdysisError>;
}

/// Name-keyed registry of migration handlers.
pub struct MigrationRegistry<C> {
    handlers: BTreeMap<String, Arc<dyn MigrationHandler<C>>>,
}

impl<C> fmt::Debug for MigrationRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationRegistry")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<C> Default for MigrationRegistry<C> {
    fn default() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }
}

impl<C> MigrationRegistry<C> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `name`. Fails if the name is already taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn MigrationHandler<C>>,
    ) -> Result<(), EcdysisError> {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(EcdysisError::DuplicateHandler(name));
        }
        tracing::debug!(name = %name, "registered migration handler");
        self.handlers.insert(name, handler);
        Ok(())
    }

    /// Look up the handler registered under `name`.
    pub fn get_handler(&self, name: &str) -> Result<Arc<dyn MigrationHandler<C>>, EcdysisError> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| EcdysisError::HandlerNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered handler names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}

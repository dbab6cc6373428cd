//! Cache invalidation trigger.
//!
//! Called after a write has been persisted. Bumps the version of the changed
//! resource and of every resource depending on it; nothing is deleted.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::types::Resource;

use super::config::CacheConfig;
use super::deps;
use super::version::VersionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Created,
    Updated,
    Deleted,
    /// Explicit invalidation without a data change.
    Manual,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MutationKind::Created => "created",
            MutationKind::Updated => "updated",
            MutationKind::Deleted => "deleted",
            MutationKind::Manual => "manual",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct InvalidationTrigger {
    config: CacheConfig,
    versions: Arc<VersionStore>,
}

impl InvalidationTrigger {
    pub fn new(config: CacheConfig, versions: Arc<VersionStore>) -> Self {
        Self { config, versions }
    }

    /// Bumps `resource` and its dependents.
    ///
    /// Returns the `(resource, new_version)` pairs that were applied; a bump
    /// the backend rejects is logged and left out.
    pub async fn resource_changed(
        &self,
        resource: Resource,
        kind: MutationKind,
    ) -> Vec<(Resource, u64)> {
        if !self.config.enabled {
            debug!(
                resource = resource.as_str(),
                mutation = kind.as_str(),
                "Cache trigger skipped: cache disabled"
            );
            return Vec::new();
        }

        let mut applied = Vec::new();
        for target in deps::affected(resource) {
            if let Ok(version) = self.versions.increment_version(target).await {
                applied.push((target, version));
            }
        }

        info!(
            resource = resource.as_str(),
            mutation = kind.as_str(),
            bumped = applied.len(),
            "cache invalidated"
        );
        applied
    }

    pub fn versions(&self) -> &Arc<VersionStore> {
        &self.versions
    }
}

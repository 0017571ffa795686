use super::catalog::{CatalogEntry, CatalogVersion};
use super::domain::{UserId, UserProfile};

/// Profile storage abstraction so the service can be exercised in isolation.
pub trait ProfileStore: Send + Sync {
    fn fetch(&self, user_id: &UserId) -> Result<Option<UserProfile>, RepositoryError>;
    fn upsert(&self, profile: UserProfile) -> Result<UserProfile, RepositoryError>;
}

/// Source of truth for the scheme catalog.
pub trait CatalogSource: Send + Sync {
    /// `installed` is the live catalog version, if any. Sources without their own revision
    /// numbering publish the version after it, so a reload always follows a direct ingest.
    fn snapshot(
        &self,
        installed: Option<CatalogVersion>,
    ) -> Result<CatalogRelease, RepositoryError>;
}

/// Versioned catalog contents as published by a catalog source.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogRelease {
    pub version: CatalogVersion,
    pub schemes: Vec<CatalogEntry>,
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

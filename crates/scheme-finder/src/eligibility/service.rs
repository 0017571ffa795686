use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use super::cache::{CacheLookup, CacheStats, CachedEligibility, EligibilityCache, EntryState};
use super::catalog::{
    CatalogEntry, CatalogHandle, CatalogIngestError, CatalogSnapshot, CatalogVersion,
    IngestReport,
};
use super::domain::{
    EligibilityProfile, ProfileError, ProfileField, ProfileUpdate, Scheme, SchemeId, UserId,
    UserProfile,
};
use super::evaluation::{EligibilityEngine, EligibilityExplanation};
use super::repository::{CatalogSource, ProfileStore, RepositoryError};

/// Service composing the profile store, catalog snapshot, result cache, and engine.
pub struct EligibilityService<P, S, C> {
    profiles: Arc<P>,
    catalog_source: Arc<S>,
    cache: Arc<C>,
    catalog: CatalogHandle,
    engine: EligibilityEngine,
    ingest_lock: Mutex<()>,
    profile_lock: Mutex<()>,
}

/// Eligible subset of a catalog for one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EligibleSchemes {
    pub user_id: UserId,
    pub catalog_version: CatalogVersion,
    pub schemes: Vec<Scheme>,
    pub from_cache: bool,
}

impl EligibleSchemes {
    pub fn names(&self) -> Vec<&str> {
        self.schemes.iter().map(|scheme| scheme.name.as_str()).collect()
    }
}

/// Per-scheme explanation enriched with the scheme identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemeExplanation {
    pub scheme_id: SchemeId,
    pub scheme_name: String,
    pub catalog_version: CatalogVersion,
    #[serde(flatten)]
    pub explanation: EligibilityExplanation,
}

impl<P, S, C> EligibilityService<P, S, C>
where
    P: ProfileStore + 'static,
    S: CatalogSource + 'static,
    C: EligibilityCache + 'static,
{
    /// The catalog starts unloaded; call `reload_catalog` or `ingest_catalog` before serving.
    pub fn new(profiles: Arc<P>, catalog_source: Arc<S>, cache: Arc<C>) -> Self {
        Self {
            profiles,
            catalog_source,
            cache,
            catalog: CatalogHandle::default(),
            engine: EligibilityEngine::new(),
            ingest_lock: Mutex::new(()),
            profile_lock: Mutex::new(()),
        }
    }

    /// Pull the latest release from the catalog source and swap it in.
    pub fn reload_catalog(&self) -> Result<IngestReport, EligibilityError> {
        let _ingest = self.ingest_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let release = self.catalog_source.snapshot(self.catalog.version())?;
        self.install(release.version, release.schemes)
    }

    /// Change hook for catalog sources; versions already installed are ignored.
    pub fn on_catalog_changed(
        &self,
        version: CatalogVersion,
    ) -> Result<Option<IngestReport>, EligibilityError> {
        if self
            .catalog
            .version()
            .is_some_and(|current| current >= version)
        {
            debug!(%version, "catalog change already applied");
            return Ok(None);
        }
        self.reload_catalog().map(Some)
    }

    /// Ingest entries supplied directly, assigning the next catalog version.
    pub fn ingest_catalog<I>(&self, entries: I) -> Result<IngestReport, EligibilityError>
    where
        I: IntoIterator,
        I::Item: Into<CatalogEntry>,
    {
        let _ingest = self.ingest_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let version = self.catalog.next_version();
        self.install(version, entries)
    }

    fn install<I>(
        &self,
        version: CatalogVersion,
        entries: I,
    ) -> Result<IngestReport, EligibilityError>
    where
        I: IntoIterator,
        I::Item: Into<CatalogEntry>,
    {
        let (snapshot, report) = CatalogSnapshot::build(version, entries);
        self.catalog.install(snapshot)?;
        self.cache.invalidate_all();
        info!(
            %version,
            loaded = report.loaded,
            rejected = report.rejected.len(),
            "catalog ingested"
        );
        Ok(report)
    }

    pub fn catalog(&self) -> Result<Arc<CatalogSnapshot>, EligibilityError> {
        self.catalog
            .current()
            .ok_or(EligibilityError::CatalogUnavailable)
    }

    /// Read-through eligible set; a stale or missing entry is recomputed before responding.
    pub fn eligible_schemes(&self, user_id: &UserId) -> Result<EligibleSchemes, EligibilityError> {
        let catalog = self.catalog()?;

        let generation = match self.cache.get(user_id, catalog.version()) {
            CacheLookup::Fresh(cached) => {
                debug!(%user_id, version = %catalog.version(), "eligibility served from cache");
                let schemes = cached
                    .scheme_ids
                    .iter()
                    .filter_map(|id| catalog.scheme(id).cloned())
                    .collect();
                return Ok(EligibleSchemes {
                    user_id: user_id.clone(),
                    catalog_version: catalog.version(),
                    schemes,
                    from_cache: true,
                });
            }
            CacheLookup::Stale { generation } | CacheLookup::Absent { generation } => generation,
        };

        // The generation is captured before the profile read so a concurrent update wins.
        let profile = self.eligibility_profile(user_id)?;
        let schemes: Vec<Scheme> = self
            .engine
            .eligible_schemes(&profile, &catalog)
            .into_iter()
            .cloned()
            .collect();

        let stored = self.cache.put(
            user_id,
            generation,
            CachedEligibility {
                catalog_version: catalog.version(),
                scheme_ids: schemes.iter().map(|scheme| scheme.id.clone()).collect(),
                computed_at: Utc::now(),
            },
        );
        debug!(
            %user_id,
            version = %catalog.version(),
            eligible = schemes.len(),
            stored,
            "eligibility recomputed"
        );

        Ok(EligibleSchemes {
            user_id: user_id.clone(),
            catalog_version: catalog.version(),
            schemes,
            from_cache: false,
        })
    }

    pub fn evaluate(
        &self,
        user_id: &UserId,
        scheme_id: &SchemeId,
    ) -> Result<bool, EligibilityError> {
        let catalog = self.catalog()?;
        let scheme = catalog
            .scheme(scheme_id)
            .ok_or_else(|| EligibilityError::SchemeNotFound(scheme_id.clone()))?;
        let profile = self.eligibility_profile(user_id)?;
        Ok(self.engine.evaluate(&profile, &scheme.criteria))
    }

    pub fn explain(
        &self,
        user_id: &UserId,
        scheme_id: &SchemeId,
    ) -> Result<SchemeExplanation, EligibilityError> {
        let catalog = self.catalog()?;
        let scheme = catalog
            .scheme(scheme_id)
            .ok_or_else(|| EligibilityError::SchemeNotFound(scheme_id.clone()))?;
        let profile = self.eligibility_profile(user_id)?;

        Ok(SchemeExplanation {
            scheme_id: scheme.id.clone(),
            scheme_name: scheme.name.clone(),
            catalog_version: catalog.version(),
            explanation: self.engine.explain(&profile, &scheme.criteria),
        })
    }

    pub fn profile(&self, user_id: &UserId) -> Result<UserProfile, EligibilityError> {
        self.profiles
            .fetch(user_id)?
            .ok_or_else(|| EligibilityError::ProfileNotFound(user_id.clone()))
    }

    /// Apply a profile update; the cached result is invalidated before this returns.
    pub fn update_profile(
        &self,
        user_id: &UserId,
        update: ProfileUpdate,
    ) -> Result<UserProfile, EligibilityError> {
        let _write = self.profile_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut profile = self
            .profiles
            .fetch(user_id)?
            .unwrap_or_else(|| UserProfile::new(user_id.clone()));

        let changed = profile
            .apply(update)
            .map_err(|error| profile_error(user_id, error))?;
        let stored = self.profiles.upsert(profile)?;

        if changed {
            self.cache.invalidate(user_id);
            info!(%user_id, "profile eligibility inputs changed");
        }
        Ok(stored)
    }

    /// Change hook for profile stores written outside this service.
    pub fn on_profile_eligibility_fields_changed(&self, user_id: &UserId) {
        self.cache.invalidate(user_id);
    }

    pub fn invalidate(&self, user_id: &UserId) {
        self.cache.invalidate(user_id);
    }

    pub fn cache_state(&self, user_id: &UserId) -> Result<EntryState, EligibilityError> {
        let catalog = self.catalog()?;
        Ok(self.cache.state(user_id, catalog.version()))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn eligibility_profile(
        &self,
        user_id: &UserId,
    ) -> Result<EligibilityProfile, EligibilityError> {
        let profile = self.profile(user_id)?;
        EligibilityProfile::try_from(&profile).map_err(|error| profile_error(user_id, error))
    }
}

fn profile_error(user_id: &UserId, error: ProfileError) -> EligibilityError {
    match error {
        ProfileError::Incomplete { missing } => EligibilityError::ProfileIncomplete {
            user_id: user_id.clone(),
            missing,
        },
        other => EligibilityError::InvalidProfile(other),
    }
}

/// Error raised by the eligibility service.
#[derive(Debug, thiserror::Error)]
pub enum EligibilityError {
    #[error("profile for {user_id} is incomplete")]
    ProfileIncomplete {
        user_id: UserId,
        missing: Vec<ProfileField>,
    },
    #[error("no scheme catalog has been loaded")]
    CatalogUnavailable,
    #[error("no profile found for {0}")]
    ProfileNotFound(UserId),
    #[error("scheme {0} is not in the catalog")]
    SchemeNotFound(SchemeId),
    #[error(transparent)]
    InvalidProfile(ProfileError),
    #[error(transparent)]
    Catalog(#[from] CatalogIngestError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

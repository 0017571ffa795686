//! Welfare scheme eligibility: profile snapshots, catalog ingest, rule evaluation, and the
//! per-user result cache that stays coherent with profile and catalog mutation.

pub mod cache;
pub mod catalog;
pub mod domain;
pub mod evaluation;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use cache::{
    CacheLookup, CacheStats, CachedEligibility, EligibilityCache, EntryState,
    InMemoryEligibilityCache,
};
pub use catalog::{
    CatalogEntry, CatalogHandle, CatalogImporter, CatalogIngestError, CatalogSnapshot,
    CatalogVersion, IngestReport, RawCustomCondition, RejectedScheme, SchemeDefinition,
};
pub use domain::{
    ConditionValue, CustomCondition, EligibilityProfile, Gender, IncomeBracket,
    MalformedCriterion, ProfileError, ProfileField, ProfileUpdate, ProfileValue, Scheme,
    SchemeEligibilityCriteria, SchemeId, SchemeLevel, StateCode, UserId, UserProfile,
};
pub use evaluation::{CriterionCheck, CriterionGroup, EligibilityEngine, EligibilityExplanation};
pub use repository::{CatalogRelease, CatalogSource, ProfileStore, RepositoryError};
pub use router::eligibility_router;
pub use service::{EligibilityError, EligibilityService, EligibleSchemes, SchemeExplanation};

//! Immutable, versioned scheme catalog snapshots.
//!
//! Ingest validates every entry independently; a scheme that fails to decode or carries a
//! malformed criterion is reported and left out while the rest of the catalog loads. The
//! resulting snapshot is installed behind an `Arc` swap so in-flight evaluations keep the view
//! they started with.

mod definition;
mod import;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::{Scheme, SchemeId};

pub use definition::{CatalogEntry, RawCustomCondition, SchemeDefinition};
pub use import::CatalogImporter;

/// Monotonic catalog revision; cache entries are keyed against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CatalogVersion(pub u64);

impl CatalogVersion {
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for CatalogVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Point-in-time view of every scheme and its criteria.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    version: CatalogVersion,
    loaded_at: DateTime<Utc>,
    schemes: Vec<Scheme>,
    index: HashMap<SchemeId, usize>,
}

impl CatalogSnapshot {
    pub fn version(&self) -> CatalogVersion {
        self.version
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn schemes(&self) -> &[Scheme] {
        &self.schemes
    }

    pub fn scheme(&self, id: &SchemeId) -> Option<&Scheme> {
        self.index.get(id).map(|position| &self.schemes[*position])
    }

    pub fn len(&self) -> usize {
        self.schemes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemes.is_empty()
    }

    /// Validate entries into a snapshot, collecting per-scheme rejections.
    pub fn build<I>(version: CatalogVersion, entries: I) -> (Self, IngestReport)
    where
        I: IntoIterator,
        I::Item: Into<CatalogEntry>,
    {
        let mut schemes = Vec::new();
        let mut index = HashMap::new();
        let mut rejected = Vec::new();

        for entry in entries {
            let definition = match entry.into() {
                CatalogEntry::Definition(definition) => definition,
                CatalogEntry::Unreadable {
                    scheme_id,
                    name,
                    reason,
                } => {
                    warn!(%version, %scheme_id, %reason, "unreadable scheme entry rejected");
                    rejected.push(RejectedScheme {
                        scheme_id,
                        name,
                        reason,
                    });
                    continue;
                }
            };

            let scheme_id = definition.scheme_id();
            match definition.compile() {
                Ok(scheme) if index.contains_key(&scheme.id) => {
                    warn!(%version, %scheme_id, "duplicate scheme id rejected");
                    rejected.push(RejectedScheme {
                        scheme_id,
                        name: definition.name,
                        reason: "duplicate scheme id".to_string(),
                    });
                }
                Ok(scheme) => {
                    index.insert(scheme.id.clone(), schemes.len());
                    schemes.push(scheme);
                }
                Err(error) => {
                    warn!(%version, %scheme_id, %error, "scheme rejected at ingest");
                    rejected.push(RejectedScheme {
                        scheme_id,
                        name: definition.name,
                        reason: error.to_string(),
                    });
                }
            }
        }

        let report = IngestReport {
            version,
            loaded: schemes.len(),
            rejected,
        };
        let snapshot = Self {
            version,
            loaded_at: Utc::now(),
            schemes,
            index,
        };
        (snapshot, report)
    }
}

/// Scheme left out of a snapshot together with the validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedScheme {
    pub scheme_id: SchemeId,
    pub name: String,
    pub reason: String,
}

/// Summary of a catalog ingest, returned to operators and the HTTP caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub version: CatalogVersion,
    pub loaded: usize,
    pub rejected: Vec<RejectedScheme>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogIngestError {
    #[error("catalog {offered} is not newer than installed catalog {current}")]
    StaleVersion {
        current: CatalogVersion,
        offered: CatalogVersion,
    },
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid catalog JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid catalog CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("unsupported catalog format '{0}'")]
    UnsupportedFormat(String),
}

/// Atomically swapped pointer to the live catalog snapshot.
#[derive(Debug, Default)]
pub struct CatalogHandle {
    current: RwLock<Option<Arc<CatalogSnapshot>>>,
}

impl CatalogHandle {
    pub fn current(&self) -> Option<Arc<CatalogSnapshot>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn version(&self) -> Option<CatalogVersion> {
        self.current().map(|snapshot| snapshot.version())
    }

    pub fn next_version(&self) -> CatalogVersion {
        self.version()
            .map(CatalogVersion::next)
            .unwrap_or(CatalogVersion(1))
    }

    /// Install a newer snapshot; older or equal versions are refused.
    pub fn install(
        &self,
        snapshot: CatalogSnapshot,
    ) -> Result<Arc<CatalogSnapshot>, CatalogIngestError> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = guard.as_ref() {
            if snapshot.version <= current.version {
                return Err(CatalogIngestError::StaleVersion {
                    current: current.version,
                    offered: snapshot.version,
                });
            }
        }

        let snapshot = Arc::new(snapshot);
        *guard = Some(snapshot.clone());
        info!(
            version = %snapshot.version,
            schemes = snapshot.len(),
            "catalog snapshot installed"
        );
        Ok(snapshot)
    }
}

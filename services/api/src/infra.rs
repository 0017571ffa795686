use metrics_exporter_prometheus::PrometheusHandle;
use scheme_finder::eligibility::{
    CatalogEntry, CatalogImporter, CatalogIngestError, CatalogRelease, CatalogSource,
    CatalogVersion, ProfileStore, ProfileValue, RepositoryError, UserId, UserProfile,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};

const SEED_CATALOG: &str = include_str!("../data/seed_catalog.json");

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryProfileStore {
    records: Arc<Mutex<HashMap<UserId, UserProfile>>>,
}

impl ProfileStore for InMemoryProfileStore {
    fn fetch(&self, user_id: &UserId) -> Result<Option<UserProfile>, RepositoryError> {
        let guard = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.get(user_id).cloned())
    }

    fn upsert(&self, profile: UserProfile) -> Result<UserProfile, RepositoryError> {
        let mut guard = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        guard.insert(profile.user_id.clone(), profile.clone());
        Ok(profile)
    }
}

/// Catalog read from `APP_CATALOG_PATH` when configured, otherwise the bundled seed.
///
/// Every read is published as the version after the installed one, so a reload supersedes
/// whatever is live, including a catalog posted over HTTP.
pub(crate) struct FileCatalogSource {
    path: Option<PathBuf>,
}

impl FileCatalogSource {
    pub(crate) fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub(crate) fn describe(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => "bundled seed catalog".to_string(),
        }
    }
}

impl CatalogSource for FileCatalogSource {
    fn snapshot(
        &self,
        installed: Option<CatalogVersion>,
    ) -> Result<CatalogRelease, RepositoryError> {
        let schemes = load_catalog(self.path.as_ref()).map_err(|err| {
            RepositoryError::Unavailable(format!("{}: {err}", self.describe()))
        })?;

        Ok(CatalogRelease {
            version: installed
                .map(CatalogVersion::next)
                .unwrap_or(CatalogVersion(1)),
            schemes,
        })
    }
}

pub(crate) fn seed_catalog() -> Result<Vec<CatalogEntry>, CatalogIngestError> {
    CatalogImporter::from_json_reader(SEED_CATALOG.as_bytes())
}

pub(crate) fn load_catalog(
    path: Option<&PathBuf>,
) -> Result<Vec<CatalogEntry>, CatalogIngestError> {
    match path {
        Some(path) => CatalogImporter::from_path(path),
        None => seed_catalog(),
    }
}

/// `key=value` profile attribute as typed on the command line.
///
/// `true`/`false` become flags, numbers become numbers, and comma separated values a list.
pub(crate) fn parse_attribute(raw: &str) -> Result<(String, ProfileValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("attribute name missing in '{raw}'"));
    }

    let value = value.trim();
    let parsed = match value {
        "true" => ProfileValue::Flag(true),
        "false" => ProfileValue::Flag(false),
        _ if value.contains(',') => ProfileValue::List(
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        _ => match value.parse::<f64>() {
            Ok(number) if number.is_finite() => ProfileValue::Number(number),
            _ => ProfileValue::Text(value.to_string()),
        },
    };

    Ok((key.to_string(), parsed))
}

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::{json, Value};

use crate::eligibility::cache::InMemoryEligibilityCache;
use crate::eligibility::catalog::{
    CatalogEntry, CatalogVersion, RawCustomCondition, SchemeDefinition,
};
use crate::eligibility::domain::{
    EligibilityProfile, Gender, IncomeBracket, ProfileValue, SchemeLevel, StateCode, UserId,
    UserProfile,
};
use crate::eligibility::repository::{
    CatalogRelease, CatalogSource, ProfileStore, RepositoryError,
};
use crate::eligibility::service::EligibilityService;

pub(super) type TestService =
    EligibilityService<MemoryProfiles, MemoryCatalog, InMemoryEligibilityCache>;

pub(super) fn user_id(raw: &str) -> UserId {
    UserId(raw.to_string())
}

pub(super) fn eligibility_profile(
    age: u8,
    state: StateCode,
    gender: Gender,
    income_bracket: IncomeBracket,
) -> EligibilityProfile {
    EligibilityProfile {
        user_id: user_id("citizen-1"),
        age,
        state,
        gender,
        income_bracket,
        attributes: BTreeMap::new(),
    }
}

/// The Gujarat farmer used across the end-to-end scenarios.
pub(super) fn gujarat_farmer(raw_id: &str) -> UserProfile {
    let mut profile = UserProfile::new(user_id(raw_id));
    profile.age = Some(45);
    profile.state = Some(StateCode::Gujarat);
    profile.gender = Some(Gender::Male);
    profile.income_bracket = Some(IncomeBracket::BelowOneLakh);
    profile.attributes.insert(
        "occupation".to_string(),
        ProfileValue::Text("farmer".to_string()),
    );
    profile
}

pub(super) fn farmer_scheme() -> SchemeDefinition {
    let mut scheme = SchemeDefinition::named("Farmer Scheme");
    scheme.age_min = Some(18);
    scheme.age_max = Some(60);
    scheme.states = Some(vec!["GJ".to_string()]);
    scheme.income_brackets = Some(vec!["BELOW_1_LAKH".to_string()]);
    scheme
}

pub(super) fn women_scheme() -> SchemeDefinition {
    let mut scheme = SchemeDefinition::named("Women Scheme");
    scheme.genders = Some(vec!["Female".to_string()]);
    scheme
}

pub(super) fn senior_scheme() -> SchemeDefinition {
    let mut scheme = SchemeDefinition::named("Senior Scheme");
    scheme.age_min = Some(60);
    scheme
}

pub(super) fn universal_scheme() -> SchemeDefinition {
    let mut scheme = SchemeDefinition::named("Universal Health Cover");
    scheme.level = SchemeLevel::Central;
    scheme
}

pub(super) fn malformed_scheme() -> SchemeDefinition {
    let mut scheme = SchemeDefinition::named("Artisan Toolkit Grant");
    scheme.custom_conditions.push(RawCustomCondition {
        field: "occupation".to_string(),
        operator: "soundsLike".to_string(),
        value: json!("artisan"),
    });
    scheme
}

pub(super) fn sample_catalog() -> Vec<SchemeDefinition> {
    vec![farmer_scheme(), women_scheme(), senior_scheme()]
}

pub(super) fn build_service() -> (TestService, Arc<MemoryProfiles>, Arc<MemoryCatalog>) {
    let profiles = Arc::new(MemoryProfiles::default());
    let catalog = Arc::new(MemoryCatalog::new(1, sample_catalog()));
    let cache = Arc::new(InMemoryEligibilityCache::default());
    let service = EligibilityService::new(profiles.clone(), catalog.clone(), cache);
    (service, profiles, catalog)
}

/// Service with the sample catalog loaded and the Gujarat farmer stored as `farmer-1`.
pub(super) fn loaded_service() -> (TestService, Arc<MemoryProfiles>, Arc<MemoryCatalog>) {
    let (service, profiles, catalog) = build_service();
    profiles.insert(gujarat_farmer("farmer-1"));
    service.reload_catalog().expect("sample catalog loads");
    (service, profiles, catalog)
}

#[derive(Default, Clone)]
pub(super) struct MemoryProfiles {
    records: Arc<Mutex<HashMap<UserId, UserProfile>>>,
}

impl MemoryProfiles {
    /// Writes behind the service's back, as an external profile writer would.
    pub(super) fn insert(&self, profile: UserProfile) {
        self.records
            .lock()
            .expect("profile mutex poisoned")
            .insert(profile.user_id.clone(), profile);
    }
}

impl ProfileStore for MemoryProfiles {
    fn fetch(&self, user_id: &UserId) -> Result<Option<UserProfile>, RepositoryError> {
        let guard = self.records.lock().expect("profile mutex poisoned");
        Ok(guard.get(user_id).cloned())
    }

    fn upsert(&self, profile: UserProfile) -> Result<UserProfile, RepositoryError> {
        self.insert(profile.clone());
        Ok(profile)
    }
}

pub(super) struct MemoryCatalog {
    release: Mutex<CatalogRelease>,
}

impl MemoryCatalog {
    pub(super) fn new(version: u64, schemes: Vec<SchemeDefinition>) -> Self {
        Self {
            release: Mutex::new(release(version, schemes)),
        }
    }

    pub(super) fn publish(&self, version: u64, schemes: Vec<SchemeDefinition>) {
        *self.release.lock().expect("catalog mutex poisoned") = release(version, schemes);
    }
}

impl CatalogSource for MemoryCatalog {
    fn snapshot(
        &self,
        _installed: Option<CatalogVersion>,
    ) -> Result<CatalogRelease, RepositoryError> {
        Ok(self.release.lock().expect("catalog mutex poisoned").clone())
    }
}

fn release(version: u64, schemes: Vec<SchemeDefinition>) -> CatalogRelease {
    CatalogRelease {
        version: CatalogVersion(version),
        schemes: schemes.into_iter().map(CatalogEntry::from).collect(),
    }
}

pub(super) struct UnavailableProfiles;

impl ProfileStore for UnavailableProfiles {
    fn fetch(&self, _user_id: &UserId) -> Result<Option<UserProfile>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn upsert(&self, _profile: UserProfile) -> Result<UserProfile, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

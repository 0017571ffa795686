use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Router,
};
use serde_json::{json, Value};

use super::cache::EligibilityCache;
use super::catalog::CatalogImporter;
use super::domain::{ProfileUpdate, SchemeId, UserId};
use super::repository::{CatalogSource, ProfileStore};
use super::service::{EligibilityError, EligibilityService};

/// Router builder exposing eligibility lookups, profile updates, and catalog ingest.
pub fn eligibility_router<P, S, C>(service: Arc<EligibilityService<P, S, C>>) -> Router
where
    P: ProfileStore + 'static,
    S: CatalogSource + 'static,
    C: EligibilityCache + 'static,
{
    Router::new()
        .route(
            "/api/v1/users/:user_id/eligible-schemes",
            get(eligible_schemes_handler::<P, S, C>),
        )
        .route(
            "/api/v1/users/:user_id/schemes/:scheme_id/eligibility",
            get(explain_handler::<P, S, C>),
        )
        .route(
            "/api/v1/users/:user_id/profile",
            put(update_profile_handler::<P, S, C>),
        )
        .route(
            "/api/v1/users/:user_id/eligibility-cache",
            delete(invalidate_handler::<P, S, C>),
        )
        .route("/api/v1/catalog", post(ingest_catalog_handler::<P, S, C>))
        .route(
            "/api/v1/eligibility/cache-stats",
            get(cache_stats_handler::<P, S, C>),
        )
        .with_state(service)
}

pub(crate) async fn eligible_schemes_handler<P, S, C>(
    State(service): State<Arc<EligibilityService<P, S, C>>>,
    Path(user_id): Path<String>,
) -> Response
where
    P: ProfileStore + 'static,
    S: CatalogSource + 'static,
    C: EligibilityCache + 'static,
{
    match service.eligible_schemes(&UserId(user_id)) {
        Ok(eligible) => (StatusCode::OK, axum::Json(eligible)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn explain_handler<P, S, C>(
    State(service): State<Arc<EligibilityService<P, S, C>>>,
    Path((user_id, scheme_id)): Path<(String, String)>,
) -> Response
where
    P: ProfileStore + 'static,
    S: CatalogSource + 'static,
    C: EligibilityCache + 'static,
{
    match service.explain(&UserId(user_id), &SchemeId(scheme_id)) {
        Ok(explanation) => (StatusCode::OK, axum::Json(explanation)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn update_profile_handler<P, S, C>(
    State(service): State<Arc<EligibilityService<P, S, C>>>,
    Path(user_id): Path<String>,
    axum::Json(update): axum::Json<ProfileUpdate>,
) -> Response
where
    P: ProfileStore + 'static,
    S: CatalogSource + 'static,
    C: EligibilityCache + 'static,
{
    match service.update_profile(&UserId(user_id), update) {
        Ok(profile) => {
            let missing = profile.missing_fields();
            let payload = json!({
                "profile": profile,
                "complete": missing.is_empty(),
                "missing": missing,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn invalidate_handler<P, S, C>(
    State(service): State<Arc<EligibilityService<P, S, C>>>,
    Path(user_id): Path<String>,
) -> Response
where
    P: ProfileStore + 'static,
    S: CatalogSource + 'static,
    C: EligibilityCache + 'static,
{
    service.invalidate(&UserId(user_id));
    StatusCode::NO_CONTENT.into_response()
}

pub(crate) async fn ingest_catalog_handler<P, S, C>(
    State(service): State<Arc<EligibilityService<P, S, C>>>,
    axum::Json(entries): axum::Json<Vec<Value>>,
) -> Response
where
    P: ProfileStore + 'static,
    S: CatalogSource + 'static,
    C: EligibilityCache + 'static,
{
    match service.ingest_catalog(CatalogImporter::from_json_values(entries)) {
        Ok(report) => (StatusCode::CREATED, axum::Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn cache_stats_handler<P, S, C>(
    State(service): State<Arc<EligibilityService<P, S, C>>>,
) -> Response
where
    P: ProfileStore + 'static,
    S: CatalogSource + 'static,
    C: EligibilityCache + 'static,
{
    (StatusCode::OK, axum::Json(service.cache_stats())).into_response()
}

pub(crate) fn error_response(error: EligibilityError) -> Response {
    match error {
        EligibilityError::ProfileIncomplete { user_id, missing } => {
            let payload = json!({
                "error": "profile incomplete",
                "user_id": user_id,
                "missing": missing,
            });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        EligibilityError::CatalogUnavailable => {
            let payload = json!({ "error": EligibilityError::CatalogUnavailable.to_string() });
            (StatusCode::SERVICE_UNAVAILABLE, axum::Json(payload)).into_response()
        }
        error @ (EligibilityError::ProfileNotFound(_) | EligibilityError::SchemeNotFound(_)) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        error @ (EligibilityError::InvalidProfile(_) | EligibilityError::Catalog(_)) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        other => {
            let payload = json!({ "error": other.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

//! Request handlers for the directory and geo endpoints

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::ApiError;
use super::AppState;
use crate::db::{self, DoctorDetail, DoctorMatch, DoctorSummary, Hospital, Page, Review, Specialty};
use crate::geo_cache::GeocodeResult;
use crate::validation::{validate_page, validate_review, validate_search_name, ReviewSubmission};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HospitalQuery {
    pub specialty_id: Option<i64>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DoctorQuery {
    pub hospital_id: Option<i64>,
    pub specialty_id: Option<i64>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DoctorDetailQuery {
    pub hospital_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewQuery {
    pub doctor_id: Option<i64>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GeocodeQuery {
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StaticMapQuery {
    pub lon: f64,
    pub lat: f64,
    pub point: Option<bool>,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// --- Directory ---

pub async fn list_specialties(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Specialty>>, ApiError> {
    let page = validate_page(query.skip, query.limit)?;
    Ok(Json(db::list_specialties(&state.pool, page).await?))
}

pub async fn get_specialty(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Specialty>, ApiError> {
    db::get_specialty(&state.pool, id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

pub async fn list_hospitals(
    State(state): State<AppState>,
    Query(query): Query<HospitalQuery>,
) -> Result<Json<Page<Hospital>>, ApiError> {
    let page = validate_page(query.skip, query.limit)?;
    Ok(Json(db::list_hospitals(&state.pool, query.specialty_id, page).await?))
}

pub async fn get_hospital(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Hospital>, ApiError> {
    db::get_hospital(&state.pool, id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

pub async fn list_doctors(
    State(state): State<AppState>,
    Query(query): Query<DoctorQuery>,
) -> Result<Json<Page<DoctorSummary>>, ApiError> {
    let page = validate_page(query.skip, query.limit)?;
    let doctors = db::list_doctors(&state.pool, query.hospital_id, query.specialty_id, page).await?;
    Ok(Json(doctors))
}

pub async fn get_doctor(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<DoctorDetailQuery>,
) -> Result<Json<DoctorDetail>, ApiError> {
    let hospital_id = query
        .hospital_id
        .ok_or_else(|| ApiError::field("hospital_id", "is required"))?;

    db::get_doctor(&state.pool, id, hospital_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

pub async fn search_doctors(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<DoctorMatch>>, ApiError> {
    let name = validate_search_name(query.name.as_deref().unwrap_or_default())?;
    Ok(Json(db::search_doctors(&state.pool, &name).await?))
}

pub async fn list_reviews(
    State(state): State<AppState>,
    Query(query): Query<ReviewQuery>,
) -> Result<Json<Page<Review>>, ApiError> {
    let page = validate_page(query.skip, query.limit)?;
    Ok(Json(db::list_reviews(&state.pool, query.doctor_id, page).await?))
}

pub async fn create_review(
    State(state): State<AppState>,
    Json(submission): Json<ReviewSubmission>,
) -> Result<(StatusCode, Json<Review>), ApiError> {
    let review = validate_review(submission)?;
    let stored = db::create_review(&state.pool, &review).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn get_review(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Review>, ApiError> {
    db::get_review(&state.pool, id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

// --- Geo ---

/// The address exactly as supplied; the gateway does its own normalization
fn required_address(query: &GeocodeQuery) -> Result<&str, ApiError> {
    match query.address.as_deref() {
        Some(address) if !address.trim().is_empty() => Ok(address),
        _ => Err(ApiError::field("address", "must not be empty")),
    }
}

pub async fn geocode(
    State(state): State<AppState>,
    Query(query): Query<GeocodeQuery>,
) -> Result<Json<GeocodeResult>, ApiError> {
    let address = required_address(&query)?;
    Ok(Json(state.gateway.geocode(address).await?))
}

pub async fn invalidate_geocode(
    State(state): State<AppState>,
    Query(query): Query<GeocodeQuery>,
) -> Result<StatusCode, ApiError> {
    let address = required_address(&query)?;
    if state.gateway.invalidate(address)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

pub async fn static_map(
    State(state): State<AppState>,
    Query(query): Query<StaticMapQuery>,
) -> Result<Response, ApiError> {
    let with_marker = query.point.unwrap_or(true);
    let image = state.gateway.static_map(query.lon, query.lat, with_marker).await?;
    debug!("Proxying {} bytes of {}", image.bytes.len(), image.content_type);

    Ok(([(header::CONTENT_TYPE, image.content_type)], image.bytes).into_response())
}

//! # Cities API
//!
//! Read access to cities. A single city is returned with its points of
//! interest only when the caller asks for them.

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use utoipa::IntoParams;

use cityinfo_core::CityId;

use crate::error::{AppError, ProblemDetails};
use crate::extractors::extract_path;
use crate::models::{CityDto, CityWithoutPointsOfInterestDto};
use crate::negotiation::Accept;
use crate::routes::method_not_allowed;
use crate::state::AppState;

/// Route group name and OpenAPI tag.
pub const GROUP: &str = "cities";

/// Build the cities router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cities", get(get_cities).fallback(method_not_allowed))
        .route("/cities/:city_id", get(get_city).fallback(method_not_allowed))
}

/// Query string of `GET /cities/{cityId}`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct CityQuery {
    /// Return the city's points of interest as well.
    #[serde(default)]
    pub include_points_of_interest: bool,
}

/// GET /api/v{version}/cities
#[utoipa::path(
    get,
    path = "/api/v{version}/cities",
    params(("version" = String, Path, description = "API version")),
    responses(
        (status = 200, description = "All cities, without their points of interest", body = [CityWithoutPointsOfInterestDto]),
        (status = 401, description = "No valid bearer token", body = ProblemDetails),
        (status = 406, description = "No acceptable representation", body = ProblemDetails),
    ),
    tag = "cities"
)]
pub async fn get_cities(
    State(state): State<AppState>,
    accept: Accept,
) -> Result<Response, AppError> {
    let cities = state.repository.cities().await?;
    let body = state
        .projections
        .city_without_points_of_interest
        .map_all(&cities)?;
    state.negotiator.respond_many(&accept, StatusCode::OK, &body)
}

/// GET /api/v{version}/cities/{cityId}
#[utoipa::path(
    get,
    path = "/api/v{version}/cities/{cityId}",
    params(
        ("version" = String, Path, description = "API version"),
        ("cityId" = i32, Path, description = "The id of the city to get"),
        CityQuery,
    ),
    responses(
        (status = 200, description = "The city, with points of interest when requested", body = CityDto),
        (status = 400, description = "Malformed id or query", body = ProblemDetails),
        (status = 401, description = "No valid bearer token", body = ProblemDetails),
        (status = 404, description = "No such city", body = ProblemDetails),
    ),
    tag = "cities"
)]
pub async fn get_city(
    State(state): State<AppState>,
    accept: Accept,
    path: Result<Path<i32>, PathRejection>,
    query: Result<Query<CityQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let city_id = CityId::new(extract_path(path)?);
    let Query(query) = query.map_err(|err| AppError::BadRequest(err.body_text()))?;

    let city = state
        .repository
        .city(city_id, query.include_points_of_interest)
        .await?
        .ok_or_else(|| {
            tracing::info!(%city_id, "city not found");
            AppError::NotFound(format!("City with id {city_id} wasn't found."))
        })?;

    if query.include_points_of_interest {
        let body = state.projections.city.map(&city)?;
        state.negotiator.respond(&accept, StatusCode::OK, &body)
    } else {
        let body = state.projections.city_without_points_of_interest.map(&city)?;
        state.negotiator.respond(&accept, StatusCode::OK, &body)
    }
}

//! # Points of Interest API
//!
//! CRUD over the points of interest of one city. Every handler checks the
//! city first so that an unknown city and an unknown point of interest are
//! reported separately.

use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Router};

use cityinfo_core::{CityId, PointOfInterestId};

use crate::error::{AppError, ProblemDetails};
use crate::extractors::{extract_path, extract_validated, NegotiatedBody};
use crate::models::{
    PointOfInterestDto, PointOfInterestForCreationDto, PointOfInterestForUpdateDto,
};
use crate::negotiation::Accept;
use crate::routes::method_not_allowed;
use crate::state::AppState;
use crate::versioning::ResolvedVersion;

/// Route group name and OpenAPI tag.
pub const GROUP: &str = "pointsofinterest";

/// Build the points-of-interest router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/cities/:city_id/pointsofinterest",
            get(get_points_of_interest)
                .post(create_point_of_interest)
                .fallback(method_not_allowed),
        )
        .route(
            "/cities/:city_id/pointsofinterest/:point_of_interest_id",
            get(get_point_of_interest)
                .put(update_point_of_interest)
                .delete(delete_point_of_interest)
                .fallback(method_not_allowed),
        )
}

async fn ensure_city(state: &AppState, city_id: CityId) -> Result<(), AppError> {
    if state.repository.city_exists(city_id).await? {
        Ok(())
    } else {
        tracing::info!(%city_id, "city not found when accessing points of interest");
        Err(AppError::NotFound(format!("City with id {city_id} wasn't found.")))
    }
}

fn point_of_interest_not_found(city_id: CityId, id: PointOfInterestId) -> AppError {
    tracing::info!(%city_id, point_of_interest_id = %id, "point of interest not found");
    AppError::NotFound(format!(
        "Point of interest with id {id} wasn't found in city {city_id}."
    ))
}

fn ids(
    path: Result<Path<(i32, i32)>, PathRejection>,
) -> Result<(CityId, PointOfInterestId), AppError> {
    let (city_id, id) = extract_path(path)?;
    Ok((CityId::new(city_id), PointOfInterestId::new(id)))
}

/// GET /api/v{version}/cities/{cityId}/pointsofinterest
#[utoipa::path(
    get,
    path = "/api/v{version}/cities/{cityId}/pointsofinterest",
    params(
        ("version" = String, Path, description = "API version"),
        ("cityId" = i32, Path, description = "The id of the city"),
    ),
    responses(
        (status = 200, description = "The city's points of interest", body = [PointOfInterestDto]),
        (status = 401, description = "No valid bearer token", body = ProblemDetails),
        (status = 403, description = "Caller is not from Antwerp", body = ProblemDetails),
        (status = 404, description = "No such city", body = ProblemDetails),
    ),
    tag = "pointsofinterest"
)]
pub async fn get_points_of_interest(
    State(state): State<AppState>,
    accept: Accept,
    path: Result<Path<i32>, PathRejection>,
) -> Result<Response, AppError> {
    let city_id = CityId::new(extract_path(path)?);
    ensure_city(&state, city_id).await?;
    let points = state.repository.points_of_interest_for_city(city_id).await?;
    let body = state.projections.point_of_interest.map_all(&points)?;
    state.negotiator.respond_many(&accept, StatusCode::OK, &body)
}

/// GET /api/v{version}/cities/{cityId}/pointsofinterest/{pointOfInterestId}
#[utoipa::path(
    get,
    path = "/api/v{version}/cities/{cityId}/pointsofinterest/{pointOfInterestId}",
    params(
        ("version" = String, Path, description = "API version"),
        ("cityId" = i32, Path, description = "The id of the city"),
        ("pointOfInterestId" = i32, Path, description = "The id of the point of interest"),
    ),
    responses(
        (status = 200, description = "The point of interest", body = PointOfInterestDto),
        (status = 401, description = "No valid bearer token", body = ProblemDetails),
        (status = 403, description = "Caller is not from Antwerp", body = ProblemDetails),
        (status = 404, description = "No such city or point of interest", body = ProblemDetails),
    ),
    tag = "pointsofinterest"
)]
pub async fn get_point_of_interest(
    State(state): State<AppState>,
    accept: Accept,
    path: Result<Path<(i32, i32)>, PathRejection>,
) -> Result<Response, AppError> {
    let (city_id, id) = ids(path)?;
    ensure_city(&state, city_id).await?;
    let point = state
        .repository
        .point_of_interest_for_city(city_id, id)
        .await?
        .ok_or_else(|| point_of_interest_not_found(city_id, id))?;
    let body = state.projections.point_of_interest.map(&point)?;
    state.negotiator.respond(&accept, StatusCode::OK, &body)
}

/// POST /api/v{version}/cities/{cityId}/pointsofinterest
#[utoipa::path(
    post,
    path = "/api/v{version}/cities/{cityId}/pointsofinterest",
    params(
        ("version" = String, Path, description = "API version"),
        ("cityId" = i32, Path, description = "The id of the city"),
    ),
    request_body(content = PointOfInterestForCreationDto, content_type = "application/json"),
    responses(
        (status = 201, description = "Point of interest created", body = PointOfInterestDto),
        (status = 400, description = "Invalid body", body = ProblemDetails),
        (status = 404, description = "No such city", body = ProblemDetails),
        (status = 415, description = "Unsupported body media type", body = ProblemDetails),
    ),
    tag = "pointsofinterest"
)]
pub async fn create_point_of_interest(
    State(state): State<AppState>,
    Extension(ResolvedVersion(version)): Extension<ResolvedVersion>,
    accept: Accept,
    path: Result<Path<i32>, PathRejection>,
    body: Result<NegotiatedBody<PointOfInterestForCreationDto>, AppError>,
) -> Result<Response, AppError> {
    let city_id = CityId::new(extract_path(path)?);
    let creation = extract_validated(body)?;
    // Refuse before writing if the result could not be rendered.
    state.negotiator.select(&accept)?;
    ensure_city(&state, city_id).await?;

    let entity = state.projections.point_of_interest_from_creation.map(&creation)?;
    let stored = state
        .repository
        .add_point_of_interest_for_city(city_id, entity)
        .await?;
    tracing::info!(%city_id, point_of_interest_id = %stored.id, "point of interest created");

    let body = state.projections.point_of_interest.map(&stored)?;
    let mut response = state.negotiator.respond(&accept, StatusCode::CREATED, &body)?;
    let location = format!(
        "/api/{}/cities/{}/pointsofinterest/{}",
        version.group_name, city_id, stored.id
    );
    if let Ok(value) = HeaderValue::from_str(&location) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    Ok(response)
}

/// PUT /api/v{version}/cities/{cityId}/pointsofinterest/{pointOfInterestId}
#[utoipa::path(
    put,
    path = "/api/v{version}/cities/{cityId}/pointsofinterest/{pointOfInterestId}",
    params(
        ("version" = String, Path, description = "API version"),
        ("cityId" = i32, Path, description = "The id of the city"),
        ("pointOfInterestId" = i32, Path, description = "The id of the point of interest"),
    ),
    request_body(content = PointOfInterestForUpdateDto, content_type = "application/json"),
    responses(
        (status = 204, description = "Point of interest updated"),
        (status = 400, description = "Invalid body", body = ProblemDetails),
        (status = 404, description = "No such city or point of interest", body = ProblemDetails),
    ),
    tag = "pointsofinterest"
)]
pub async fn update_point_of_interest(
    State(state): State<AppState>,
    path: Result<Path<(i32, i32)>, PathRejection>,
    body: Result<NegotiatedBody<PointOfInterestForUpdateDto>, AppError>,
) -> Result<Response, AppError> {
    let (city_id, id) = ids(path)?;
    let update = extract_validated(body)?;
    ensure_city(&state, city_id).await?;

    let mut entity = state.projections.point_of_interest_from_update.map(&update)?;
    entity.id = id;
    entity.city_id = city_id;
    state
        .repository
        .update_point_of_interest(entity)
        .await?
        .ok_or_else(|| point_of_interest_not_found(city_id, id))?;
    tracing::info!(%city_id, point_of_interest_id = %id, "point of interest updated");
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// DELETE /api/v{version}/cities/{cityId}/pointsofinterest/{pointOfInterestId}
#[utoipa::path(
    delete,
    path = "/api/v{version}/cities/{cityId}/pointsofinterest/{pointOfInterestId}",
    params(
        ("version" = String, Path, description = "API version"),
        ("cityId" = i32, Path, description = "The id of the city"),
        ("pointOfInterestId" = i32, Path, description = "The id of the point of interest"),
    ),
    responses(
        (status = 204, description = "Point of interest deleted"),
        (status = 404, description = "No such city or point of interest", body = ProblemDetails),
    ),
    tag = "pointsofinterest"
)]
pub async fn delete_point_of_interest(
    State(state): State<AppState>,
    path: Result<Path<(i32, i32)>, PathRejection>,
) -> Result<Response, AppError> {
    let (city_id, id) = ids(path)?;
    ensure_city(&state, city_id).await?;

    let point = state
        .repository
        .point_of_interest_for_city(city_id, id)
        .await?
        .ok_or_else(|| point_of_interest_not_found(city_id, id))?;
    if !state.repository.delete_point_of_interest(city_id, id).await? {
        return Err(point_of_interest_not_found(city_id, id));
    }

    state.mail.send(
        "Point of interest deleted.",
        &format!(
            "Point of interest {} with id {} was deleted.",
            point.name, point.id
        ),
    );
    Ok(StatusCode::NO_CONTENT.into_response())
}

//! # Representations
//!
//! Client-facing shapes of cities and points of interest, their mapping
//! descriptions, and the mapping profile connecting them to the entities.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use cityinfo_core::{City, PointOfInterest};

use crate::extractors::Validate;
use crate::mapping::{
    FieldRule, FieldSpec, Mapper, MapperBuilder, MappingError, Projection, Shape, ShapeKind,
};
use crate::negotiation::Representation;

/// A city with its points of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CityDto {
    /// City id.
    pub id: i32,
    /// City name.
    pub name: String,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Number of points of interest.
    #[serde(default)]
    pub number_of_points_of_interest: usize,
    /// The points of interest.
    #[serde(default)]
    pub points_of_interest: Vec<PointOfInterestDto>,
}

/// A city without its points of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CityWithoutPointsOfInterestDto {
    /// City id.
    pub id: i32,
    /// City name.
    pub name: String,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A point of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PointOfInterestDto {
    /// Point-of-interest id.
    pub id: i32,
    /// Name.
    pub name: String,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Body of a point-of-interest creation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PointOfInterestForCreationDto {
    /// Name. Required, at most 50 characters.
    pub name: String,
    /// Description, at most 200 characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Body of a point-of-interest update request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PointOfInterestForUpdateDto {
    /// Name. Required, at most 50 characters.
    pub name: String,
    /// Description, at most 200 characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

const MAX_NAME_LEN: usize = 50;
const MAX_DESCRIPTION_LEN: usize = 200;

fn validate_name_and_description(name: &str, description: Option<&str>) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("name must not be empty".to_string());
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(format!("name must not exceed {MAX_NAME_LEN} characters"));
    }
    if description.is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LEN) {
        return Err(format!("description must not exceed {MAX_DESCRIPTION_LEN} characters"));
    }
    Ok(())
}

impl Validate for PointOfInterestForCreationDto {
    fn validate(&self) -> Result<(), String> {
        validate_name_and_description(&self.name, self.description.as_deref())
    }
}

impl Validate for PointOfInterestForUpdateDto {
    fn validate(&self) -> Result<(), String> {
        validate_name_and_description(&self.name, self.description.as_deref())
    }
}

// ── Shapes ──────────────────────────────────────────────────────────────────

impl Shape for City {
    const NAME: &'static str = "City";
    const KIND: ShapeKind = ShapeKind::Entity;
    fn fields() -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::required("id"),
            FieldSpec::required("name"),
            FieldSpec::optional("description"),
            FieldSpec::optional("points_of_interest"),
        ];
        FIELDS
    }
}

impl Shape for PointOfInterest {
    const NAME: &'static str = "PointOfInterest";
    const KIND: ShapeKind = ShapeKind::Entity;
    fn fields() -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::optional("id"),
            FieldSpec::required("name"),
            FieldSpec::optional("description"),
            FieldSpec::optional("city_id"),
        ];
        FIELDS
    }
}

impl Shape for CityDto {
    const NAME: &'static str = "CityDto";
    const KIND: ShapeKind = ShapeKind::Representation;
    fn fields() -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::required("id"),
            FieldSpec::required("name"),
            FieldSpec::optional("description"),
            FieldSpec::required("numberOfPointsOfInterest"),
            FieldSpec::required("pointsOfInterest"),
        ];
        FIELDS
    }
}

impl Shape for CityWithoutPointsOfInterestDto {
    const NAME: &'static str = "CityWithoutPointsOfInterestDto";
    const KIND: ShapeKind = ShapeKind::Representation;
    fn fields() -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::required("id"),
            FieldSpec::required("name"),
            FieldSpec::optional("description"),
        ];
        FIELDS
    }
}

impl Shape for PointOfInterestDto {
    const NAME: &'static str = "PointOfInterestDto";
    const KIND: ShapeKind = ShapeKind::Representation;
    fn fields() -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::required("id"),
            FieldSpec::required("name"),
            FieldSpec::optional("description"),
        ];
        FIELDS
    }
}

impl Shape for PointOfInterestForCreationDto {
    const NAME: &'static str = "PointOfInterestForCreationDto";
    const KIND: ShapeKind = ShapeKind::Representation;
    fn fields() -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[FieldSpec::required("name"), FieldSpec::optional("description")];
        FIELDS
    }
}

impl Shape for PointOfInterestForUpdateDto {
    const NAME: &'static str = "PointOfInterestForUpdateDto";
    const KIND: ShapeKind = ShapeKind::Representation;
    fn fields() -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[FieldSpec::required("name"), FieldSpec::optional("description")];
        FIELDS
    }
}

impl Representation for CityDto {
    const XML_NAME: &'static str = "City";
    const XML_COLLECTION_NAME: &'static str = "Cities";
}

impl Representation for CityWithoutPointsOfInterestDto {
    const XML_NAME: &'static str = "City";
    const XML_COLLECTION_NAME: &'static str = "Cities";
}

impl Representation for PointOfInterestDto {
    const XML_NAME: &'static str = "PointOfInterest";
    const XML_COLLECTION_NAME: &'static str = "PointsOfInterest";
}

// ── Profile ─────────────────────────────────────────────────────────────────

/// Every mapping the service uses.
pub fn city_info_profile() -> MapperBuilder {
    MapperBuilder::new()
        .map::<PointOfInterest, PointOfInterestDto>(vec![
            FieldRule::copy("id"),
            FieldRule::copy("name"),
            FieldRule::copy("description"),
        ])
        .map::<City, CityDto>(vec![
            FieldRule::copy("id"),
            FieldRule::copy("name"),
            FieldRule::copy("description"),
            FieldRule::count("points_of_interest", "numberOfPointsOfInterest"),
            FieldRule::nested::<PointOfInterest, PointOfInterestDto>(
                "points_of_interest",
                "pointsOfInterest",
            ),
        ])
        .map::<City, CityWithoutPointsOfInterestDto>(vec![
            FieldRule::copy("id"),
            FieldRule::copy("name"),
            FieldRule::copy("description"),
        ])
        .map::<PointOfInterestForCreationDto, PointOfInterest>(vec![
            FieldRule::copy("name"),
            FieldRule::copy("description"),
        ])
        .map::<PointOfInterestForUpdateDto, PointOfInterest>(vec![
            FieldRule::copy("name"),
            FieldRule::copy("description"),
        ])
}

/// Typed projections resolved once at start-up.
#[derive(Debug, Clone)]
pub struct Projections {
    /// City with children.
    pub city: Projection<City, CityDto>,
    /// City without children.
    pub city_without_points_of_interest: Projection<City, CityWithoutPointsOfInterestDto>,
    /// Point of interest.
    pub point_of_interest: Projection<PointOfInterest, PointOfInterestDto>,
    /// Creation body to entity.
    pub point_of_interest_from_creation: Projection<PointOfInterestForCreationDto, PointOfInterest>,
    /// Update body to entity.
    pub point_of_interest_from_update: Projection<PointOfInterestForUpdateDto, PointOfInterest>,
}

impl Projections {
    /// Resolve every projection from a validated mapper.
    pub fn resolve(mapper: &Mapper) -> Result<Self, MappingError> {
        Ok(Self {
            city: mapper.projection()?,
            city_without_points_of_interest: mapper.projection()?,
            point_of_interest: mapper.projection()?,
            point_of_interest_from_creation: mapper.projection()?,
            point_of_interest_from_update: mapper.projection()?,
        })
    }
}

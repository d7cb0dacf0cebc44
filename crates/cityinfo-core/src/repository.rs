//! # Repository Contract
//!
//! The narrow persistence interface consumed by request handlers. Lookups
//! return `Option` for not-found; `Err` is reserved for backend failures.

use async_trait::async_trait;

use crate::entity::{City, PointOfInterest};
use crate::error::RepositoryError;
use crate::identity::{CityId, PointOfInterestId};

/// CRUD-style access to cities and their points of interest.
///
/// Implementations must be cheap to share across concurrent requests;
/// the API layer holds one behind an `Arc`.
#[async_trait]
pub trait CityInfoRepository: Send + Sync {
    /// All cities ordered by name, without their points of interest.
    async fn cities(&self) -> Result<Vec<City>, RepositoryError>;

    /// One city, optionally with its points of interest loaded.
    async fn city(
        &self,
        city_id: CityId,
        include_points_of_interest: bool,
    ) -> Result<Option<City>, RepositoryError>;

    /// Whether a city with this id exists.
    async fn city_exists(&self, city_id: CityId) -> Result<bool, RepositoryError>;

    /// Points of interest of one city. Empty when the city has none or does
    /// not exist; callers check [`city_exists`](Self::city_exists) first.
    async fn points_of_interest_for_city(
        &self,
        city_id: CityId,
    ) -> Result<Vec<PointOfInterest>, RepositoryError>;

    /// One point of interest of one city.
    async fn point_of_interest_for_city(
        &self,
        city_id: CityId,
        point_of_interest_id: PointOfInterestId,
    ) -> Result<Option<PointOfInterest>, RepositoryError>;

    /// Insert a point of interest under a city. The repository assigns the id
    /// and owning city and returns the stored record.
    async fn add_point_of_interest_for_city(
        &self,
        city_id: CityId,
        point_of_interest: PointOfInterest,
    ) -> Result<PointOfInterest, RepositoryError>;

    /// Replace the stored name/description of a point of interest.
    /// Returns the stored record, or `None` when it does not exist.
    async fn update_point_of_interest(
        &self,
        point_of_interest: PointOfInterest,
    ) -> Result<Option<PointOfInterest>, RepositoryError>;

    /// Delete a point of interest. Returns whether a record was removed.
    async fn delete_point_of_interest(
        &self,
        city_id: CityId,
        point_of_interest_id: PointOfInterestId,
    ) -> Result<bool, RepositoryError>;
}

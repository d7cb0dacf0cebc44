//! # In-Memory Repository
//!
//! Thread-safe, cloneable [`CityInfoRepository`] backed by a `parking_lot`
//! `RwLock`. Locks are never held across `.await` points, so the async trait
//! methods complete without suspending.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::entity::{City, PointOfInterest};
use crate::error::RepositoryError;
use crate::identity::{CityId, PointOfInterestId};
use crate::repository::CityInfoRepository;

#[derive(Debug, Default)]
struct Inner {
    cities: BTreeMap<CityId, City>,
    next_point_of_interest_id: i32,
}

/// In-memory city store. Clones share the same underlying data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryRepository {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given cities.
    ///
    /// Point-of-interest ids continue after the highest id present.
    pub fn with_cities(cities: impl IntoIterator<Item = City>) -> Self {
        let cities: BTreeMap<CityId, City> = cities.into_iter().map(|c| (c.id, c)).collect();
        let next = cities
            .values()
            .flat_map(|c| c.points_of_interest.iter())
            .map(|p| p.id.get())
            .max()
            .unwrap_or(0)
            + 1;
        Self {
            inner: Arc::new(RwLock::new(Inner {
                cities,
                next_point_of_interest_id: next,
            })),
        }
    }

    /// The demo data set served when no database is configured.
    pub fn seeded() -> Self {
        let poi = |id: i32, city: i32, name: &str, description: &str| PointOfInterest {
            id: PointOfInterestId::new(id),
            name: name.to_string(),
            description: Some(description.to_string()),
            city_id: CityId::new(city),
        };
        Self::with_cities([
            City {
                id: CityId::new(1),
                name: "New York City".to_string(),
                description: Some("The one with that big park.".to_string()),
                points_of_interest: vec![
                    poi(1, 1, "Central Park", "The most visited urban park in the United States."),
                    poi(2, 1, "Empire State Building", "A 102-story skyscraper located in Midtown Manhattan."),
                ],
            },
            City {
                id: CityId::new(2),
                name: "Antwerp".to_string(),
                description: Some("The one with the cathedral that was never really finished.".to_string()),
                points_of_interest: vec![
                    poi(3, 2, "Cathedral of Our Lady", "A Gothic style cathedral, conceived by architects Jan and Pieter Appelmans."),
                    poi(4, 2, "Antwerp Central Station", "The finest example of railway architecture in Belgium."),
                ],
            },
            City {
                id: CityId::new(3),
                name: "Paris".to_string(),
                description: Some("The one with that big tower.".to_string()),
                points_of_interest: vec![
                    poi(5, 3, "Eiffel Tower", "A wrought iron lattice tower on the Champ de Mars."),
                    poi(6, 3, "The Louvre", "The world's largest museum."),
                ],
            },
        ])
    }

    /// Number of cities held.
    pub fn len(&self) -> usize {
        self.inner.read().cities.len()
    }

    /// Whether the store holds no cities.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CityInfoRepository for InMemoryRepository {
    async fn cities(&self) -> Result<Vec<City>, RepositoryError> {
        let mut cities: Vec<City> = self
            .inner
            .read()
            .cities
            .values()
            .map(City::without_points_of_interest)
            .collect();
        cities.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(cities)
    }

    async fn city(
        &self,
        city_id: CityId,
        include_points_of_interest: bool,
    ) -> Result<Option<City>, RepositoryError> {
        let guard = self.inner.read();
        Ok(guard.cities.get(&city_id).map(|c| {
            if include_points_of_interest {
                c.clone()
            } else {
                c.without_points_of_interest()
            }
        }))
    }

    async fn city_exists(&self, city_id: CityId) -> Result<bool, RepositoryError> {
        Ok(self.inner.read().cities.contains_key(&city_id))
    }

    async fn points_of_interest_for_city(
        &self,
        city_id: CityId,
    ) -> Result<Vec<PointOfInterest>, RepositoryError> {
        Ok(self
            .inner
            .read()
            .cities
            .get(&city_id)
            .map(|c| c.points_of_interest.clone())
            .unwrap_or_default())
    }

    async fn point_of_interest_for_city(
        &self,
        city_id: CityId,
        point_of_interest_id: PointOfInterestId,
    ) -> Result<Option<PointOfInterest>, RepositoryError> {
        Ok(self.inner.read().cities.get(&city_id).and_then(|c| {
            c.points_of_interest
                .iter()
                .find(|p| p.id == point_of_interest_id)
                .cloned()
        }))
    }

    async fn add_point_of_interest_for_city(
        &self,
        city_id: CityId,
        mut point_of_interest: PointOfInterest,
    ) -> Result<PointOfInterest, RepositoryError> {
        let mut guard = self.inner.write();
        let id = PointOfInterestId::new(guard.next_point_of_interest_id);
        let city = guard
            .cities
            .get_mut(&city_id)
            .ok_or(RepositoryError::UnknownCity(city_id))?;
        point_of_interest.id = id;
        point_of_interest.city_id = city_id;
        city.points_of_interest.push(point_of_interest.clone());
        guard.next_point_of_interest_id += 1;
        tracing::debug!(city_id = %city_id, point_of_interest_id = %id, "point of interest stored");
        Ok(point_of_interest)
    }

    async fn update_point_of_interest(
        &self,
        point_of_interest: PointOfInterest,
    ) -> Result<Option<PointOfInterest>, RepositoryError> {
        let mut guard = self.inner.write();
        let stored = guard
            .cities
            .get_mut(&point_of_interest.city_id)
            .and_then(|c| {
                c.points_of_interest
                    .iter_mut()
                    .find(|p| p.id == point_of_interest.id)
            });
        Ok(stored.map(|p| {
            p.name = point_of_interest.name;
            p.description = point_of_interest.description;
            p.clone()
        }))
    }

    async fn delete_point_of_interest(
        &self,
        city_id: CityId,
        point_of_interest_id: PointOfInterestId,
    ) -> Result<bool, RepositoryError> {
        let mut guard = self.inner.write();
        let Some(city) = guard.cities.get_mut(&city_id) else {
            return Ok(false);
        };
        let before = city.points_of_interest.len();
        city.points_of_interest.retain(|p| p.id != point_of_interest_id);
        Ok(city.points_of_interest.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_poi(name: &str) -> PointOfInterest {
        PointOfInterest {
            id: PointOfInterestId::default(),
            name: name.to_string(),
            description: None,
            city_id: CityId::default(),
        }
    }

    #[tokio::test]
    async fn seeded_store_has_three_cities() {
        let repo = InMemoryRepository::seeded();
        assert_eq!(repo.len(), 3);
        let cities = repo.cities().await.unwrap();
        let names: Vec<_> = cities.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Antwerp", "New York City", "Paris"]);
        assert!(cities.iter().all(|c| c.points_of_interest.is_empty()));
    }

    #[tokio::test]
    async fn city_respects_include_flag() {
        let repo = InMemoryRepository::seeded();
        let full = repo.city(CityId::new(1), true).await.unwrap().unwrap();
        let bare = repo.city(CityId::new(1), false).await.unwrap().unwrap();
        assert_eq!(full.points_of_interest.len(), 2);
        assert!(bare.points_of_interest.is_empty());
    }

    #[tokio::test]
    async fn missing_city_is_none_not_error() {
        let repo = InMemoryRepository::seeded();
        assert!(repo.city(CityId::new(99), true).await.unwrap().is_none());
        assert!(!repo.city_exists(CityId::new(99)).await.unwrap());
    }

    #[tokio::test]
    async fn add_assigns_next_id_and_owner() {
        let repo = InMemoryRepository::seeded();
        let stored = repo
            .add_point_of_interest_for_city(CityId::new(2), new_poi("Grote Markt"))
            .await
            .unwrap();
        assert_eq!(stored.id.get(), 7);
        assert_eq!(stored.city_id, CityId::new(2));
        let again = repo
            .point_of_interest_for_city(CityId::new(2), stored.id)
            .await
            .unwrap();
        assert_eq!(again, Some(stored));
    }

    #[tokio::test]
    async fn add_to_unknown_city_fails() {
        let repo = InMemoryRepository::new();
        let err = repo
            .add_point_of_interest_for_city(CityId::new(5), new_poi("Nowhere"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::UnknownCity(id) if id.get() == 5));
    }

    #[tokio::test]
    async fn update_replaces_name_and_description() {
        let repo = InMemoryRepository::seeded();
        let mut poi = repo
            .point_of_interest_for_city(CityId::new(3), PointOfInterestId::new(5))
            .await
            .unwrap()
            .unwrap();
        poi.name = "La Tour Eiffel".to_string();
        poi.description = None;
        let updated = repo.update_point_of_interest(poi).await.unwrap().unwrap();
        assert_eq!(updated.name, "La Tour Eiffel");
        assert!(updated.description.is_none());
    }

    #[tokio::test]
    async fn update_missing_returns_none() {
        let repo = InMemoryRepository::seeded();
        let mut poi = new_poi("Ghost");
        poi.city_id = CityId::new(1);
        poi.id = PointOfInterestId::new(404);
        assert!(repo.update_point_of_interest(poi).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_once() {
        let repo = InMemoryRepository::seeded();
        let id = PointOfInterestId::new(1);
        assert!(repo.delete_point_of_interest(CityId::new(1), id).await.unwrap());
        assert!(!repo.delete_point_of_interest(CityId::new(1), id).await.unwrap());
        assert_eq!(
            repo.points_of_interest_for_city(CityId::new(1)).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn clones_share_state() {
        let repo = InMemoryRepository::seeded();
        let clone = repo.clone();
        clone
            .delete_point_of_interest(CityId::new(3), PointOfInterestId::new(6))
            .await
            .unwrap();
        assert_eq!(
            repo.points_of_interest_for_city(CityId::new(3)).await.unwrap().len(),
            1
        );
    }
}

//! # Internal Entities
//!
//! Persistence shapes for cities and their points of interest. Field names
//! are the internal (snake_case) names; representation DTOs in the API crate
//! choose their own wire names.

use serde::{Deserialize, Serialize};

use crate::identity::{CityId, PointOfInterestId};

/// A city and, when loaded with them, its points of interest.
///
/// `points_of_interest` is empty when the city was loaded without its
/// children; callers that need the distinction ask the repository explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    /// Stable identifier.
    pub id: CityId,
    /// Display name.
    pub name: String,
    /// Free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// Children, populated only when requested.
    #[serde(default)]
    pub points_of_interest: Vec<PointOfInterest>,
}

/// A point of interest belonging to one city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointOfInterest {
    /// Identifier, assigned by the repository on insert.
    #[serde(default)]
    pub id: PointOfInterestId,
    /// Display name.
    pub name: String,
    /// Free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// Owning city, assigned by the repository on insert.
    #[serde(default)]
    pub city_id: CityId,
}

impl City {
    /// A copy of this city with the children dropped.
    pub fn without_points_of_interest(&self) -> City {
        City {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            points_of_interest: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn antwerp() -> City {
        City {
            id: CityId::new(2),
            name: "Antwerp".to_string(),
            description: Some("The one with the cathedral that was never really finished.".to_string()),
            points_of_interest: vec![PointOfInterest {
                id: PointOfInterestId::new(3),
                name: "Cathedral of Our Lady".to_string(),
                description: None,
                city_id: CityId::new(2),
            }],
        }
    }

    #[test]
    fn without_points_of_interest_keeps_scalar_fields() {
        let city = antwerp();
        let bare = city.without_points_of_interest();
        assert_eq!(bare.id, city.id);
        assert_eq!(bare.name, city.name);
        assert!(bare.points_of_interest.is_empty());
        assert_eq!(city.points_of_interest.len(), 1);
    }

    #[test]
    fn point_of_interest_defaults_missing_ids() {
        let poi: PointOfInterest = serde_json::from_str(r#"{"name":"Grote Markt"}"#).unwrap();
        assert_eq!(poi.id.get(), 0);
        assert_eq!(poi.city_id.get(), 0);
        assert!(poi.description.is_none());
    }
}

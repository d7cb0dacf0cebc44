//! # Identifier Newtypes
//!
//! Integer identifiers for cities and points of interest. Both serialize as
//! bare integers so the wire shape is unchanged by the newtype.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a [`City`](crate::City).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CityId(i32);

impl CityId {
    /// Wrap a raw integer id.
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// The raw integer value.
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for CityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for CityId {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}

/// Identifier of a [`PointOfInterest`](crate::PointOfInterest).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PointOfInterestId(i32);

impl PointOfInterestId {
    /// Wrap a raw integer id.
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// The raw integer value.
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for PointOfInterestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for PointOfInterestId {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}

#![deny(missing_docs)]

//! # cityinfo-core: Foundational Types for the City Info API
//!
//! This crate defines the internal persistence shapes and the repository
//! contract that the API layer consumes. It has no knowledge of HTTP, wire
//! formats, or authorization.
//!
//! ## Design Principles
//!
//! 1. **Newtype identifiers.** [`CityId`] and [`PointOfInterestId`] are
//!    distinct types. A point-of-interest id cannot be passed where a city id
//!    is expected.
//!
//! 2. **Entities are internal shapes.** [`City`] and [`PointOfInterest`] are
//!    never serialized to callers directly; the API crate maps them into
//!    representation DTOs first.
//!
//! 3. **Narrow repository contract.** [`CityInfoRepository`] is the only path
//!    to stored data. [`InMemoryRepository`] is the seeded default; other
//!    backends implement the same trait.
//!
//! 4. **[`RepositoryError`] hierarchy.** Structured errors with `thiserror`,
//!    no `.unwrap()` outside tests.

pub mod entity;
pub mod error;
pub mod identity;
pub mod memory;
pub mod repository;

pub use entity::{City, PointOfInterest};
pub use error::RepositoryError;
pub use identity::{CityId, PointOfInterestId};
pub use memory::InMemoryRepository;
pub use repository::CityInfoRepository;

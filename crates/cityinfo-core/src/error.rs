//! # Error Hierarchy
//!
//! Structured errors for the repository layer, built with `thiserror`.
//! Not-found is NOT an error here: lookups return `Option` so callers can
//! map absence to their own response shape.

use thiserror::Error;

use crate::identity::CityId;

/// Errors raised by a [`CityInfoRepository`](crate::CityInfoRepository)
/// implementation.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// A write targeted a city that does not exist.
    #[error("city {0} does not exist")]
    UnknownCity(CityId),

    /// The storage backend failed. The message is for operators only.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A stored row could not be decoded into an entity.
    #[error("corrupt record in {table}: {reason}")]
    CorruptRecord {
        /// The table or collection the record came from.
        table: &'static str,
        /// Why decoding failed.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_city_display() {
        let err = RepositoryError::UnknownCity(CityId::new(42));
        assert!(format!("{err}").contains("42"));
    }

    #[test]
    fn backend_display() {
        let err = RepositoryError::Backend("connection reset".to_string());
        assert!(format!("{err}").contains("connection reset"));
    }

    #[test]
    fn corrupt_record_display() {
        let err = RepositoryError::CorruptRecord {
            table: "cities",
            reason: "negative id".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("cities"));
        assert!(msg.contains("negative id"));
    }
}

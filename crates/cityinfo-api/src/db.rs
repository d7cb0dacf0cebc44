//! # Database Persistence Layer
//!
//! Postgres implementation of [`CityInfoRepository`] via SQLx. Selected at
//! start-up when `CITYINFO_DATABASE_URL` is a `postgres://` URL; `memory:`
//! keeps the seeded in-memory store instead.
//!
//! Two tables: `cities` and `points_of_interest`, the latter referencing the
//! former with `ON DELETE CASCADE`. [`PgCityInfoRepository::ensure_schema`]
//! creates both when missing, and [`PgCityInfoRepository::seed_if_empty`]
//! loads the standard cities into an empty database.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};

use cityinfo_core::{
    City, CityId, CityInfoRepository, InMemoryRepository, PointOfInterest, PointOfInterestId,
    RepositoryError,
};

const CREATE_CITIES: &str = "CREATE TABLE IF NOT EXISTS cities (
    id SERIAL PRIMARY KEY,
    name VARCHAR(50) NOT NULL,
    description VARCHAR(200)
)";

const CREATE_POINTS_OF_INTEREST: &str = "CREATE TABLE IF NOT EXISTS points_of_interest (
    id SERIAL PRIMARY KEY,
    city_id INTEGER NOT NULL REFERENCES cities (id) ON DELETE CASCADE,
    name VARCHAR(50) NOT NULL,
    description VARCHAR(200)
)";

fn backend(err: sqlx::Error) -> RepositoryError {
    RepositoryError::Backend(err.to_string())
}

#[derive(sqlx::FromRow)]
struct CityRow {
    id: i32,
    name: String,
    description: Option<String>,
}

impl CityRow {
    fn into_record(self) -> Result<City, RepositoryError> {
        if self.id <= 0 {
            return Err(RepositoryError::CorruptRecord {
                table: "cities",
                reason: format!("non-positive id {}", self.id),
            });
        }
        Ok(City {
            id: CityId::new(self.id),
            name: self.name,
            description: self.description,
            points_of_interest: Vec::new(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct PointOfInterestRow {
    id: i32,
    city_id: i32,
    name: String,
    description: Option<String>,
}

impl PointOfInterestRow {
    fn into_record(self) -> Result<PointOfInterest, RepositoryError> {
        if self.id <= 0 {
            return Err(RepositoryError::CorruptRecord {
                table: "points_of_interest",
                reason: format!("non-positive id {}", self.id),
            });
        }
        Ok(PointOfInterest {
            id: PointOfInterestId::new(self.id),
            name: self.name,
            description: self.description,
            city_id: CityId::new(self.city_id),
        })
    }
}

fn into_records<R, T>(
    rows: Vec<R>,
    convert: impl Fn(R) -> Result<T, RepositoryError>,
) -> Result<Vec<T>, RepositoryError> {
    rows.into_iter().map(convert).collect()
}

/// SQLx-backed repository.
#[derive(Debug, Clone)]
pub struct PgCityInfoRepository {
    pool: PgPool,
}

impl PgCityInfoRepository {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool.
    pub async fn connect(url: &str) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await
            .map_err(backend)?;
        tracing::info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create the tables if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        for statement in [CREATE_CITIES, CREATE_POINTS_OF_INTEREST] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(backend)?;
        }
        tracing::info!("Database schema ensured");
        Ok(())
    }

    /// Load the standard cities when the `cities` table is empty.
    pub async fn seed_if_empty(&self) -> Result<(), RepositoryError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cities")
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        if count > 0 {
            return Ok(());
        }

        let seed = InMemoryRepository::seeded();
        let mut tx = self.pool.begin().await.map_err(backend)?;
        for listed in seed.cities().await? {
            let Some(city) = seed.city(listed.id, true).await? else {
                continue;
            };
            let (city_id,): (i32,) = sqlx::query_as(
                "INSERT INTO cities (name, description) VALUES ($1, $2) RETURNING id",
            )
            .bind(&city.name)
            .bind(&city.description)
            .fetch_one(&mut *tx)
            .await
            .map_err(backend)?;
            for point in &city.points_of_interest {
                sqlx::query(
                    "INSERT INTO points_of_interest (city_id, name, description) VALUES ($1, $2, $3)",
                )
                .bind(city_id)
                .bind(&point.name)
                .bind(&point.description)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
            }
        }
        tx.commit().await.map_err(backend)?;
        tracing::info!("Database seeded with the standard cities");
        Ok(())
    }
}

#[async_trait]
impl CityInfoRepository for PgCityInfoRepository {
    async fn cities(&self) -> Result<Vec<City>, RepositoryError> {
        let rows = sqlx::query_as::<_, CityRow>(
            "SELECT id, name, description FROM cities ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        into_records(rows, CityRow::into_record)
    }

    async fn city(
        &self,
        city_id: CityId,
        include_points_of_interest: bool,
    ) -> Result<Option<City>, RepositoryError> {
        let row = sqlx::query_as::<_, CityRow>(
            "SELECT id, name, description FROM cities WHERE id = $1",
        )
        .bind(city_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut city = row.into_record()?;
        if include_points_of_interest {
            city.points_of_interest = self.points_of_interest_for_city(city_id).await?;
        }
        Ok(Some(city))
    }

    async fn city_exists(&self, city_id: CityId) -> Result<bool, RepositoryError> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM cities WHERE id = $1)")
                .bind(city_id.get())
                .fetch_one(&self.pool)
                .await
                .map_err(backend)?;
        Ok(exists)
    }

    async fn points_of_interest_for_city(
        &self,
        city_id: CityId,
    ) -> Result<Vec<PointOfInterest>, RepositoryError> {
        let rows = sqlx::query_as::<_, PointOfInterestRow>(
            "SELECT id, city_id, name, description FROM points_of_interest
             WHERE city_id = $1 ORDER BY id",
        )
        .bind(city_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        into_records(rows, PointOfInterestRow::into_record)
    }

    async fn point_of_interest_for_city(
        &self,
        city_id: CityId,
        point_of_interest_id: PointOfInterestId,
    ) -> Result<Option<PointOfInterest>, RepositoryError> {
        let row = sqlx::query_as::<_, PointOfInterestRow>(
            "SELECT id, city_id, name, description FROM points_of_interest
             WHERE city_id = $1 AND id = $2",
        )
        .bind(city_id.get())
        .bind(point_of_interest_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(PointOfInterestRow::into_record).transpose()
    }

    async fn add_point_of_interest_for_city(
        &self,
        city_id: CityId,
        point_of_interest: PointOfInterest,
    ) -> Result<PointOfInterest, RepositoryError> {
        if !self.city_exists(city_id).await? {
            return Err(RepositoryError::UnknownCity(city_id));
        }
        let row = sqlx::query_as::<_, PointOfInterestRow>(
            "INSERT INTO points_of_interest (city_id, name, description) VALUES ($1, $2, $3)
             RETURNING id, city_id, name, description",
        )
        .bind(city_id.get())
        .bind(&point_of_interest.name)
        .bind(&point_of_interest.description)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        row.into_record()
    }

    async fn update_point_of_interest(
        &self,
        point_of_interest: PointOfInterest,
    ) -> Result<Option<PointOfInterest>, RepositoryError> {
        let row = sqlx::query_as::<_, PointOfInterestRow>(
            "UPDATE points_of_interest SET name = $1, description = $2
             WHERE city_id = $3 AND id = $4
             RETURNING id, city_id, name, description",
        )
        .bind(&point_of_interest.name)
        .bind(&point_of_interest.description)
        .bind(point_of_interest.city_id.get())
        .bind(point_of_interest.id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(PointOfInterestRow::into_record).transpose()
    }

    async fn delete_point_of_interest(
        &self,
        city_id: CityId,
        point_of_interest_id: PointOfInterestId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM points_of_interest WHERE city_id = $1 AND id = $2")
            .bind(city_id.get())
            .bind(point_of_interest_id.get())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }
}

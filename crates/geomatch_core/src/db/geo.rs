//! Geo index on a `geo_entry` table keyed by user handle
//!
//! Proximity queries prefilter with a bounding box in SurrealQL and then
//! apply the exact haversine check and ordering in Rust.

use crate::db::Db;
use crate::geo::{BoundingBox, rank_nearby};
use crate::{CoreError, Coordinate, GeoIndex, Result, UserHandle};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const TABLE: &str = "geo_entry";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeoRecord {
    user: UserHandle,
    latitude: f64,
    longitude: f64,
    updated_at: DateTime<Utc>,
}

impl GeoRecord {
    fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone)]
pub struct SurrealGeoIndex {
    db: Db,
}

impl SurrealGeoIndex {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl GeoIndex for SurrealGeoIndex {
    async fn add_user_location(&self, user: UserHandle, coordinate: Coordinate) -> Result<()> {
        let _: Option<GeoRecord> = self
            .db
            .upsert((TABLE, user.get()))
            .content(GeoRecord {
                user,
                latitude: coordinate.latitude,
                longitude: coordinate.longitude,
                updated_at: Utc::now(),
            })
            .await
            .map_err(|e| CoreError::geo_index("add_user_location", user, e))?;
        Ok(())
    }

    async fn remove_user_location(&self, user: UserHandle) -> Result<()> {
        let _: Option<GeoRecord> = self
            .db
            .delete((TABLE, user.get()))
            .await
            .map_err(|e| CoreError::geo_index("remove_user_location", user, e))?;
        Ok(())
    }

    async fn get_user_location(&self, user: UserHandle) -> Result<Coordinate> {
        let record: Option<GeoRecord> = self
            .db
            .select((TABLE, user.get()))
            .await
            .map_err(|e| CoreError::geo_index("get_user_location", user, e))?;
        record
            .map(|r| r.coordinate())
            .ok_or(CoreError::LocationNotFound { user })
    }

    async fn find_nearby(
        &self,
        user: UserHandle,
        center: Coordinate,
        radius_km: f64,
    ) -> Result<Vec<UserHandle>> {
        let bbox = BoundingBox::around(&center, radius_km.max(0.0));

        let query = match bbox.longitude {
            Some(_) => {
                "SELECT * FROM geo_entry WHERE user != $user \
                 AND latitude >= $min_lat AND latitude <= $max_lat \
                 AND longitude >= $min_lon AND longitude <= $max_lon"
            }
            None => {
                "SELECT * FROM geo_entry WHERE user != $user \
                 AND latitude >= $min_lat AND latitude <= $max_lat"
            }
        };
        let (min_lon, max_lon) = bbox.longitude.unwrap_or((-180.0, 180.0));

        let mut response = self
            .db
            .query(query)
            .bind(("user", user.get()))
            .bind(("min_lat", bbox.min_latitude))
            .bind(("max_lat", bbox.max_latitude))
            .bind(("min_lon", min_lon))
            .bind(("max_lon", max_lon))
            .await
            .map_err(|e| CoreError::geo_index("find_nearby", user, e))?;
        let records: Vec<GeoRecord> = response
            .take(0)
            .map_err(|e| CoreError::geo_index("find_nearby", user, e))?;

        tracing::trace!(
            "find_nearby for {} prefiltered {} candidates",
            user,
            records.len()
        );

        Ok(rank_nearby(
            records.iter().map(|r| (r.user, r.coordinate())),
            user,
            &center,
            radius_km,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryGeoIndex;
    use crate::db::client::create_test_db;
    use crate::geo::tests::north_of;
    use pretty_assertions::assert_eq;

    const KAZAN: Coordinate = Coordinate::new(55.7963, 49.1088);

    #[tokio::test]
    async fn round_trip_is_exact() {
        let index = SurrealGeoIndex::new(create_test_db().await.unwrap());
        index
            .add_user_location(UserHandle(1), Coordinate::new(10.0, 20.0))
            .await
            .unwrap();
        assert_eq!(
            index.get_user_location(UserHandle(1)).await.unwrap(),
            Coordinate::new(10.0, 20.0)
        );
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let index = SurrealGeoIndex::new(create_test_db().await.unwrap());
        index.remove_user_location(UserHandle(1)).await.unwrap();
        index.add_user_location(UserHandle(1), KAZAN).await.unwrap();
        index.remove_user_location(UserHandle(1)).await.unwrap();
        assert!(matches!(
            index.get_user_location(UserHandle(1)).await,
            Err(CoreError::LocationNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn find_nearby_orders_and_excludes() {
        let index = SurrealGeoIndex::new(create_test_db().await.unwrap());
        index
            .add_user_location(UserHandle(15), north_of(KAZAN, 15.0))
            .await
            .unwrap();
        index
            .add_user_location(UserHandle(5), north_of(KAZAN, 5.0))
            .await
            .unwrap();
        index
            .add_user_location(UserHandle(1), north_of(KAZAN, 1.0))
            .await
            .unwrap();
        index.add_user_location(UserHandle(99), KAZAN).await.unwrap();

        let found = index
            .find_nearby(UserHandle(99), KAZAN, 10.0)
            .await
            .unwrap();
        assert_eq!(found, vec![UserHandle(1), UserHandle(5)]);
    }

    #[tokio::test]
    async fn find_nearby_across_antimeridian() {
        let index = SurrealGeoIndex::new(create_test_db().await.unwrap());
        let east = Coordinate::new(-16.5, 179.999);
        let west = Coordinate::new(-16.5, -179.999);
        index.add_user_location(UserHandle(2), west).await.unwrap();

        let found = index.find_nearby(UserHandle(1), east, 5.0).await.unwrap();
        assert_eq!(found, vec![UserHandle(2)]);
    }

    #[tokio::test]
    async fn near_the_poles_matches_memory_index() {
        let surreal = SurrealGeoIndex::new(create_test_db().await.unwrap());
        let memory = MemoryGeoIndex::new();
        let entries = [
            (UserHandle(2), Coordinate::new(89.96, 180.0)),
            (UserHandle(3), Coordinate::new(89.508, 10.35)),
            (UserHandle(4), Coordinate::new(89.5, -100.0)),
            (UserHandle(5), Coordinate::new(-89.97, 90.0)),
            (UserHandle(6), Coordinate::new(-89.97, -90.0)),
        ];
        for (user, coordinate) in entries {
            surreal.add_user_location(user, coordinate).await.unwrap();
            memory.add_user_location(user, coordinate).await.unwrap();
        }

        for center in [
            Coordinate::new(89.96, 0.0),
            Coordinate::new(89.5, 0.0),
            Coordinate::new(-89.97, 0.0),
        ] {
            let expected = memory.find_nearby(UserHandle(1), center, 10.0).await.unwrap();
            let found = surreal.find_nearby(UserHandle(1), center, 10.0).await.unwrap();
            assert!(!expected.is_empty(), "no neighbours around {center}");
            assert_eq!(found, expected, "around {center}");
        }
    }
}

//! Geographic visibility index
//!
//! An entry in the index means the user is currently visible for matching.
//! Distances are great-circle (haversine) kilometres.

use crate::{CoreError, Result, UserHandle};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

const EARTH_RADIUS_KM: f64 = 6371.0;
const KM_PER_DEGREE: f64 = 111.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether this looks like a real fix.
    ///
    /// Platforms report `(0, 0)` when no location is known, so that point is
    /// rejected along with non-finite and out-of-range values.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
            && !(self.latitude == 0.0 && self.longitude == 0.0)
    }

    pub fn distance_km(&self, other: &Coordinate) -> f64 {
        haversine_km(self, other)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.latitude, self.longitude)
    }
}

pub fn haversine_km(a: &Coordinate, b: &Coordinate) -> f64 {
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos()
            * b.latitude.to_radians().cos()
            * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Rectangular prefilter around a point.
///
/// `longitude` is `None` when the box would cross the antimeridian or reach
/// a pole, in which case only the latitude band is usable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub longitude: Option<(f64, f64)>,
}

impl BoundingBox {
    pub fn around(center: &Coordinate, radius_km: f64) -> Self {
        let lat_change = radius_km.max(0.0) / KM_PER_DEGREE;
        let min_latitude = center.latitude - lat_change;
        let max_latitude = center.latitude + lat_change;

        // a circle that reaches a pole covers every meridian
        let longitude = if min_latitude <= -90.0 || max_latitude >= 90.0 {
            None
        } else {
            Self::longitude_span(center, lat_change)
        };

        Self {
            min_latitude: min_latitude.max(-90.0),
            max_latitude: max_latitude.min(90.0),
            longitude,
        }
    }

    /// Meridians touched by the circle: the half-width is
    /// `asin(sin(r) / cos(lat))` for angular radius `r`.
    fn longitude_span(center: &Coordinate, lat_change: f64) -> Option<(f64, f64)> {
        let ratio = lat_change.to_radians().sin() / center.latitude.to_radians().cos();
        if !ratio.is_finite() || ratio >= 1.0 {
            return None;
        }
        let lon_change = ratio.asin().to_degrees();
        let min_lon = center.longitude - lon_change;
        let max_lon = center.longitude + lon_change;
        (min_lon >= -180.0 && max_lon <= 180.0).then_some((min_lon, max_lon))
    }

    pub fn contains(&self, point: &Coordinate) -> bool {
        let lat_ok = point.latitude >= self.min_latitude && point.latitude <= self.max_latitude;
        let lon_ok = match self.longitude {
            Some((min, max)) => point.longitude >= min && point.longitude <= max,
            None => true,
        };
        lat_ok && lon_ok
    }
}

/// Filters `entries` to those within `radius_km` of `center`, dropping
/// `origin`, nearest first with ties broken by handle.
pub(crate) fn rank_nearby(
    entries: impl IntoIterator<Item = (UserHandle, Coordinate)>,
    origin: UserHandle,
    center: &Coordinate,
    radius_km: f64,
) -> Vec<UserHandle> {
    let radius_km = radius_km.max(0.0);
    let mut hits: Vec<(f64, UserHandle)> = entries
        .into_iter()
        .filter(|(user, _)| *user != origin)
        .filter_map(|(user, coordinate)| {
            let distance = center.distance_km(&coordinate);
            (distance <= radius_km).then_some((distance, user))
        })
        .collect();

    hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    hits.into_iter().map(|(_, user)| user).collect()
}

/// Proximity index of visible users.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GeoIndex: Send + Sync + fmt::Debug {
    /// Upserts the user's coordinate.
    async fn add_user_location(&self, user: UserHandle, coordinate: Coordinate) -> Result<()>;

    /// Removes the user's coordinate. Absence is not an error.
    async fn remove_user_location(&self, user: UserHandle) -> Result<()>;

    /// Fails with [`CoreError::LocationNotFound`] if the user has no entry.
    async fn get_user_location(&self, user: UserHandle) -> Result<Coordinate>;

    /// Users within `radius_km` of `center`, nearest first, never including
    /// `user` itself.
    async fn find_nearby(
        &self,
        user: UserHandle,
        center: Coordinate,
        radius_km: f64,
    ) -> Result<Vec<UserHandle>>;
}

#[derive(Debug, Default)]
pub struct MemoryGeoIndex {
    entries: RwLock<HashMap<UserHandle, Coordinate>>,
}

impl MemoryGeoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, user: UserHandle) -> bool {
        self.entries.read().contains_key(&user)
    }
}

#[async_trait]
impl GeoIndex for MemoryGeoIndex {
    async fn add_user_location(&self, user: UserHandle, coordinate: Coordinate) -> Result<()> {
        self.entries.write().insert(user, coordinate);
        Ok(())
    }

    async fn remove_user_location(&self, user: UserHandle) -> Result<()> {
        self.entries.write().remove(&user);
        Ok(())
    }

    async fn get_user_location(&self, user: UserHandle) -> Result<Coordinate> {
        self.entries
            .read()
            .get(&user)
            .copied()
            .ok_or(CoreError::LocationNotFound { user })
    }

    async fn find_nearby(
        &self,
        user: UserHandle,
        center: Coordinate,
        radius_km: f64,
    ) -> Result<Vec<UserHandle>> {
        let entries = self.entries.read();
        Ok(rank_nearby(
            entries.iter().map(|(u, c)| (*u, *c)),
            user,
            &center,
            radius_km,
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Point `km` kilometres due north of `origin`.
    pub(crate) fn north_of(origin: Coordinate, km: f64) -> Coordinate {
        Coordinate::new(
            origin.latitude + (km / EARTH_RADIUS_KM).to_degrees(),
            origin.longitude,
        )
    }

    const MOSCOW: Coordinate = Coordinate::new(55.7558, 37.6173);

    #[test]
    fn haversine_matches_known_distance() {
        let saint_petersburg = Coordinate::new(59.9311, 30.3609);
        let d = MOSCOW.distance_km(&saint_petersburg);
        assert!((d - 634.0).abs() < 5.0, "got {d}");
        assert_eq!(MOSCOW.distance_km(&MOSCOW), 0.0);
    }

    #[test]
    fn invalid_coordinates() {
        assert!(!Coordinate::new(0.0, 0.0).is_valid());
        assert!(!Coordinate::new(f64::NAN, 10.0).is_valid());
        assert!(!Coordinate::new(91.0, 10.0).is_valid());
        assert!(!Coordinate::new(10.0, -181.0).is_valid());
        assert!(Coordinate::new(0.0, 10.0).is_valid());
    }

    #[test]
    fn bounding_box_covers_radius() {
        let bbox = BoundingBox::around(&MOSCOW, 10.0);
        assert!(bbox.contains(&north_of(MOSCOW, 9.9)));
        assert!(!bbox.contains(&north_of(MOSCOW, 12.0)));

        let near_antimeridian = Coordinate::new(10.0, 179.99);
        assert_eq!(BoundingBox::around(&near_antimeridian, 5.0).longitude, None);
    }

    #[test]
    fn bounding_box_reaching_a_pole_spans_all_longitudes() {
        let center = Coordinate::new(89.96, 0.0);
        let over_the_pole = Coordinate::new(89.96, 180.0);
        assert!(center.distance_km(&over_the_pole) < 10.0);

        let bbox = BoundingBox::around(&center, 10.0);
        assert_eq!(bbox.longitude, None);
        assert_eq!(bbox.max_latitude, 90.0);
        assert!(bbox.contains(&over_the_pole));

        let south = BoundingBox::around(&Coordinate::new(-89.99, 45.0), 5.0);
        assert_eq!(south.longitude, None);
        assert_eq!(south.min_latitude, -90.0);
    }

    #[test]
    fn bounding_box_is_wide_enough_at_high_latitude() {
        let center = Coordinate::new(89.5, 0.0);
        // near the circle's easternmost point, past a plain 1/cos(lat) width
        let east_edge = Coordinate::new(89.508, 10.35);
        assert!(center.distance_km(&east_edge) < 10.0);

        let bbox = BoundingBox::around(&center, 10.0);
        assert!(bbox.longitude.is_some());
        assert!(bbox.contains(&east_edge));
        assert!(!bbox.contains(&Coordinate::new(89.5, 20.0)));
    }

    #[tokio::test]
    async fn round_trip_is_exact() {
        let index = MemoryGeoIndex::new();
        let user = UserHandle(1);
        index
            .add_user_location(user, Coordinate::new(10.0, 20.0))
            .await
            .unwrap();
        assert_eq!(
            index.get_user_location(user).await.unwrap(),
            Coordinate::new(10.0, 20.0)
        );

        index
            .add_user_location(user, Coordinate::new(11.0, 21.0))
            .await
            .unwrap();
        assert_eq!(
            index.get_user_location(user).await.unwrap(),
            Coordinate::new(11.0, 21.0)
        );
    }

    #[tokio::test]
    async fn missing_location_is_not_found() {
        let index = MemoryGeoIndex::new();
        assert!(matches!(
            index.get_user_location(UserHandle(3)).await,
            Err(CoreError::LocationNotFound { user: UserHandle(3) })
        ));
        // removal is idempotent
        index.remove_user_location(UserHandle(3)).await.unwrap();
    }

    #[tokio::test]
    async fn find_nearby_filters_and_orders() {
        let index = MemoryGeoIndex::new();
        let center = MOSCOW;
        index
            .add_user_location(UserHandle(15), north_of(center, 15.0))
            .await
            .unwrap();
        index
            .add_user_location(UserHandle(5), north_of(center, 5.0))
            .await
            .unwrap();
        index
            .add_user_location(UserHandle(1), north_of(center, 1.0))
            .await
            .unwrap();

        let found = index
            .find_nearby(UserHandle(100), center, 10.0)
            .await
            .unwrap();
        assert_eq!(found, vec![UserHandle(1), UserHandle(5)]);
    }

    #[tokio::test]
    async fn find_nearby_excludes_self() {
        let index = MemoryGeoIndex::new();
        let me = UserHandle(7);
        let other = UserHandle(8);
        index.add_user_location(me, MOSCOW).await.unwrap();
        index.add_user_location(other, MOSCOW).await.unwrap();

        assert_eq!(
            index.find_nearby(me, MOSCOW, 0.0).await.unwrap(),
            vec![other]
        );
        assert_eq!(
            index.find_nearby(other, MOSCOW, 0.0).await.unwrap(),
            vec![me]
        );
        // negative radius behaves like zero
        assert_eq!(
            index.find_nearby(other, MOSCOW, -3.0).await.unwrap(),
            vec![me]
        );
    }

    #[test]
    fn equal_distances_break_ties_by_handle() {
        let entries = vec![
            (UserHandle(9), MOSCOW),
            (UserHandle(2), MOSCOW),
            (UserHandle(4), MOSCOW),
        ];
        assert_eq!(
            rank_nearby(entries, UserHandle(0), &MOSCOW, 1.0),
            vec![UserHandle(2), UserHandle(4), UserHandle(9)]
        );
    }
}

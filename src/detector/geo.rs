use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::types::Location;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone)]
struct LocationRecord {
    location: Location,
    seen_at: DateTime<Utc>,
}

/// Last known location per account. One record per account, overwritten on
/// every update, behind a single map-wide lock.
#[derive(Default)]
pub struct GeoAnalyzer {
    last_locations: RwLock<HashMap<String, LocationRecord>>,
}

impl GeoAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_location(&self, account_id: &str, location: Location) {
        let mut records = self
            .last_locations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        records.insert(
            account_id.to_string(),
            LocationRecord {
                location,
                seen_at: Utc::now(),
            },
        );
    }

    pub fn last_location(&self, account_id: &str) -> Option<Location> {
        self.last_observation(account_id).map(|(location, _)| location)
    }

    /// When the account was last observed, or the Unix epoch if never.
    pub fn last_seen(&self, account_id: &str) -> DateTime<Utc> {
        self.last_observation(account_id)
            .map(|(_, seen_at)| seen_at)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Location and observation time read under one lock acquisition.
    pub fn last_observation(&self, account_id: &str) -> Option<(Location, DateTime<Utc>)> {
        let records = self
            .last_locations
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        records
            .get(account_id)
            .map(|r| (r.location.clone(), r.seen_at))
    }

    pub fn calculate_distance(&self, from: &Location, to: &Location) -> f64 {
        haversine_km(from, to)
    }

    pub fn tracked_accounts(&self) -> usize {
        self.last_locations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Great-circle distance in kilometers.
pub fn haversine_km(from: &Location, to: &Location) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let delta_lat = (to.latitude - from.latitude).to_radians();
    let delta_lon = (to.longitude - from.longitude).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

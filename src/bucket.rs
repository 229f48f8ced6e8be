//! Coordinate quantization.
//!
//! Raw GPS precision is discarded here, before anything reaches storage.
//! Coordinates are rounded to 3 decimal places (~100 m) and the rounded
//! pair is the bucket identity.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

const SCALE: f64 = 1000.0;

/// Round a coordinate to 3 decimals, half away from zero.
pub fn quantize(value: f64) -> f64 {
    (value * SCALE).round() / SCALE
}

/// Identity of a location bucket.
///
/// Stored as integer thousandths so two keys compare exactly; float
/// equality never decides bucket membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    lat_milli: i32,
    lng_milli: i32,
}

impl BucketKey {
    pub fn from_coords(lat: f64, lng: f64) -> Self {
        Self {
            lat_milli: (lat * SCALE).round() as i32,
            lng_milli: (lng * SCALE).round() as i32,
        }
    }

    pub fn lat(&self) -> f64 {
        f64::from(self.lat_milli) / SCALE
    }

    pub fn lng(&self) -> f64 {
        f64::from(self.lng_milli) / SCALE
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}_{:.3}", self.lat(), self.lng())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseBucketKeyError(String);

impl fmt::Display for ParseBucketKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid bucket key: {}", self.0)
    }
}

impl std::error::Error for ParseBucketKeyError {}

impl FromStr for BucketKey {
    type Err = ParseBucketKeyError;

    /// Parses `"{lat}_{lng}"`. Any precision is accepted and quantized.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lng) = s
            .split_once('_')
            .ok_or_else(|| ParseBucketKeyError(s.to_string()))?;

        let lat: f64 = lat
            .parse()
            .map_err(|_| ParseBucketKeyError(s.to_string()))?;
        let lng: f64 = lng
            .parse()
            .map_err(|_| ParseBucketKeyError(s.to_string()))?;

        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(ParseBucketKeyError(s.to_string()));
        }

        Ok(Self::from_coords(lat, lng))
    }
}

impl Serialize for BucketKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BucketKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

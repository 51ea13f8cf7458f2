//! Geographic points and distance metrics

use cepline_core::Value;
use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub latitude: f64,
    pub longitude: f64,
}

impl Point {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Decode a point from an attribute value.
    ///
    /// Accepts a map with `latitude`/`longitude` (or `lat`/`lon`/`lng`)
    /// and a two-element `[latitude, longitude]` array.
    pub fn from_value(value: &Value) -> Option<Point> {
        match value {
            Value::Map(_) => {
                let lat = ["latitude", "lat"]
                    .iter()
                    .find_map(|k| value.get(k).and_then(Value::as_float))?;
                let lon = ["longitude", "lon", "lng"]
                    .iter()
                    .find_map(|k| value.get(k).and_then(Value::as_float))?;
                Some(Point::new(lat, lon))
            }
            Value::Array(items) if items.len() == 2 => Some(Point::new(
                items[0].as_float()?,
                items[1].as_float()?,
            )),
            _ => None,
        }
    }
}

impl From<Point> for Value {
    fn from(p: Point) -> Self {
        Value::map([("latitude", p.latitude), ("longitude", p.longitude)])
    }
}

/// Distance between two points, in meters for the bundled metrics.
pub trait DistanceMetric: Send + Sync {
    fn distance(&self, a: &Point, b: &Point) -> f64;
}

impl<F> DistanceMetric for F
where
    F: Fn(&Point, &Point) -> f64 + Send + Sync,
{
    fn distance(&self, a: &Point, b: &Point) -> f64 {
        self(a, b)
    }
}

/// Great-circle distance on a sphere
#[derive(Debug, Clone, Copy)]
pub struct Haversine {
    pub radius: f64,
}

impl Default for Haversine {
    fn default() -> Self {
        Self {
            radius: EARTH_RADIUS_M,
        }
    }
}

impl DistanceMetric for Haversine {
    fn distance(&self, a: &Point, b: &Point) -> f64 {
        let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (b.longitude - a.longitude).to_radians();
        let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * self.radius * h.sqrt().min(1.0).asin()
    }
}

//! Geofence geometry and the in-process geospatial query implementation.
//!
//! Membership is a point-in-circle or ray-cast point-in-polygon test; the
//! reported distance is to the nearest boundary segment, computed on a local
//! equirectangular projection which is accurate at geofence scale.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use fleetwatch_domain::{DomainError, DomainResult, GeofencePosition, GeofenceQuery};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, PartialEq)]
pub enum GeofenceShape {
    Circle {
        center_lat: f64,
        center_lon: f64,
        radius_m: f64,
    },
    Polygon {
        /// (latitude, longitude) vertices, implicitly closed
        vertices: Vec<(f64, f64)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Geofence {
    pub id: Uuid,
    pub name: String,
    pub shape: GeofenceShape,
}

/// Great-circle distance between two points, in meters.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

fn point_in_polygon(lat: f64, lon: f64, vertices: &[(f64, f64)]) -> bool {
    let mut inside = false;
    let n = vertices.len();
    let mut j = n - 1;
    for i in 0..n {
        let (yi, xi) = vertices[i];
        let (yj, xj) = vertices[j];
        if ((yi > lat) != (yj > lat))
            && (lon < (xj - xi) * (lat - yi) / (yj - yi) + xi)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Distance from a point to a polygon boundary, in meters. Projects onto a
/// plane tangent at the query point before measuring segment distances.
fn distance_to_polygon_m(lat: f64, lon: f64, vertices: &[(f64, f64)]) -> f64 {
    let meters_per_deg_lat = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
    let meters_per_deg_lon = meters_per_deg_lat * lat.to_radians().cos();

    let project = |(v_lat, v_lon): (f64, f64)| {
        (
            (v_lon - lon) * meters_per_deg_lon,
            (v_lat - lat) * meters_per_deg_lat,
        )
    };

    let mut min_dist = f64::MAX;
    let n = vertices.len();
    for i in 0..n {
        let (ax, ay) = project(vertices[i]);
        let (bx, by) = project(vertices[(i + 1) % n]);
        min_dist = min_dist.min(point_segment_distance(ax, ay, bx, by));
    }
    min_dist
}

/// Distance from the origin to the segment (a, b).
fn point_segment_distance(ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    let (dx, dy) = (bx - ax, by - ay);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (-(ax * dx + ay * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (ax + t * dx, ay + t * dy);
    (cx * cx + cy * cy).sqrt()
}

impl Geofence {
    pub fn locate(&self, lat: f64, lon: f64) -> GeofencePosition {
        match &self.shape {
            GeofenceShape::Circle {
                center_lat,
                center_lon,
                radius_m,
            } => {
                let d = haversine_m(lat, lon, *center_lat, *center_lon);
                GeofencePosition {
                    inside: d <= *radius_m,
                    distance_m: (d - radius_m).abs(),
                }
            }
            GeofenceShape::Polygon { vertices } => GeofencePosition {
                inside: point_in_polygon(lat, lon, vertices),
                distance_m: distance_to_polygon_m(lat, lon, vertices),
            },
        }
    }
}

/// In-memory geofence index implementing the geospatial query interface.
#[derive(Default)]
pub struct InMemoryGeofenceIndex {
    geofences: Arc<RwLock<HashMap<Uuid, Geofence>>>,
}

impl InMemoryGeofenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, geofence: Geofence) {
        self.geofences.write().await.insert(geofence.id, geofence);
    }
}

#[async_trait]
impl GeofenceQuery for InMemoryGeofenceIndex {
    async fn locate(
        &self,
        geofence_id: Uuid,
        latitude: f64,
        longitude: f64,
    ) -> DomainResult<GeofencePosition> {
        let geofences = self.geofences.read().await;
        let geofence = geofences
            .get(&geofence_id)
            .ok_or_else(|| DomainError::GeofenceNotFound(geofence_id.to_string()))?;
        Ok(geofence.locate(latitude, longitude))
    }
}

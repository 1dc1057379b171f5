//! Event geometry wrapper with the session's equality semantics.
//!
//! Hazard geometries are polygons, points, or multipolygons in lon/lat
//! degrees. The mutation guard must treat two geometries as "the same" when
//! they are topologically equal even if their coordinate sequences differ
//! (e.g. a rotated ring start point), so equality here is topological first
//! and coordinate-exact as the fallback.

use geo::{Geometry, MultiPolygon, Point, Polygon, Relate};
use serde::{Deserialize, Serialize};

/// The geographic footprint of a hazard event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventGeometry(pub Geometry<f64>);

impl EventGeometry {
    /// Wrap a polygon footprint.
    pub fn polygon(polygon: Polygon<f64>) -> Self {
        Self(Geometry::Polygon(polygon))
    }

    /// Wrap a point footprint (e.g. a storm-report location).
    pub fn point(point: Point<f64>) -> Self {
        Self(Geometry::Point(point))
    }

    /// Wrap a multipolygon footprint.
    pub fn multi_polygon(multi: MultiPolygon<f64>) -> Self {
        Self(Geometry::MultiPolygon(multi))
    }

    /// Borrow the inner geometry.
    pub const fn inner(&self) -> &Geometry<f64> {
        &self.0
    }

    /// The session's change-detection equality: topological equality,
    /// falling back to coordinate-exact equality.
    pub fn equivalent(&self, other: &Self) -> bool {
        if self.0 == other.0 {
            return true;
        }
        self.0.relate(&other.0).is_equal_topo()
    }

    /// Decompose the footprint into its polygon parts.
    ///
    /// Points contribute nothing; they only participate in spatial checks
    /// through a hatch spec that expands them (point/circle hatching).
    pub fn polygons(&self) -> Vec<Polygon<f64>> {
        match &self.0 {
            Geometry::Polygon(polygon) => vec![polygon.clone()],
            Geometry::MultiPolygon(multi) => multi.0.clone(),
            _ => Vec::new(),
        }
    }

    /// Total number of exterior-ring coordinates across all polygon parts.
    ///
    /// Compared against the per-hazard-type point limit.
    pub fn exterior_point_count(&self) -> usize {
        self.polygons()
            .iter()
            .map(|polygon| polygon.exterior().0.len())
            .sum()
    }
}

impl From<Geometry<f64>> for EventGeometry {
    fn from(geometry: Geometry<f64>) -> Self {
        Self(geometry)
    }
}

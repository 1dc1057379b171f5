//! The hatch-area collaborator: geometry to geographic representation.
//!
//! A hazard's "hatched area" is the representation used for spatial
//! conflict testing and public area lists: either a set of named
//! geographic zones or a set of raw polygons. The session consumes the
//! [`HatchResolver`] trait; [`ZoneTableResolver`] implements it against a
//! configured zone table and covers all three [`HatchSpec`] shapes.

use std::collections::BTreeSet;

use geo::{Centroid, Intersects, Point, Polygon};
use squall_types::EventGeometry;

use crate::config::HatchSpec;

/// Number of vertices used to approximate a point-radius circle.
const CIRCLE_VERTICES: usize = 32;

/// Errors surfaced by a hatch-area resolver.
#[derive(Debug, thiserror::Error)]
#[error("hatched-area resolution failed: {reason}")]
pub struct HatchError {
    /// Description of the failure.
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Hatched area
// ---------------------------------------------------------------------------

/// One cell of a hatched area: a polygon, optionally labeled with the
/// geographic zone it represents.
#[derive(Debug, Clone, PartialEq)]
pub struct HatchCell {
    /// The zone name, when this cell is a named zone.
    pub zone: Option<String>,
    /// The cell's footprint.
    pub shape: Polygon<f64>,
}

/// A hazard's hatched area: the set of cells covering it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HatchedArea {
    /// The covering cells.
    pub cells: Vec<HatchCell>,
}

impl HatchedArea {
    /// Whether no cell covers the hazard.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Whether every cell is a named zone (the zonal representation).
    pub fn is_zonal(&self) -> bool {
        !self.cells.is_empty() && self.cells.iter().all(|cell| cell.zone.is_some())
    }

    /// The set of zone names across all named cells.
    pub fn zone_names(&self) -> BTreeSet<&str> {
        self.cells
            .iter()
            .filter_map(|cell| cell.zone.as_deref())
            .collect()
    }
}

/// The hatch-area collaborator.
pub trait HatchResolver: Send + Sync {
    /// Build the hatched area for an event geometry under the given spec.
    ///
    /// An empty result is not an error; the session decides whether to
    /// warn the forecaster.
    fn build_hatched_area(
        &self,
        spec: &HatchSpec,
        geometry: &EventGeometry,
    ) -> Result<HatchedArea, HatchError>;
}

// ---------------------------------------------------------------------------
// Zone-table resolver
// ---------------------------------------------------------------------------

/// A named geographic zone in the resolver's table.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedZone {
    /// Public zone name (e.g. a county or forecast-zone code).
    pub name: String,
    /// The zone's footprint.
    pub shape: Polygon<f64>,
}

/// [`HatchResolver`] backed by an in-memory named-zone table.
#[derive(Debug, Clone, Default)]
pub struct ZoneTableResolver {
    zones: Vec<NamedZone>,
}

impl ZoneTableResolver {
    /// Create a resolver over the given zone table.
    pub const fn new(zones: Vec<NamedZone>) -> Self {
        Self { zones }
    }
}

impl HatchResolver for ZoneTableResolver {
    fn build_hatched_area(
        &self,
        spec: &HatchSpec,
        geometry: &EventGeometry,
    ) -> Result<HatchedArea, HatchError> {
        match spec {
            HatchSpec::ZoneIntersection => {
                let cells = self
                    .zones
                    .iter()
                    .filter(|zone| zone.shape.intersects(geometry.inner()))
                    .map(|zone| HatchCell {
                        zone: Some(zone.name.clone()),
                        shape: zone.shape.clone(),
                    })
                    .collect();
                Ok(HatchedArea { cells })
            }
            HatchSpec::PointRadius { radius_degrees } => {
                let center = geometry.inner().centroid().ok_or_else(|| HatchError {
                    reason: "geometry has no centroid for point-radius hatching".to_owned(),
                })?;
                Ok(HatchedArea {
                    cells: vec![HatchCell {
                        zone: None,
                        shape: circle_around(center, *radius_degrees),
                    }],
                })
            }
            HatchSpec::Direct => {
                let cells = geometry
                    .polygons()
                    .into_iter()
                    .map(|shape| HatchCell { zone: None, shape })
                    .collect();
                Ok(HatchedArea { cells })
            }
        }
    }
}

/// Approximate a circle as a closed polygon. Bounded float trig over a
/// fixed vertex count.
#[allow(clippy::arithmetic_side_effects, clippy::cast_precision_loss)]
fn circle_around(center: Point<f64>, radius: f64) -> Polygon<f64> {
    let ring: Vec<(f64, f64)> = (0..CIRCLE_VERTICES)
        .map(|index| {
            let angle = std::f64::consts::TAU * (index as f64) / (CIRCLE_VERTICES as f64);
            (
                center.x() + radius * angle.cos(),
                center.y() + radius * angle.sin(),
            )
        })
        .collect();
    Polygon::new(ring.into(), Vec::new())
}

//! Spatio-temporal conflict detection between hazard events.
//!
//! Two events are conflict candidates only when their hazard types list
//! each other in their configured conflict lists. Candidates are rejected
//! cheaply on temporal non-overlap before any geometry work; surviving
//! pairs are compared through their hatched areas. The full map is
//! recomputed from scratch on any notification that could change it, and a
//! change notification fires only when the recomputed map differs from the
//! cached one by value.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use geo::Intersects;
use squall_types::{ConflictMap, EventId};
use tracing::warn;

use crate::alert::AlertChannel;
use crate::config::{HatchSpec, HazardTypeTable};
use crate::hatch::{HatchError, HatchResolver, HatchedArea};
use crate::record::EventRecord;

/// Detector holding the cached conflict map for the selected events.
#[derive(Debug, Default)]
pub struct ConflictDetector {
    current: ConflictMap,
}

impl ConflictDetector {
    /// Create a detector with an empty cached map.
    pub const fn new() -> Self {
        Self {
            current: BTreeMap::new(),
        }
    }

    /// The cached conflict map from the last recomputation.
    pub const fn current(&self) -> &ConflictMap {
        &self.current
    }

    /// Drop the cached entries for a removed event.
    pub fn purge(&mut self, event_id: &EventId) {
        self.current.remove(event_id);
        for entries in self.current.values_mut() {
            entries.remove(event_id);
        }
        self.current.retain(|_id, entries| !entries.is_empty());
    }

    /// Recompute the cached map for the given subjects against the given
    /// candidates. Returns whether the map changed (by value).
    ///
    /// # Errors
    ///
    /// Propagates [`HatchError`] from the hatch-area collaborator.
    pub fn recompute(
        &mut self,
        subjects: &[&EventRecord],
        candidates: &[&EventRecord],
        table: &HazardTypeTable,
        resolver: &dyn HatchResolver,
        alerts: &dyn AlertChannel,
    ) -> Result<bool, HatchError> {
        let fresh = Self::compute(subjects, candidates, table, resolver, alerts)?;
        if fresh == self.current {
            return Ok(false);
        }
        self.current = fresh;
        Ok(true)
    }

    /// Compute a conflict map for the given subjects against the given
    /// candidates, without touching any cache.
    ///
    /// The result is symmetric: when X conflicts with Y, both directions
    /// appear with an identical area-name list.
    ///
    /// # Errors
    ///
    /// Propagates [`HatchError`] from the hatch-area collaborator.
    pub fn compute(
        subjects: &[&EventRecord],
        candidates: &[&EventRecord],
        table: &HazardTypeTable,
        resolver: &dyn HatchResolver,
        alerts: &dyn AlertChannel,
    ) -> Result<ConflictMap, HatchError> {
        let mut map = ConflictMap::new();
        let mut areas: BTreeMap<EventId, HatchedArea> = BTreeMap::new();

        for subject in subjects {
            for candidate in candidates {
                if subject.record_id() == candidate.record_id() {
                    continue;
                }
                if !pair_eligible(subject, candidate, table) {
                    continue;
                }
                // Cheap rejection before any geometry work.
                if !subject.time_range().overlaps(candidate.time_range()) {
                    continue;
                }

                let Some(names) =
                    spatial_conflict(subject, candidate, table, resolver, alerts, &mut areas)?
                else {
                    continue;
                };

                map.entry(subject.event_id().clone())
                    .or_default()
                    .insert(candidate.event_id().clone(), names.clone());
                map.entry(candidate.event_id().clone())
                    .or_default()
                    .insert(subject.event_id().clone(), names);
            }
        }

        Ok(map)
    }
}

/// Whether each event's type lists the other's in its conflict list.
///
/// A missing table entry is logged as a warning and contributes no
/// conflicts; it is not fatal.
fn pair_eligible(a: &EventRecord, b: &EventRecord, table: &HazardTypeTable) -> bool {
    let (Some(type_a), Some(type_b)) = (a.hazard_type(), b.hazard_type()) else {
        return false;
    };
    let key_a = type_a.type_key();
    let key_b = type_b.type_key();

    let Some(config_a) = table.get_by_key(&key_a) else {
        warn!(type_key = %key_a, "no conflict configuration for hazard type");
        return false;
    };
    let Some(config_b) = table.get_by_key(&key_b) else {
        warn!(type_key = %key_b, "no conflict configuration for hazard type");
        return false;
    };

    config_a.conflict_list.contains(&key_b) && config_b.conflict_list.contains(&key_a)
}

/// Resolve both hatched areas (memoized per event) and test them for
/// spatial conflict. Returns the reported area names on conflict.
fn spatial_conflict(
    subject: &EventRecord,
    candidate: &EventRecord,
    table: &HazardTypeTable,
    resolver: &dyn HatchResolver,
    alerts: &dyn AlertChannel,
    areas: &mut BTreeMap<EventId, HatchedArea>,
) -> Result<Option<Vec<String>>, HatchError> {
    let subject_area = resolve_area(subject, table, resolver, alerts, areas)?;
    let candidate_area = resolve_area(candidate, table, resolver, alerts, areas)?;

    if subject_area.is_zonal() && candidate_area.is_zonal() {
        // Named-zone representation on both sides: conflict is a
        // non-empty intersection of the zone-name sets.
        let subject_names = subject_area.zone_names();
        let candidate_names = candidate_area.zone_names();
        let shared: Vec<String> = subject_names
            .intersection(&candidate_names)
            .map(|name| (*name).to_owned())
            .collect();
        if shared.is_empty() {
            return Ok(None);
        }
        return Ok(Some(shared));
    }

    // At least one side is a raw-polygon representation: conflict is any
    // pairwise polygon intersection, with names collected from whichever
    // side carries zone labels.
    let mut names: BTreeSet<String> = BTreeSet::new();
    let mut intersects = false;
    for cell_a in &subject_area.cells {
        for cell_b in &candidate_area.cells {
            if cell_a.shape.intersects(&cell_b.shape) {
                intersects = true;
                if let Some(zone) = &cell_a.zone {
                    names.insert(zone.clone());
                }
                if let Some(zone) = &cell_b.zone {
                    names.insert(zone.clone());
                }
            }
        }
    }

    if intersects {
        Ok(Some(names.into_iter().collect()))
    } else {
        Ok(None)
    }
}

/// Look up an event's hatched area, building and memoizing it on first
/// use. An empty hatched area for a non-trivial geometry is reported
/// through the warning channel.
fn resolve_area(
    event: &EventRecord,
    table: &HazardTypeTable,
    resolver: &dyn HatchResolver,
    alerts: &dyn AlertChannel,
    areas: &mut BTreeMap<EventId, HatchedArea>,
) -> Result<HatchedArea, HatchError> {
    if let Some(existing) = areas.get(event.event_id()) {
        return Ok(existing.clone());
    }
    let Some(hazard_type) = event.hazard_type() else {
        return Ok(HatchedArea::default());
    };
    let spec = table
        .get(hazard_type)
        .map(|config| config.hatch_area.clone())
        .unwrap_or(HatchSpec::Direct);
    let area = resolver.build_hatched_area(&spec, event.geometry())?;
    if area.is_empty() {
        alerts.fatal(&format!(
            "hatched-area computation produced an empty result for event {}",
            event.event_id()
        ));
    }
    areas.insert(event.event_id().clone(), area.clone());
    Ok(area)
}

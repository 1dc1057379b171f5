//! Typed configuration for the hazard-event session.
//!
//! Configuration is an explicit struct built once at startup and passed
//! into the session by reference or ownership -- there are no process-wide
//! lookup tables. File loading belongs to the embedding application; this
//! module only defines the shapes (all serde-deserializable so an embedder
//! can read them from whatever format it uses).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use squall_types::{HazardType, ProductClass, SiteId, Status};

// ---------------------------------------------------------------------------
// Hatch specification
// ---------------------------------------------------------------------------

/// How a hazard type's geometry is turned into its hatched area -- the
/// geographic representation used for conflict testing and public area
/// lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum HatchSpec {
    /// Intersect the event geometry with the configured named-zone table;
    /// the hatched area is the set of intersected zones.
    ZoneIntersection,
    /// Expand the event's point (or polygon centroid) into a circle of the
    /// given radius; the hatched area is one unnamed polygon.
    PointRadius {
        /// Circle radius in the geometry's coordinate degrees.
        radius_degrees: f64,
    },
    /// Use the event geometry itself as a set of unnamed polygons.
    Direct,
}

// ---------------------------------------------------------------------------
// Per-hazard-type configuration
// ---------------------------------------------------------------------------

/// Per-hazard-type behavior table entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardTypeConfig {
    /// Type keys (`phenomenon.significance`) this type conflicts with.
    /// A pair of events is only a conflict candidate when each type lists
    /// the other.
    #[serde(default)]
    pub conflict_list: BTreeSet<String>,
    /// Whether the geometry may change after issuance.
    #[serde(default)]
    pub allow_area_change: bool,
    /// Whether the time range may change after issuance.
    #[serde(default)]
    pub allow_time_change: bool,
    /// Whether the end time may be set to "until further notice".
    #[serde(default)]
    pub allow_until_further_notice: bool,
    /// How this type's hatched area is built.
    pub hatch_area: HatchSpec,
    /// Maximum number of exterior polygon points a geometry may carry;
    /// `None` means unlimited.
    #[serde(default)]
    pub point_limit: Option<usize>,
}

impl Default for HazardTypeConfig {
    fn default() -> Self {
        Self {
            conflict_list: BTreeSet::new(),
            allow_area_change: false,
            allow_time_change: false,
            allow_until_further_notice: false,
            hatch_area: HatchSpec::Direct,
            point_limit: None,
        }
    }
}

/// The hazard-type behavior table, keyed by `phenomenon.significance`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HazardTypeTable(pub BTreeMap<String, HazardTypeConfig>);

impl HazardTypeTable {
    /// Create an empty table.
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Insert a type entry, replacing any existing one for the same key.
    pub fn insert(&mut self, key: &str, config: HazardTypeConfig) {
        self.0.insert(key.to_owned(), config);
    }

    /// Look up the entry for a hazard type, if the table knows it.
    pub fn get(&self, hazard_type: &HazardType) -> Option<&HazardTypeConfig> {
        self.0.get(&hazard_type.type_key())
    }

    /// Look up an entry by its raw type key.
    pub fn get_by_key(&self, key: &str) -> Option<&HazardTypeConfig> {
        self.0.get(key)
    }
}

// ---------------------------------------------------------------------------
// Display settings
// ---------------------------------------------------------------------------

/// The active display-filter settings of the session.
///
/// Events loaded with a pre-set status are only honored when they pass
/// this filter; the filter also scopes the `events_for_settings` accessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplaySettings {
    /// Sites whose events are visible; empty means all sites.
    #[serde(default)]
    pub visible_sites: BTreeSet<SiteId>,
    /// Type keys visible in the display; empty means all types.
    #[serde(default)]
    pub visible_types: BTreeSet<String>,
    /// Statuses visible in the display; empty means all statuses.
    #[serde(default)]
    pub visible_statuses: BTreeSet<Status>,
    /// Category attribute stamped onto new events.
    pub default_category: String,
    /// Default validity duration, in seconds, for new events without an
    /// end time.
    pub default_duration_secs: i64,
    /// When true, a newly added event joins the current selection instead
    /// of replacing it.
    #[serde(default)]
    pub add_to_selected: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            visible_sites: BTreeSet::new(),
            visible_types: BTreeSet::new(),
            visible_statuses: BTreeSet::new(),
            default_category: "Hydrology".to_owned(),
            default_duration_secs: 3600,
            add_to_selected: false,
        }
    }
}

impl DisplaySettings {
    /// Whether an event with the given site, type key, and status passes
    /// the filter. `None` values fail a non-empty corresponding filter.
    pub fn passes(
        &self,
        site: &SiteId,
        type_key: Option<&str>,
        status: Status,
    ) -> bool {
        let site_ok = self.visible_sites.is_empty() || self.visible_sites.contains(site);
        let type_ok = self.visible_types.is_empty()
            || type_key.is_some_and(|key| self.visible_types.contains(key));
        let status_ok =
            self.visible_statuses.is_empty() || self.visible_statuses.contains(&status);
        site_ok && type_ok && status_ok
    }
}

// ---------------------------------------------------------------------------
// Session configuration
// ---------------------------------------------------------------------------

/// Complete configuration handed to the session at construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// The site that owns this session.
    pub site_id: SiteId,
    /// Operating mode stamped onto new events.
    #[serde(default)]
    pub product_class: ProductClass,
    /// Per-hazard-type behavior table.
    #[serde(default)]
    pub hazard_types: HazardTypeTable,
    /// Active display-filter settings.
    #[serde(default)]
    pub settings: DisplaySettings,
}

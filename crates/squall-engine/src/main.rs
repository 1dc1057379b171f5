//! Demo binary for the Squall hazard-event session.
//!
//! This is the main entry point that wires together the simulated clock,
//! the in-memory store, the zone-table hatch resolver, and the session
//! manager, then drives a scripted flash-flood scenario: two overlapping
//! warnings are drawn, selected, and issued, and the accelerated clock
//! expires them while the engine pumps the session.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `squall-config.json`
//! 3. Create the simulated clock (60x wall speed)
//! 4. Create the store, zone table, and id generator
//! 5. Build the session and attach a logging subscriber
//! 6. Run the scripted scenario
//! 7. Pump the session until every issued event has ended
//! 8. Shut the session down

mod error;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use geo::polygon;
use squall_core::{
    DisplaySettings, DraftEvent, EventStore, HatchSpec, HazardTypeConfig, HazardTypeTable,
    LogAlertChannel, MemoryStore, NamedZone, SessionClock, SessionConfig, SessionManager,
    SessionParams,
    SimulatedClock, SiteSequenceIds, ZoneTableResolver,
};
use squall_events::{Notification, NotificationKind};
use squall_types::{EventGeometry, HazardType, Originator, ProductClass, SiteId, Status};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// How much faster than wall time the demo clock runs.
const CLOCK_RATE: f64 = 60.0;

/// Pump interval for the session tick loop.
const PUMP_INTERVAL: Duration = Duration::from_millis(250);

/// Upper bound on pump iterations, so the demo always terminates.
const MAX_PUMP_STEPS: usize = 400;

/// Application entry point for the Squall engine.
///
/// Initializes all subsystems and runs the scripted session.
///
/// # Errors
///
/// Returns an error if any initialization step or session operation fails.
#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("squall-engine starting");

    // 2. Load configuration.
    let config = load_config()?;
    info!(
        site_id = %config.site_id,
        hazard_types = config.hazard_types.0.len(),
        default_duration_secs = config.settings.default_duration_secs,
        "Configuration loaded"
    );

    // 3. Create the simulated clock at accelerated speed.
    let clock = Arc::new(SimulatedClock::new(Utc::now()));
    clock.set_rate(CLOCK_RATE);
    info!(rate = CLOCK_RATE, now = %clock.now(), "Simulated clock initialized");

    // 4. Create the remaining collaborators.
    let store = Arc::new(MemoryStore::new());
    let resolver = Arc::new(demo_zone_table());
    let ids = Arc::new(SiteSequenceIds::new());

    // 5. Build the session and attach a logging subscriber.
    let mut session = SessionManager::new(SessionParams {
        config,
        clock: Arc::clone(&clock) as Arc<dyn SessionClock>,
        store: Arc::clone(&store) as Arc<dyn EventStore>,
        resolver,
        ids,
        alerts: Arc::new(LogAlertChannel),
    });
    attach_log_subscriber(&mut session);

    // 6. Run the scripted scenario: two overlapping warnings.
    let flash_flood = session.add_event(
        DraftEvent::new(EventGeometry::polygon(polygon![
            (x: -96.9, y: 41.1),
            (x: -96.4, y: 41.1),
            (x: -96.4, y: 41.5),
            (x: -96.9, y: 41.5),
        ]))
        .with_hazard_type(HazardType::new("FF", "W")),
        Originator::User,
    )?;
    let areal_flood = session.add_event(
        DraftEvent::new(EventGeometry::polygon(polygon![
            (x: -96.7, y: 41.3),
            (x: -96.2, y: 41.3),
            (x: -96.2, y: 41.7),
            (x: -96.7, y: 41.7),
        ]))
        .with_hazard_type(HazardType::new("FA", "W")),
        Originator::User,
    )?;

    session.select_events(
        &[flash_flood.clone(), areal_flood.clone()]
            .into_iter()
            .collect(),
        Originator::User,
    )?;
    info!(
        conflicts = session.conflicts().len(),
        "Events drawn and selected"
    );

    session.issue(&flash_flood, Originator::User)?;
    session.issue(&areal_flood, Originator::User)?;
    info!(
        snapshots = store.event_count(),
        "Both warnings issued and persisted"
    );

    // 7. Pump the session until every issued event has ended.
    let mut interval = tokio::time::interval(PUMP_INTERVAL);
    for step in 0..MAX_PUMP_STEPS {
        interval.tick().await;
        session.tick()?;
        let still_issued = session
            .events()
            .iter()
            .filter(|event| event.status() == Status::Issued)
            .count();
        if still_issued == 0 {
            info!(step, "All warnings have expired");
            break;
        }
    }

    // 8. Shut the session down.
    session.shutdown();
    info!(
        events = session.events().len(),
        snapshots = store.event_count(),
        "squall-engine shutdown complete"
    );

    Ok(())
}

/// Load the session configuration from `squall-config.json`.
///
/// Looks for the config file relative to the current working directory;
/// without one, a built-in demo configuration is used.
fn load_config() -> Result<SessionConfig, EngineError> {
    let config_path = Path::new("squall-config.json");
    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path).map_err(|e| EngineError::Config {
            message: format!("failed to read config file: {e}"),
        })?;
        let config = serde_json::from_str(&contents).map_err(|e| EngineError::Config {
            message: format!("failed to parse config JSON: {e}"),
        })?;
        Ok(config)
    } else {
        info!("Config file not found, using the built-in demo configuration");
        Ok(demo_config())
    }
}

/// Built-in demo configuration: flash-flood and areal-flood warnings that
/// conflict with each other, hatched against the demo zone table, with a
/// five-minute default duration so the accelerated clock expires them
/// quickly.
fn demo_config() -> SessionConfig {
    let mut hazard_types = HazardTypeTable::new();
    hazard_types.insert(
        "FF.W",
        HazardTypeConfig {
            conflict_list: ["FA.W".to_owned()].into_iter().collect(),
            allow_until_further_notice: true,
            hatch_area: HatchSpec::ZoneIntersection,
            ..HazardTypeConfig::default()
        },
    );
    hazard_types.insert(
        "FA.W",
        HazardTypeConfig {
            conflict_list: ["FF.W".to_owned()].into_iter().collect(),
            hatch_area: HatchSpec::ZoneIntersection,
            ..HazardTypeConfig::default()
        },
    );
    SessionConfig {
        site_id: SiteId::from("OAX"),
        product_class: ProductClass::Practice,
        hazard_types,
        settings: DisplaySettings {
            default_duration_secs: 300,
            ..DisplaySettings::default()
        },
    }
}

/// A small forecast-zone table covering the demo footprints.
fn demo_zone_table() -> ZoneTableResolver {
    ZoneTableResolver::new(vec![
        NamedZone {
            name: "NEZ050".to_owned(),
            shape: polygon![
                (x: -97.0, y: 41.0),
                (x: -96.5, y: 41.0),
                (x: -96.5, y: 41.6),
                (x: -97.0, y: 41.6),
            ],
        },
        NamedZone {
            name: "NEZ051".to_owned(),
            shape: polygon![
                (x: -96.5, y: 41.0),
                (x: -96.0, y: 41.0),
                (x: -96.0, y: 41.6),
                (x: -96.5, y: 41.6),
            ],
        },
    ])
}

/// Log every delivered notification at info severity.
fn attach_log_subscriber(session: &mut SessionManager) {
    let kinds: BTreeSet<NotificationKind> = [
        NotificationKind::EventModified,
        NotificationKind::EventsAdded,
        NotificationKind::EventsRemoved,
        NotificationKind::OrderingChanged,
        NotificationKind::SelectedConflictsChanged,
    ]
    .into_iter()
    .collect();
    session.subscribe(
        0,
        kinds,
        Box::new(|notification| match notification {
            Notification::EventModified {
                event_id,
                modifications,
                ..
            } => {
                info!(event_id = %event_id, changes = modifications.len(), "event modified");
            }
            Notification::EventsAdded { event_ids, .. } => {
                info!(count = event_ids.len(), "events added");
            }
            Notification::EventsRemoved { event_ids, .. } => {
                info!(count = event_ids.len(), "events removed");
            }
            Notification::OrderingChanged { .. } => {
                info!("event ordering changed");
            }
            Notification::SelectedConflictsChanged { conflicts, .. } => {
                info!(entries = conflicts.len(), "selected conflicts changed");
            }
        }),
    );
}

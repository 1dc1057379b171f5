//! End-to-end scenarios for the `squall-core` session.
//!
//! Each test wires a full session from in-memory collaborators (simulated
//! clock, memory store, zone-table resolver, serial id generator) and
//! drives it through the public API the way an embedding application
//! would: mutate, pump `tick`, observe delivered notifications.

// Integration tests use expect/unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::items_after_statements,
    clippy::missing_panics_doc,
    clippy::too_many_lines,
    clippy::indexing_slicing
)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use geo::polygon;
use serde_json::json;
use squall_core::{
    DisplaySettings, DraftEvent, HatchSpec, HazardTypeConfig, HazardTypeTable, LogAlertChannel,
    MemoryStore, NamedZone, SessionClock, SessionConfig, SessionManager, SessionParams,
    SimulatedClock, SiteSequenceIds, StoreFilter, ZoneTableResolver,
};
use squall_core::store::{EventStore, FailingStore};
use squall_events::{Notification, NotificationKind};
use squall_types::{
    AttributeMap, EventGeometry, EventId, HazardType, Originator, ProductClass, SiteId, Status,
    TimeRange,
};

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 26, h, m, 0).unwrap()
}

fn square(x0: f64, y0: f64, size: f64) -> geo::Polygon<f64> {
    polygon![
        (x: x0, y: y0),
        (x: x0 + size, y: y0),
        (x: x0 + size, y: y0 + size),
        (x: x0, y: y0 + size),
    ]
}

fn hazard_table(hatch: HatchSpec) -> HazardTypeTable {
    let mut table = HazardTypeTable::new();
    table.insert(
        "FF.W",
        HazardTypeConfig {
            conflict_list: ["FA.W".to_owned()].into_iter().collect(),
            allow_until_further_notice: true,
            hatch_area: hatch.clone(),
            ..HazardTypeConfig::default()
        },
    );
    table.insert(
        "FA.W",
        HazardTypeConfig {
            conflict_list: ["FF.W".to_owned()].into_iter().collect(),
            hatch_area: hatch,
            ..HazardTypeConfig::default()
        },
    );
    table
}

struct Harness {
    session: SessionManager,
    clock: Arc<SimulatedClock>,
    store: Arc<MemoryStore>,
    delivered: Arc<Mutex<Vec<Notification>>>,
}

fn harness(hatch: HatchSpec, resolver: ZoneTableResolver) -> Harness {
    let clock = Arc::new(SimulatedClock::with_state(at(10, 0), true));
    let store = Arc::new(MemoryStore::new());
    let config = SessionConfig {
        site_id: SiteId::from("OAX"),
        product_class: ProductClass::Practice,
        hazard_types: hazard_table(hatch),
        settings: DisplaySettings::default(),
    };
    let mut session = SessionManager::new(SessionParams {
        config,
        clock: Arc::clone(&clock) as Arc<dyn SessionClock>,
        store: Arc::clone(&store) as Arc<dyn EventStore>,
        resolver: Arc::new(resolver),
        ids: Arc::new(SiteSequenceIds::new()),
        alerts: Arc::new(LogAlertChannel),
    });

    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&delivered);
    session.subscribe(
        0,
        [
            NotificationKind::EventModified,
            NotificationKind::EventsAdded,
            NotificationKind::EventsRemoved,
            NotificationKind::OrderingChanged,
            NotificationKind::SelectedConflictsChanged,
        ]
        .into_iter()
        .collect(),
        Box::new(move |notification| {
            sink.lock().unwrap().push(notification.clone());
        }),
    );
    Harness {
        session,
        clock,
        store,
        delivered,
    }
}

fn direct_harness() -> Harness {
    harness(HatchSpec::Direct, ZoneTableResolver::default())
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn full_lifecycle_from_draft_to_expiration() {
    let mut h = direct_harness();

    let draft = DraftEvent::new(EventGeometry::polygon(square(0.0, 0.0, 1.0)))
        .with_hazard_type(HazardType::new("FF", "W"));
    let id = h.session.add_event(draft, Originator::User).unwrap();
    assert_eq!(h.session.event(&id).unwrap().status(), Status::Pending);

    assert!(h.session.propose(&id, Originator::User).unwrap().is_applied());
    assert!(h.session.issue(&id, Originator::User).unwrap().is_applied());
    let event = h.session.event(&id).unwrap();
    assert_eq!(event.status(), Status::Issued);
    assert_eq!(event.issuance_count(), 1);
    assert_eq!(h.store.event_count(), 1);

    // Advance the simulated clock past the default one-hour range.
    h.clock.set_time(at(11, 5));
    h.session.tick().unwrap();

    let event = h.session.event(&id).unwrap();
    assert_eq!(event.status(), Status::Ended);
    assert!(!event.is_selected());

    // The expiration was attributed to automation.
    let delivered = h.delivered.lock().unwrap();
    let automation_ended = delivered.iter().any(|notification| {
        matches!(
            notification,
            Notification::EventModified {
                originator: Originator::Automation,
                ..
            }
        )
    });
    assert!(automation_ended);
}

#[test]
fn reissue_after_end_is_clock_driven_only() {
    let mut h = direct_harness();
    let draft = DraftEvent::new(EventGeometry::polygon(square(0.0, 0.0, 1.0)))
        .with_hazard_type(HazardType::new("FF", "W"));
    let id = h.session.add_event(draft, Originator::User).unwrap();
    h.session.issue(&id, Originator::User).unwrap();

    h.clock.set_time(at(12, 0));
    h.session.tick().unwrap();
    assert_eq!(h.session.event(&id).unwrap().status(), Status::Ended);

    // A forecaster cannot re-issue an ended event.
    assert!(!h.session.issue(&id, Originator::User).unwrap().is_applied());

    // Moving the clock back inside the validity range revives it.
    h.clock.set_time(at(10, 30));
    h.session.tick().unwrap();
    assert_eq!(h.session.event(&id).unwrap().status(), Status::Issued);

    // And it expires again when time catches up.
    h.clock.set_time(at(11, 0));
    h.session.tick().unwrap();
    assert_eq!(h.session.event(&id).unwrap().status(), Status::Ended);
}

#[test]
fn until_further_notice_event_never_expires() {
    let mut h = direct_harness();
    let draft = DraftEvent::new(EventGeometry::polygon(square(0.0, 0.0, 1.0)))
        .with_hazard_type(HazardType::new("FF", "W"));
    let id = h.session.add_event(draft, Originator::User).unwrap();
    h.session
        .set_until_further_notice(&id, true, Originator::User)
        .unwrap();
    h.session.issue(&id, Originator::User).unwrap();

    // Jump far into the future; the event stays issued.
    h.clock.set_time(at(23, 59));
    h.session.tick().unwrap();
    assert_eq!(h.session.event(&id).unwrap().status(), Status::Issued);
}

// =============================================================================
// Notification coalescing
// =============================================================================

#[test]
fn consecutive_attribute_updates_coalesce_into_one_notification() {
    let mut h = direct_harness();
    let id = h
        .session
        .add_event(
            DraftEvent::new(EventGeometry::polygon(square(0.0, 0.0, 1.0))),
            Originator::User,
        )
        .unwrap();
    h.session.flush_notifications();
    h.delivered.lock().unwrap().clear();

    let mut first = AttributeMap::new();
    first.insert("severity".to_owned(), json!("moderate"));
    h.session
        .update_attributes(&id, first, Originator::User)
        .unwrap();
    let mut second = AttributeMap::new();
    second.insert("severity".to_owned(), json!("extreme"));
    h.session
        .update_attributes(&id, second, Originator::User)
        .unwrap();
    h.session.flush_notifications();

    let delivered = h.delivered.lock().unwrap();
    assert_eq!(delivered.len(), 1);
    match &delivered[0] {
        Notification::EventModified { modifications, .. } => {
            assert_eq!(modifications.len(), 1);
        }
        other => panic!("expected a modified notification, got {other:?}"),
    }
    assert_eq!(
        h.session.event(&id).unwrap().attributes().get("severity"),
        Some(&json!("extreme"))
    );
}

#[test]
fn attribute_round_trip_cancels_out_entirely() {
    let mut h = direct_harness();
    let id = h
        .session
        .add_event(
            DraftEvent::new(EventGeometry::polygon(square(0.0, 0.0, 1.0))),
            Originator::User,
        )
        .unwrap();
    h.session.flush_notifications();
    h.delivered.lock().unwrap().clear();

    // Set a fresh key, then clear it again before delivery: the pending
    // queue nets the two changes to nothing.
    let mut set = AttributeMap::new();
    set.insert("headline".to_owned(), json!("FLOOD"));
    h.session.update_attributes(&id, set, Originator::User).unwrap();
    let mut clear = AttributeMap::new();
    clear.insert("headline".to_owned(), serde_json::Value::Null);
    h.session.update_attributes(&id, clear, Originator::User).unwrap();
    h.session.flush_notifications();

    assert!(h.delivered.lock().unwrap().is_empty());
}

#[test]
fn add_then_remove_before_delivery_is_silent() {
    let mut h = direct_harness();
    let id = h
        .session
        .add_event(
            DraftEvent::new(EventGeometry::polygon(square(0.0, 0.0, 1.0))),
            Originator::User,
        )
        .unwrap();
    h.session.remove_event(&id, true, Originator::User).unwrap();
    h.session.flush_notifications();

    // The added and removed notifications mutually cancelled in the queue.
    let delivered = h.delivered.lock().unwrap();
    assert!(
        delivered.iter().all(|notification| {
            !matches!(
                notification,
                Notification::EventsAdded { .. } | Notification::EventsRemoved { .. }
            )
        }),
        "expected no add/remove delivery, got {delivered:?}"
    );
}

// =============================================================================
// Conflicts
// =============================================================================

#[test]
fn zonal_conflict_flows_through_to_subscribers() {
    let resolver = ZoneTableResolver::new(vec![
        NamedZone {
            name: "NEC001".to_owned(),
            shape: square(0.0, 0.0, 2.0),
        },
        NamedZone {
            name: "NEC003".to_owned(),
            shape: square(2.0, 0.0, 2.0),
        },
    ]);
    let mut h = harness(HatchSpec::ZoneIntersection, resolver);

    let first = h
        .session
        .add_event(
            DraftEvent::new(EventGeometry::polygon(square(0.5, 0.5, 1.0)))
                .with_hazard_type(HazardType::new("FF", "W")),
            Originator::User,
        )
        .unwrap();
    let second = h
        .session
        .add_event(
            DraftEvent::new(EventGeometry::polygon(square(1.0, 0.5, 1.0)))
                .with_hazard_type(HazardType::new("FA", "W")),
            Originator::User,
        )
        .unwrap();
    h.session
        .select_events(
            &[first.clone(), second.clone()].into_iter().collect(),
            Originator::User,
        )
        .unwrap();
    h.session.flush_notifications();

    let conflicts = h.session.conflicts();
    let names = conflicts
        .get(&first)
        .and_then(|entries| entries.get(&second))
        .expect("conflict entry for the pair");
    assert_eq!(names, &vec!["NEC001".to_owned()]);
    // Symmetric with an identical area list.
    assert_eq!(
        conflicts.get(&second).and_then(|entries| entries.get(&first)),
        Some(names)
    );

    let delivered = h.delivered.lock().unwrap();
    let announced = delivered
        .iter()
        .any(|n| matches!(n, Notification::SelectedConflictsChanged { .. }));
    assert!(announced);
}

#[test]
fn ending_one_side_clears_the_conflict() {
    let mut h = direct_harness();
    let first = h
        .session
        .add_event(
            DraftEvent::new(EventGeometry::polygon(square(0.0, 0.0, 2.0)))
                .with_hazard_type(HazardType::new("FF", "W")),
            Originator::User,
        )
        .unwrap();
    let second = h
        .session
        .add_event(
            DraftEvent::new(EventGeometry::polygon(square(1.0, 1.0, 2.0)))
                .with_hazard_type(HazardType::new("FA", "W")),
            Originator::User,
        )
        .unwrap();
    h.session
        .select_events(
            &[first.clone(), second.clone()].into_iter().collect(),
            Originator::User,
        )
        .unwrap();
    assert!(!h.session.conflicts().is_empty());

    h.session.issue(&second, Originator::User).unwrap();
    h.session.end(&second, Originator::User).unwrap();
    assert!(h.session.conflicts().is_empty());
    assert!(h.session.event(&first).unwrap().is_selected());
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn issuance_history_survives_into_a_new_session() {
    let mut h = direct_harness();
    let draft = DraftEvent::new(EventGeometry::polygon(square(0.0, 0.0, 1.0)))
        .with_hazard_type(HazardType::new("FF", "W"));
    let id = h.session.add_event(draft, Originator::User).unwrap();
    h.session.issue(&id, Originator::User).unwrap();

    // A permitted change and a re-issue append a second snapshot.
    let mut changes = AttributeMap::new();
    changes.insert("headline".to_owned(), json!("FLASH FLOOD WARNING"));
    h.session
        .update_attributes(&id, changes, Originator::User)
        .unwrap();
    h.session.end(&id, Originator::User).unwrap();
    assert_eq!(h.store.by_event_id(&id).unwrap().len(), 2);

    let clock = Arc::new(SimulatedClock::with_state(at(14, 0), true));
    let mut revived = SessionManager::new(SessionParams {
        config: SessionConfig {
            site_id: SiteId::from("OAX"),
            product_class: ProductClass::Practice,
            hazard_types: hazard_table(HatchSpec::Direct),
            settings: DisplaySettings::default(),
        },
        clock,
        store: Arc::clone(&h.store) as Arc<dyn EventStore>,
        resolver: Arc::new(ZoneTableResolver::default()),
        ids: Arc::new(SiteSequenceIds::new()),
        alerts: Arc::new(LogAlertChannel),
    });
    let loaded = revived
        .load_from_store(&StoreFilter::default(), Originator::User)
        .unwrap();
    assert_eq!(loaded, vec![id.clone()]);
    let event = revived.event(&id).unwrap();
    assert_eq!(event.status(), Status::Ended);
    assert_eq!(
        event.attributes().get("headline"),
        Some(&json!("FLASH FLOOD WARNING"))
    );
}

#[test]
fn issue_survives_a_failing_store() {
    let clock = Arc::new(SimulatedClock::with_state(at(10, 0), true));
    let mut session = SessionManager::new(SessionParams {
        config: SessionConfig {
            site_id: SiteId::from("OAX"),
            product_class: ProductClass::Practice,
            hazard_types: hazard_table(HatchSpec::Direct),
            settings: DisplaySettings::default(),
        },
        clock,
        store: Arc::new(FailingStore),
        resolver: Arc::new(ZoneTableResolver::default()),
        ids: Arc::new(SiteSequenceIds::new()),
        alerts: Arc::new(LogAlertChannel),
    });

    let draft = DraftEvent::new(EventGeometry::polygon(square(0.0, 0.0, 1.0)))
        .with_hazard_type(HazardType::new("FF", "W"));
    let id = session.add_event(draft, Originator::User).unwrap();
    // Persistence failures are logged, not propagated.
    assert!(session.issue(&id, Originator::User).unwrap().is_applied());
    assert_eq!(session.event(&id).unwrap().status(), Status::Issued);
}

// =============================================================================
// Guards
// =============================================================================

#[test]
fn issued_event_rejects_locked_field_changes() {
    let mut h = direct_harness();
    let draft = DraftEvent::new(EventGeometry::polygon(square(0.0, 0.0, 1.0)))
        .with_hazard_type(HazardType::new("FA", "W"));
    let id = h.session.add_event(draft, Originator::User).unwrap();
    h.session.issue(&id, Originator::User).unwrap();

    let moved = EventGeometry::polygon(square(5.0, 5.0, 1.0));
    assert!(h.session.update_geometry(&id, moved, Originator::User).is_err());
    assert!(
        h.session
            .update_time_range(
                &id,
                TimeRange::new(at(10, 0), at(13, 0)),
                Originator::User
            )
            .is_err()
    );
    assert!(
        h.session
            .update_hazard_type(&id, Some(HazardType::new("FF", "W")), Originator::User)
            .is_err()
    );
    // FA.W does not allow until further notice either.
    assert!(
        h.session
            .set_until_further_notice(&id, true, Originator::User)
            .is_err()
    );
}

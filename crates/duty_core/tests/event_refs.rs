use pretty_assertions::assert_eq;

use duty_core::db;
use duty_core::domain::NewIncident;
use duty_core::repo;

fn test_conn() -> rusqlite::Connection {
    let mut conn = db::open_in_memory().expect("open");
    db::migrate(&mut conn).expect("migrate");
    conn
}

fn alert_for(event_id: Option<&str>) -> NewIncident {
    NewIncident {
        event_id: event_id.map(ToString::to_string),
        event: "PROBLEM: Link down".to_string(),
        node: "sw-07".to_string(),
        trigger: "Interface eth3 down".to_string(),
        severity: "Average".to_string(),
        details: None,
    }
}

#[test]
fn duplicate_event_id_is_surfaced() {
    let conn = test_conn();

    repo::create_incident(&conn, &alert_for(Some("42"))).expect("first");
    let err = repo::create_incident(&conn, &alert_for(Some("42")))
        .expect_err("second insert with the same event id must fail");

    assert_eq!(err.code, "INCIDENT_DUPLICATE_EVENT");
    assert_eq!(repo::count_incidents(&conn).unwrap(), 1);
}

#[test]
fn missing_event_ids_do_not_collide() {
    let conn = test_conn();

    repo::create_incident(&conn, &alert_for(None)).expect("first");
    repo::create_incident(&conn, &alert_for(None)).expect("second");

    assert_eq!(repo::count_incidents(&conn).unwrap(), 2);
}

#[test]
fn find_by_event_id_distinguishes_present_and_absent() {
    let conn = test_conn();

    let created = repo::create_incident(&conn, &alert_for(Some("42"))).expect("create");

    let found = repo::find_by_event_id(&conn, "42").expect("query");
    assert_eq!(found.map(|i| i.id), Some(created.id));

    let missing = repo::find_by_event_id(&conn, "999").expect("query");
    assert_eq!(missing, None);
}

#[test]
fn message_refs_are_stored_for_in_place_edits() {
    let conn = test_conn();
    let incident = repo::create_incident(&conn, &alert_for(None)).expect("create");
    assert_eq!(incident.chat_id, None);

    repo::set_message_ref(&conn, incident.id, -1001234567890, 555, Some(12)).expect("set refs");

    let reloaded = repo::get_incident(&conn, incident.id).expect("reload");
    assert_eq!(reloaded.chat_id, Some(-1001234567890));
    assert_eq!(reloaded.message_id, Some(555));
    assert_eq!(reloaded.thread_id, Some(12));

    let err = repo::set_message_ref(&conn, 9999, -1, 1, None)
        .expect_err("unknown incident must be reported");
    assert_eq!(err.code, "DB_NOT_FOUND");
}

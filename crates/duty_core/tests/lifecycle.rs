use pretty_assertions::assert_eq;

use duty_core::db;
use duty_core::domain::{Actor, IncidentAction, IncidentStatus, NewIncident};
use duty_core::repo;

fn test_conn() -> rusqlite::Connection {
    let mut conn = db::open_in_memory().expect("open");
    db::migrate(&mut conn).expect("migrate");
    conn
}

fn sample_alert(event_id: Option<&str>) -> NewIncident {
    NewIncident {
        event_id: event_id.map(ToString::to_string),
        event: "PROBLEM: High CPU".to_string(),
        node: "db-01".to_string(),
        trigger: "CPU load > 90%".to_string(),
        severity: "High".to_string(),
        details: Some("load average 14.2".to_string()),
    }
}

fn operator() -> Actor {
    Actor::new("@alice", Some(100))
}

#[test]
fn creating_incidents_assigns_unique_ids() {
    let conn = test_conn();

    let first = repo::create_incident(&conn, &sample_alert(None)).expect("first");
    let second = repo::create_incident(&conn, &sample_alert(None)).expect("second");

    assert_ne!(first.id, second.id);
    assert_eq!(first.status, IncidentStatus::Open);
    assert_eq!(repo::count_incidents(&conn).unwrap(), 2);
}

#[test]
fn take_then_close_walks_the_lifecycle() {
    let mut conn = test_conn();
    let incident = repo::create_incident(&conn, &sample_alert(None)).expect("create");

    let taken = repo::apply_transition(
        &mut conn,
        incident.id,
        IncidentAction::Take,
        &operator(),
        "investigating",
    )
    .expect("take");
    assert_eq!(taken.status, IncidentStatus::InProgress);
    assert_eq!(taken.assigned_to_username.as_deref(), Some("@alice"));
    assert_eq!(taken.assigned_to_user_id, Some(100));
    assert!(taken.closed_at.is_none());

    let closed = repo::apply_transition(
        &mut conn,
        incident.id,
        IncidentAction::Close,
        &operator(),
        "restarted the service",
    )
    .expect("close");
    assert_eq!(closed.status, IncidentStatus::Closed);
    assert_eq!(closed.closed_by_username.as_deref(), Some("@alice"));
    assert!(closed.closed_at.is_some());

    let reloaded = repo::get_incident(&conn, incident.id).expect("reload");
    assert_eq!(reloaded, closed);
}

#[test]
fn reject_is_allowed_straight_from_open() {
    let mut conn = test_conn();
    let incident = repo::create_incident(&conn, &sample_alert(None)).expect("create");

    let rejected = repo::apply_transition(
        &mut conn,
        incident.id,
        IncidentAction::Reject,
        &operator(),
        "false positive",
    )
    .expect("reject");

    assert_eq!(rejected.status, IncidentStatus::Rejected);
    assert!(rejected.closed_at.is_some());
}

#[test]
fn reopen_returns_to_open_and_clears_closure_fields() {
    let mut conn = test_conn();
    let incident = repo::create_incident(&conn, &sample_alert(None)).expect("create");

    repo::apply_transition(
        &mut conn,
        incident.id,
        IncidentAction::Close,
        &operator(),
        "fixed",
    )
    .expect("close");

    let reopened = repo::apply_transition(
        &mut conn,
        incident.id,
        IncidentAction::Reopen,
        &Actor::new("@bob", Some(200)),
        "alert fired again",
    )
    .expect("reopen");

    assert_eq!(reopened.status, IncidentStatus::Open);
    assert_eq!(reopened.assigned_to_username, None);
    assert_eq!(reopened.closed_by_username, None);
    assert_eq!(reopened.closed_at, None);
}

#[test]
fn illegal_transitions_fail_and_change_nothing() {
    let mut conn = test_conn();
    let incident = repo::create_incident(&conn, &sample_alert(None)).expect("create");

    let err = repo::apply_transition(
        &mut conn,
        incident.id,
        IncidentAction::Reopen,
        &operator(),
        "not closed yet",
    )
    .expect_err("reopen of an open incident must fail");
    assert_eq!(err.code, "TRANSITION_INVALID");

    let untouched = repo::get_incident(&conn, incident.id).expect("reload");
    assert_eq!(untouched.status, IncidentStatus::Open);
    assert!(repo::list_comments(&conn, incident.id).unwrap().is_empty());
}

#[test]
fn transitions_without_a_comment_are_rejected() {
    let mut conn = test_conn();
    let incident = repo::create_incident(&conn, &sample_alert(None)).expect("create");

    for action in [
        IncidentAction::Take,
        IncidentAction::Close,
        IncidentAction::Reject,
    ] {
        let err = repo::apply_transition(&mut conn, incident.id, action, &operator(), "   ")
            .expect_err("empty comment must be rejected");
        assert_eq!(err.code, "COMMENT_REQUIRED");
    }

    let untouched = repo::get_incident(&conn, incident.id).expect("reload");
    assert_eq!(untouched.status, IncidentStatus::Open);
}

#[test]
fn reassign_changes_assignee_only_while_in_progress() {
    let mut conn = test_conn();
    let incident = repo::create_incident(&conn, &sample_alert(None)).expect("create");

    let err = repo::reassign_incident(
        &mut conn,
        incident.id,
        &Actor::new("@bob", None),
        "reassigned to @bob",
    )
    .expect_err("reassign of an open incident must fail");
    assert_eq!(err.code, "TRANSITION_INVALID");

    repo::apply_transition(
        &mut conn,
        incident.id,
        IncidentAction::Take,
        &operator(),
        "on it",
    )
    .expect("take");

    let reassigned = repo::reassign_incident(
        &mut conn,
        incident.id,
        &Actor::new("@bob", None),
        "reassigned to @bob",
    )
    .expect("reassign");
    assert_eq!(reassigned.status, IncidentStatus::InProgress);
    assert_eq!(reassigned.assigned_to_username.as_deref(), Some("@bob"));
    assert_eq!(reassigned.assigned_to_user_id, None);
}

#[test]
fn audit_trail_preserves_order_and_actors() {
    let mut conn = test_conn();
    let incident = repo::create_incident(&conn, &sample_alert(None)).expect("create");

    repo::apply_transition(
        &mut conn,
        incident.id,
        IncidentAction::Take,
        &Actor::new("@alice", Some(100)),
        "taking this",
    )
    .expect("take");
    repo::reassign_incident(
        &mut conn,
        incident.id,
        &Actor::new("@bob", Some(200)),
        "handover to @bob",
    )
    .expect("reassign");
    repo::apply_transition(
        &mut conn,
        incident.id,
        IncidentAction::Close,
        &Actor::new("@bob", Some(200)),
        "disk replaced",
    )
    .expect("close");

    let trail = repo::list_comments(&conn, incident.id).expect("comments");
    let summary: Vec<(&str, &str, &str)> = trail
        .iter()
        .map(|c| {
            (
                c.action.as_str(),
                c.author_username.as_str(),
                c.comment.as_str(),
            )
        })
        .collect();

    assert_eq!(
        summary,
        vec![
            ("take", "@alice", "taking this"),
            ("reassign", "@bob", "handover to @bob"),
            ("close", "@bob", "disk replaced"),
        ]
    );
}

#[test]
fn listing_filters_by_status() {
    let mut conn = test_conn();

    let first = repo::create_incident(&conn, &sample_alert(None)).expect("first");
    let second = repo::create_incident(&conn, &sample_alert(None)).expect("second");
    repo::apply_transition(
        &mut conn,
        second.id,
        IncidentAction::Reject,
        &operator(),
        "noise",
    )
    .expect("reject");

    let open = repo::list_incidents(&conn, Some(IncidentStatus::Open)).expect("open");
    assert_eq!(open.iter().map(|i| i.id).collect::<Vec<_>>(), vec![first.id]);

    let all = repo::list_incidents(&conn, None).expect("all");
    assert_eq!(all.len(), 2);
}

#[test]
fn database_file_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("incidents.sqlite");

    let created_id = {
        let mut conn = db::open(&path).expect("open");
        db::migrate(&mut conn).expect("migrate");
        repo::create_incident(&conn, &sample_alert(Some("77001")))
            .expect("create")
            .id
    };

    let conn = db::open(&path).expect("reopen");
    let incident = repo::get_incident(&conn, created_id).expect("get");
    assert_eq!(incident.event_id.as_deref(), Some("77001"));
}

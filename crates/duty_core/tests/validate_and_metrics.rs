use duty_core::domain::{Incident, IncidentStatus};
use duty_core::metrics::compute_resolution;
use duty_core::validate::{validate_incident, validate_username};

fn incident_with(status: IncidentStatus, created: &str, closed: Option<&str>) -> Incident {
    Incident {
        id: 1,
        event_id: Some("77001".to_string()),
        event: "PROBLEM: High CPU".to_string(),
        node: "db-01".to_string(),
        trigger: "CPU load > 90%".to_string(),
        severity: "High".to_string(),
        details: None,
        status,
        assigned_to_username: None,
        assigned_to_user_id: None,
        closed_by_username: None,
        closed_by_user_id: None,
        closed_at: closed.map(ToString::to_string),
        chat_id: None,
        message_id: None,
        thread_id: None,
        created_at: created.to_string(),
        updated_at: created.to_string(),
    }
}

#[test]
fn resolved_incident_without_closer_is_flagged() {
    let incident = incident_with(
        IncidentStatus::Closed,
        "2026-01-01T00:00:00Z",
        Some("2026-01-01T00:40:00Z"),
    );
    let warnings = validate_incident(&incident);
    assert!(
        warnings.iter().any(|w| w.code == "VALIDATION_CLOSER_MISSING"),
        "expected closer warning, got: {warnings:?}"
    );
}

#[test]
fn ordering_violation_is_flagged_not_corrected() {
    let incident = incident_with(
        IncidentStatus::Closed,
        "2026-01-02T00:00:00Z",
        Some("2026-01-01T00:00:00Z"),
    );

    let warnings = validate_incident(&incident);
    assert!(
        warnings
            .iter()
            .any(|w| w.code == "VALIDATION_TS_ORDER_VIOLATION"),
        "expected ordering warning, got: {warnings:?}"
    );

    let (metrics, metric_warnings) = compute_resolution(&incident);
    assert_eq!(metrics.resolution_seconds, None);
    assert!(
        metric_warnings
            .iter()
            .any(|w| w.code == "METRICS_TS_ORDER_VIOLATION"),
        "expected metric warning, got: {metric_warnings:?}"
    );
}

#[test]
fn in_progress_without_assignee_is_flagged() {
    let incident = incident_with(IncidentStatus::InProgress, "2026-01-01T00:00:00Z", None);
    let warnings = validate_incident(&incident);
    assert!(
        warnings
            .iter()
            .any(|w| w.code == "VALIDATION_ASSIGNEE_MISSING"),
        "expected assignee warning, got: {warnings:?}"
    );
}

#[test]
fn resolution_time_is_computed_when_possible() {
    let incident = incident_with(
        IncidentStatus::Closed,
        "2026-01-01T00:00:00Z",
        Some("2026-01-01T00:40:00Z"),
    );
    let (metrics, warnings) = compute_resolution(&incident);
    assert!(warnings.is_empty(), "expected no warnings: {warnings:?}");
    assert_eq!(metrics.resolution_seconds, Some(40 * 60));
}

#[test]
fn open_incident_has_no_resolution_time() {
    let incident = incident_with(IncidentStatus::Open, "2026-01-01T00:00:00Z", None);
    let (metrics, warnings) = compute_resolution(&incident);
    assert!(warnings.is_empty());
    assert_eq!(metrics.resolution_seconds, None);
}

#[test]
fn username_validation_accepts_handles_only() {
    assert!(validate_username("@bob").is_ok());
    assert!(validate_username(" @bob ").is_ok());
    assert!(validate_username("bob").is_err());
    assert!(validate_username("@").is_err());
    assert!(validate_username("@two words").is_err());
}

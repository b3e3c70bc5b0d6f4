use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::domain::{Incident, IncidentAction, IncidentStatus, ValidationWarning};
use crate::error::AppError;

/// Hard guard: take/close/reject/reopen must carry a non-empty comment.
pub fn require_comment(action: IncidentAction, comment: &str) -> Result<(), AppError> {
    if action.requires_comment() && comment.trim().is_empty() {
        return Err(AppError::new("COMMENT_REQUIRED", "A comment is required")
            .with_details(format!("action={}", action.as_str())));
    }
    Ok(())
}

/// Hard guard: the action must be legal for the current status.
pub fn ensure_transition(status: IncidentStatus, action: IncidentAction) -> Result<(), AppError> {
    if !status.allows(action) {
        return Err(AppError::new(
            "TRANSITION_INVALID",
            "Action is not allowed in the current status",
        )
        .with_details(format!(
            "status={}; action={}",
            status.as_str(),
            action.as_str()
        )));
    }
    Ok(())
}

/// Hard guard for manual reassignment input: a Telegram handle like `@name`.
pub fn validate_username(handle: &str) -> Result<(), AppError> {
    let handle = handle.trim();
    if !handle.starts_with('@') || handle.len() < 2 || handle.contains(char::is_whitespace) {
        return Err(AppError::new(
            "REASSIGN_BAD_USERNAME",
            "Expected a handle in @username format",
        )
        .with_details(format!("input={handle}")));
    }
    Ok(())
}

fn parse_ts(
    field: &str,
    value: &Option<String>,
    warnings: &mut Vec<ValidationWarning>,
) -> Option<OffsetDateTime> {
    let Some(s) = value.as_deref() else {
        return None;
    };
    match OffsetDateTime::parse(s, &Rfc3339) {
        Ok(dt) => Some(dt),
        Err(e) => {
            warnings.push(
                ValidationWarning::new(
                    "VALIDATION_TS_PARSE_FAILED",
                    format!("Failed to parse {field}"),
                )
                .with_details(format!("value={s}; err={e}")),
            );
            None
        }
    }
}

/// Soft checks: field coherence warnings for display/reporting. Never mutates
/// and never blocks a transition; the hard guards above do that.
pub fn validate_incident(incident: &Incident) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let resolved = matches!(
        incident.status,
        IncidentStatus::Closed | IncidentStatus::Rejected
    );

    if resolved && incident.closed_by_username.is_none() {
        warnings.push(ValidationWarning::new(
            "VALIDATION_CLOSER_MISSING",
            "Resolved incident has no closing operator recorded",
        ));
    }

    if resolved && incident.closed_at.is_none() {
        warnings.push(ValidationWarning::new(
            "VALIDATION_CLOSED_AT_MISSING",
            "Resolved incident has no closing timestamp",
        ));
    }

    if !resolved && incident.closed_at.is_some() {
        warnings.push(ValidationWarning::new(
            "VALIDATION_CLOSED_AT_UNEXPECTED",
            "Unresolved incident carries a closing timestamp",
        ));
    }

    if incident.status == IncidentStatus::InProgress && incident.assigned_to_username.is_none() {
        warnings.push(ValidationWarning::new(
            "VALIDATION_ASSIGNEE_MISSING",
            "In-progress incident has no assignee recorded",
        ));
    }

    let created = parse_ts(
        "created_at",
        &Some(incident.created_at.clone()),
        &mut warnings,
    );
    let closed = parse_ts("closed_at", &incident.closed_at, &mut warnings);

    if let (Some(created), Some(closed)) = (created, closed) {
        if created > closed {
            warnings.push(
                ValidationWarning::new(
                    "VALIDATION_TS_ORDER_VIOLATION",
                    "Timestamp order violation: created_at must be <= closed_at",
                )
                .with_details(format!("created_at={created}; closed_at={closed}")),
            );
        }
    }

    warnings
}

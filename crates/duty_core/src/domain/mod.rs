use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Lifecycle states of a relayed monitoring incident.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Open,
    InProgress,
    Closed,
    Rejected,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Open => "open",
            IncidentStatus::InProgress => "in_progress",
            IncidentStatus::Closed => "closed",
            IncidentStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "open" => Ok(IncidentStatus::Open),
            "in_progress" => Ok(IncidentStatus::InProgress),
            "closed" => Ok(IncidentStatus::Closed),
            "rejected" => Ok(IncidentStatus::Rejected),
            other => Err(AppError::new("STATUS_UNKNOWN", "Unknown incident status")
                .with_details(format!("status={other}"))),
        }
    }

    /// Whether `action` may be applied to an incident in this state.
    ///
    /// open --take--> in_progress --close|reject--> closed|rejected --reopen--> open.
    /// Close and reject are also allowed straight from `open` (self-healed or
    /// noise alerts need no take first); reassign only while in progress.
    pub fn allows(&self, action: IncidentAction) -> bool {
        match action {
            IncidentAction::Take => matches!(self, IncidentStatus::Open),
            IncidentAction::Close | IncidentAction::Reject => {
                matches!(self, IncidentStatus::Open | IncidentStatus::InProgress)
            }
            IncidentAction::Reopen => {
                matches!(self, IncidentStatus::Closed | IncidentStatus::Rejected)
            }
            IncidentAction::Reassign => matches!(self, IncidentStatus::InProgress),
        }
    }
}

/// Operator actions exposed as inline buttons under the posted alert.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IncidentAction {
    Take,
    Close,
    Reject,
    Reopen,
    Reassign,
}

impl IncidentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentAction::Take => "take",
            IncidentAction::Close => "close",
            IncidentAction::Reject => "reject",
            IncidentAction::Reopen => "reopen",
            IncidentAction::Reassign => "reassign",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "take" => Ok(IncidentAction::Take),
            "close" => Ok(IncidentAction::Close),
            "reject" => Ok(IncidentAction::Reject),
            "reopen" => Ok(IncidentAction::Reopen),
            "reassign" => Ok(IncidentAction::Reassign),
            other => Err(AppError::new("ACTION_UNKNOWN", "Unknown incident action")
                .with_details(format!("action={other}"))),
        }
    }

    /// Status the incident ends up in after the action.
    pub fn target_status(&self) -> IncidentStatus {
        match self {
            IncidentAction::Take | IncidentAction::Reassign => IncidentStatus::InProgress,
            IncidentAction::Close => IncidentStatus::Closed,
            IncidentAction::Reject => IncidentStatus::Rejected,
            IncidentAction::Reopen => IncidentStatus::Open,
        }
    }

    /// Take/close/reject/reopen must carry an operator comment; reassign
    /// audits the new assignee instead.
    pub fn requires_comment(&self) -> bool {
        !matches!(self, IncidentAction::Reassign)
    }
}

/// One monitoring alert and its human resolution workflow.
///
/// Timestamps are RFC3339 UTC strings; `chat_id`/`message_id`/`thread_id`
/// link to the Telegram message so it can be edited in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Incident {
    pub id: i64,
    pub event_id: Option<String>,
    pub event: String,
    pub node: String,
    pub trigger: String,
    pub severity: String,
    pub details: Option<String>,
    pub status: IncidentStatus,

    pub assigned_to_username: Option<String>,
    pub assigned_to_user_id: Option<i64>,
    pub closed_by_username: Option<String>,
    pub closed_by_user_id: Option<i64>,
    pub closed_at: Option<String>,

    pub chat_id: Option<i64>,
    pub message_id: Option<i64>,
    pub thread_id: Option<i64>,

    pub created_at: String,
    pub updated_at: String,
}

/// Fields required to register a new incident from an inbound alert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewIncident {
    pub event_id: Option<String>,
    pub event: String,
    pub node: String,
    pub trigger: String,
    pub severity: String,
    pub details: Option<String>,
}

/// Identity of the operator performing a transition, as seen by Telegram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub username: String,
    pub user_id: Option<i64>,
}

impl Actor {
    pub fn new(username: impl Into<String>, user_id: Option<i64>) -> Self {
        Self {
            username: username.into(),
            user_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationWarning {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl ValidationWarning {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            IncidentStatus::Open,
            IncidentStatus::InProgress,
            IncidentStatus::Closed,
            IncidentStatus::Rejected,
        ] {
            assert_eq!(IncidentStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(IncidentStatus::parse("new").is_err());
    }

    #[test]
    fn transition_guard_matches_lifecycle_graph() {
        use IncidentAction::*;
        use IncidentStatus::*;

        assert!(Open.allows(Take));
        assert!(Open.allows(Close));
        assert!(Open.allows(Reject));
        assert!(!Open.allows(Reopen));
        assert!(!Open.allows(Reassign));

        assert!(!InProgress.allows(Take));
        assert!(InProgress.allows(Close));
        assert!(InProgress.allows(Reject));
        assert!(InProgress.allows(Reassign));

        assert!(Closed.allows(Reopen));
        assert!(!Closed.allows(Close));
        assert!(Rejected.allows(Reopen));
        assert!(!Rejected.allows(Take));
    }
}

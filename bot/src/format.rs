use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use teloxide::utils::html;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::OffsetDateTime;

use duty_core::domain::{Incident, IncidentStatus};
use duty_core::metrics::{compute_resolution, format_duration};

fn status_emoji(status: IncidentStatus) -> &'static str {
    match status {
        IncidentStatus::Open => "🔓",
        IncidentStatus::InProgress => "🛠",
        IncidentStatus::Closed => "🔒",
        IncidentStatus::Rejected => "❌",
    }
}

fn status_label(status: IncidentStatus) -> &'static str {
    match status {
        IncidentStatus::Open => "open",
        IncidentStatus::InProgress => "in progress",
        IncidentStatus::Closed => "closed",
        IncidentStatus::Rejected => "rejected",
    }
}

/// Reformat a stored RFC3339 timestamp for the card; falls back to the raw
/// string rather than hiding the value.
fn format_ts(raw: &str) -> String {
    let description = format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC");
    OffsetDateTime::parse(raw, &Rfc3339)
        .ok()
        .and_then(|dt| dt.format(&description).ok())
        .unwrap_or_else(|| raw.to_string())
}

/// Render the incident card posted to the group and edited in place on every
/// mutation. All user-supplied fields are HTML-escaped.
pub fn incident_card(incident: &Incident, last_comment: Option<&str>) -> String {
    let mut text = format!(
        "{emoji} <b>Incident #{id}</b>\n\
         🔹 <b>Event:</b> {event}\n\
         🌐 <b>Node:</b> {node}\n\
         ⚠️ <b>Trigger:</b> {trigger}\n\
         🔄 <b>Status:</b> {status}\n\
         🔴 <b>Severity:</b> {severity}",
        emoji = status_emoji(incident.status),
        id = incident.id,
        event = html::escape(&incident.event),
        node = html::escape(&incident.node),
        trigger = html::escape(&incident.trigger),
        status = status_label(incident.status),
        severity = html::escape(&incident.severity),
    );

    if let Some(details) = incident.details.as_deref() {
        if !details.is_empty() {
            text.push_str(&format!("\n📄 <b>Details:</b> {}", html::escape(details)));
        }
    }

    text.push_str(&format!(
        "\n🕒 <b>Created:</b> {}",
        format_ts(&incident.created_at)
    ));

    if incident.status == IncidentStatus::InProgress {
        if let Some(assignee) = incident.assigned_to_username.as_deref() {
            text.push_str(&format!("\n👤 <b>In work by:</b> {}", html::escape(assignee)));
        }
    }

    if let Some(closed_at) = incident.closed_at.as_deref() {
        if let Some(closer) = incident.closed_by_username.as_deref() {
            text.push_str(&format!("\n🔒 <b>Closed by:</b> {}", html::escape(closer)));
        }
        text.push_str(&format!("\n🕒 <b>Closed:</b> {}", format_ts(closed_at)));

        let (metrics, _) = compute_resolution(incident);
        if let Some(seconds) = metrics.resolution_seconds {
            text.push_str(&format!(
                "\n⏱ <b>Resolution time:</b> {}",
                format_duration(seconds)
            ));
        }
    }

    if let Some(comment) = last_comment {
        if !comment.is_empty() {
            text.push_str(&format!("\n💬 <b>Comment:</b> {}", html::escape(comment)));
        }
    }

    text
}

/// Action keyboard matching the incident's status; resolved incidents keep a
/// single reopen button.
pub fn incident_keyboard(incident: &Incident) -> InlineKeyboardMarkup {
    let id = incident.id;
    let row = match incident.status {
        IncidentStatus::Open => vec![
            InlineKeyboardButton::callback("Take", format!("take:{id}")),
            InlineKeyboardButton::callback("Reject", format!("reject:{id}")),
        ],
        IncidentStatus::InProgress => vec![
            InlineKeyboardButton::callback("Reassign", format!("reassign:{id}")),
            InlineKeyboardButton::callback("Close", format!("close:{id}")),
        ],
        IncidentStatus::Closed | IncidentStatus::Rejected => vec![InlineKeyboardButton::callback(
            "Reopen",
            format!("reopen:{id}"),
        )],
    };
    InlineKeyboardMarkup::new([row])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: IncidentStatus) -> Incident {
        Incident {
            id: 12,
            event_id: Some("77001".into()),
            event: "PROBLEM: High CPU <load>".into(),
            node: "db-01".into(),
            trigger: "CPU load > 90%".into(),
            severity: "High".into(),
            details: Some("load average 14.2".into()),
            status,
            assigned_to_username: Some("@alice".into()),
            assigned_to_user_id: Some(100),
            closed_by_username: None,
            closed_by_user_id: None,
            closed_at: None,
            chat_id: Some(-100123),
            message_id: Some(555),
            thread_id: None,
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn card_escapes_html_in_alert_fields() {
        let card = incident_card(&sample(IncidentStatus::Open), None);
        assert!(card.contains("Incident #12"));
        assert!(card.contains("PROBLEM: High CPU &lt;load&gt;"));
        assert!(!card.contains("<load>"));
    }

    #[test]
    fn card_shows_assignee_only_while_in_progress() {
        let open = incident_card(&sample(IncidentStatus::Open), None);
        assert!(!open.contains("In work by"));

        let in_progress = incident_card(&sample(IncidentStatus::InProgress), None);
        assert!(in_progress.contains("In work by:</b> @alice"));
    }

    #[test]
    fn card_includes_resolution_block_when_closed() {
        let mut incident = sample(IncidentStatus::Closed);
        incident.closed_by_username = Some("@bob".into());
        incident.closed_at = Some("2026-01-01T00:40:00Z".into());

        let card = incident_card(&incident, Some("disk replaced"));
        assert!(card.contains("Closed by:</b> @bob"));
        assert!(card.contains("Resolution time:</b> 40m 0s"));
        assert!(card.contains("Comment:</b> disk replaced"));
    }

    #[test]
    fn keyboard_matches_status() {
        let buttons = |status| {
            incident_keyboard(&sample(status))
                .inline_keyboard
                .into_iter()
                .flatten()
                .map(|b| b.text)
                .collect::<Vec<_>>()
        };

        assert_eq!(buttons(IncidentStatus::Open), vec!["Take", "Reject"]);
        assert_eq!(
            buttons(IncidentStatus::InProgress),
            vec!["Reassign", "Close"]
        );
        assert_eq!(buttons(IncidentStatus::Closed), vec!["Reopen"]);
        assert_eq!(buttons(IncidentStatus::Rejected), vec!["Reopen"]);
    }
}

use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode, ThreadId};
use teloxide::{ApiError, RequestError};

use duty_core::domain::{Incident, NewIncident};
use duty_core::error::AppError;
use duty_core::repo;

use crate::format::{incident_card, incident_keyboard};
use crate::state::{blocking, BotState};

/// Register an incident, post its card to the configured group/topic and
/// store the posted message's coordinates for in-place edits.
pub async fn publish_incident(
    bot: &Bot,
    state: &BotState,
    new: NewIncident,
) -> Result<Incident, AppError> {
    let incident = {
        let state = state.clone();
        blocking(move || {
            let conn = state.open_db()?;
            repo::create_incident(&conn, &new)
        })
        .await?
    };

    tracing::info!(
        incident_id = incident.id,
        event_id = incident.event_id.as_deref().unwrap_or("-"),
        "incident registered"
    );

    let mut request = bot
        .send_message(
            ChatId(state.config.group_id),
            incident_card(&incident, None),
        )
        .parse_mode(ParseMode::Html)
        .reply_markup(incident_keyboard(&incident));
    if let Some(topic) = state.config.topic_id {
        request = request.message_thread_id(ThreadId(MessageId(topic)));
    }

    let message = request
        .await
        .map_err(|e| AppError::wrap("TG_SEND_FAILED", "Failed to post the alert", e))?;

    let chat_id = message.chat.id.0;
    let message_id = i64::from(message.id.0);
    let thread_id = state.config.topic_id.map(i64::from);
    let incident_id = incident.id;
    {
        let state = state.clone();
        blocking(move || {
            let conn = state.open_db()?;
            repo::set_message_ref(&conn, incident_id, chat_id, message_id, thread_id)
        })
        .await?;
    }

    let state = state.clone();
    blocking(move || {
        let conn = state.open_db()?;
        repo::get_incident(&conn, incident_id)
    })
    .await
}

/// Re-render the posted card after a mutation. Edit failures ("message is not
/// modified", deleted message) are logged and swallowed so they never undo a
/// transition that is already committed.
pub async fn refresh_incident_card(bot: &Bot, incident: &Incident, last_comment: Option<&str>) {
    let (Some(chat_id), Some(message_id)) = (incident.chat_id, incident.message_id) else {
        tracing::warn!(
            incident_id = incident.id,
            "incident has no posted message to edit"
        );
        return;
    };

    let result = bot
        .edit_message_text(
            ChatId(chat_id),
            MessageId(message_id as i32),
            incident_card(incident, last_comment),
        )
        .parse_mode(ParseMode::Html)
        .reply_markup(incident_keyboard(incident))
        .await;

    match result {
        Ok(_) => {}
        Err(RequestError::Api(ApiError::MessageNotModified)) => {
            tracing::debug!(incident_id = incident.id, "card already up to date");
        }
        Err(error) => {
            tracing::warn!(incident_id = incident.id, error = %error, "failed to edit incident card");
        }
    }
}

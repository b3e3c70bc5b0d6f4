use teloxide::prelude::*;

use duty_core::domain::{Actor, Incident, IncidentAction};
use duty_core::repo;
use duty_core::validate::{validate_incident, validate_username};

use crate::handlers::{actor_from, reply_in, vpn, HandlerResult};
use crate::publish::refresh_incident_card;
use crate::state::{blocking, BotState, Pending};

fn done_verb(action: IncidentAction) -> &'static str {
    match action {
        IncidentAction::Take => "taken in work",
        IncidentAction::Close => "closed",
        IncidentAction::Reject => "rejected",
        IncidentAction::Reopen => "reopened",
        IncidentAction::Reassign => "reassigned",
    }
}

/// Text messages only matter while the sender has a pending flow in this
/// chat; everything else is ignored.
pub async fn handle_text(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    let Some(user) = msg.from.clone() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let key = (msg.chat.id.0, user.id.0);
    let Some(pending) = state.peek_pending(key) else {
        return Ok(());
    };

    let chat = msg.chat.id;
    let thread = msg.thread_id;

    match pending {
        Pending::Comment {
            action,
            incident_id,
        } => {
            let comment = text.trim().to_string();
            if comment.is_empty() {
                reply_in(&bot, chat, thread, "❌ Comment cannot be empty").await?;
                return Ok(());
            }
            state.clear_pending(key);

            let actor = actor_from(&user);
            let result = {
                let state = state.clone();
                let actor = actor.clone();
                let comment = comment.clone();
                blocking(move || {
                    let mut conn = state.open_db()?;
                    repo::apply_transition(&mut conn, incident_id, action, &actor, &comment)
                })
                .await
            };

            match result {
                Ok(incident) => {
                    tracing::info!(
                        incident_id,
                        action = action.as_str(),
                        operator = %actor.username,
                        "transition applied"
                    );
                    for warning in validate_incident(&incident) {
                        tracing::warn!(incident_id, code = %warning.code, "{}", warning.message);
                    }
                    acknowledge_upstream(&state, &incident, action, &comment).await;
                    refresh_incident_card(&bot, &incident, Some(&comment)).await;
                    reply_in(
                        &bot,
                        chat,
                        thread,
                        format!("✅ Incident #{incident_id} {}", done_verb(action)),
                    )
                    .await?;
                }
                Err(err) => {
                    tracing::warn!(incident_id, code = %err.code, "transition failed");
                    reply_in(&bot, chat, thread, format!("❌ {}", err.message)).await?;
                }
            }
        }

        Pending::Reassign { incident_id } => {
            let handle = text.trim().to_string();
            if validate_username(&handle).is_err() {
                reply_in(&bot, chat, thread, "❌ Invalid format. Use @username").await?;
                return Ok(());
            }
            state.clear_pending(key);

            // User id is unknown for manual assignment.
            let new_assignee = Actor::new(handle.clone(), None);
            let note = format!("reassigned to {handle} by {}", actor_from(&user).username);

            let result = {
                let state = state.clone();
                let note = note.clone();
                blocking(move || {
                    let mut conn = state.open_db()?;
                    repo::reassign_incident(&mut conn, incident_id, &new_assignee, &note)
                })
                .await
            };

            match result {
                Ok(incident) => {
                    refresh_incident_card(&bot, &incident, Some(&note)).await;
                    reply_in(
                        &bot,
                        chat,
                        thread,
                        format!("✅ Incident #{incident_id} reassigned to {handle}"),
                    )
                    .await?;
                }
                Err(err) => {
                    tracing::warn!(incident_id, code = %err.code, "reassign failed");
                    reply_in(&bot, chat, thread, format!("❌ {}", err.message)).await?;
                }
            }
        }

        Pending::WgPeerName { interface } => {
            state.clear_pending(key);
            vpn::create_peer(&bot, chat, thread, &state, &interface, text.trim()).await?;
        }

        Pending::WgConfigJson => {
            state.clear_pending(key);
            vpn::add_config_from_json(&bot, chat, thread, &state, text).await?;
        }
    }

    Ok(())
}

/// Close the event upstream once an operator resolved the incident; failures
/// are logged, never surfaced as a failed transition.
async fn acknowledge_upstream(
    state: &BotState,
    incident: &Incident,
    action: IncidentAction,
    comment: &str,
) {
    if !matches!(action, IncidentAction::Close | IncidentAction::Reject) {
        return;
    }
    let Some(event_id) = incident.event_id.clone() else {
        return;
    };
    let Some(zabbix) = state.zabbix.clone() else {
        return;
    };

    let comment = comment.to_string();
    let result = blocking(move || zabbix.acknowledge_event(&event_id, &comment)).await;
    match result {
        Ok(()) => tracing::info!(incident_id = incident.id, "event acknowledged upstream"),
        Err(err) => tracing::warn!(
            incident_id = incident.id,
            code = %err.code,
            "failed to acknowledge event upstream"
        ),
    }
}

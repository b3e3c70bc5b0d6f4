use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, MaybeInaccessibleMessage, ThreadId,
};

use duty_core::domain::IncidentAction;
use duty_core::error::AppError;
use duty_core::repo;

use crate::handlers::{actor_from, reply_in, vpn, HandlerResult};
use crate::publish::refresh_incident_card;
use crate::state::{blocking, BotState, Pending};

/// Chat and topic the pressed button lives in.
pub(crate) fn origin(q: &CallbackQuery) -> Option<(ChatId, Option<ThreadId>)> {
    match q.message.as_ref()? {
        MaybeInaccessibleMessage::Regular(m) => Some((m.chat.id, m.thread_id)),
        MaybeInaccessibleMessage::Inaccessible(m) => Some((m.chat.id, None)),
    }
}

fn parse_incident_id(arg: Option<&str>) -> Result<i64, AppError> {
    arg.and_then(|raw| raw.parse().ok()).ok_or_else(|| {
        AppError::new("CALLBACK_BAD_DATA", "Callback carried no incident id")
    })
}

pub async fn handle(bot: Bot, q: CallbackQuery, state: BotState) -> HandlerResult {
    let Some(data) = q.data.clone() else {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };

    let (kind, arg) = match data.split_once(':') {
        Some((kind, arg)) => (kind, Some(arg)),
        None => (data.as_str(), None),
    };

    match kind {
        "take" | "close" | "reject" | "reopen" => {
            let action = IncidentAction::parse(kind)?;
            prompt_comment(&bot, &q, &state, action, parse_incident_id(arg)?).await?;
        }
        "reassign" => prompt_reassign(&bot, &q, &state, parse_incident_id(arg)?).await?,
        "selfassign" => self_assign(&bot, &q, &state, parse_incident_id(arg)?).await?,
        "cancel" => {
            if let Some((chat, _)) = origin(&q) {
                state.clear_pending((chat.0, q.from.id.0));
            }
            bot.answer_callback_query(q.id.clone()).text("Canceled").await?;
        }
        "iface" | "peerinfo" | "peer_add" | "peer_del" | "peer_dl" | "wg_all" | "wg_toggle"
        | "wg_refresh" | "wg_back" | "wg_delcfg" | "wg_addcfg" => {
            vpn::handle_callback(&bot, &q, &state, kind, arg).await?;
        }
        other => {
            tracing::warn!(data = other, "unknown callback");
            bot.answer_callback_query(q.id.clone()).await?;
        }
    }

    Ok(())
}

async fn prompt_comment(
    bot: &Bot,
    q: &CallbackQuery,
    state: &BotState,
    action: IncidentAction,
    incident_id: i64,
) -> HandlerResult {
    let Some((chat, thread)) = origin(q) else {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };

    let actor = actor_from(&q.from);
    tracing::info!(
        incident_id,
        action = action.as_str(),
        operator = %actor.username,
        "operator started a transition"
    );

    state.set_pending(
        (chat.0, q.from.id.0),
        Pending::Comment {
            action,
            incident_id,
        },
    );

    reply_in(
        bot,
        chat,
        thread,
        format!(
            "✍️ Enter a comment to {} incident #{incident_id}:",
            action.as_str()
        ),
    )
    .await?;
    bot.answer_callback_query(q.id.clone()).await?;
    Ok(())
}

async fn prompt_reassign(
    bot: &Bot,
    q: &CallbackQuery,
    state: &BotState,
    incident_id: i64,
) -> HandlerResult {
    let Some((chat, thread)) = origin(q) else {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };

    state.set_pending((chat.0, q.from.id.0), Pending::Reassign { incident_id });

    let keyboard = InlineKeyboardMarkup::new([
        vec![InlineKeyboardButton::callback(
            "Assign to me",
            format!("selfassign:{incident_id}"),
        )],
        vec![InlineKeyboardButton::callback("Cancel", "cancel")],
    ]);

    let mut request = bot
        .send_message(
            chat,
            format!("👥 Send @username to reassign incident #{incident_id} to:"),
        )
        .reply_markup(keyboard);
    if let Some(thread) = thread {
        request = request.message_thread_id(thread);
    }
    request.await?;

    bot.answer_callback_query(q.id.clone()).await?;
    Ok(())
}

async fn self_assign(
    bot: &Bot,
    q: &CallbackQuery,
    state: &BotState,
    incident_id: i64,
) -> HandlerResult {
    let actor = actor_from(&q.from);
    let note = format!("self-assigned by {}", actor.username);

    let result = {
        let state = state.clone();
        let actor = actor.clone();
        let note = note.clone();
        blocking(move || {
            let mut conn = state.open_db()?;
            repo::reassign_incident(&mut conn, incident_id, &actor, &note)
        })
        .await
    };

    match result {
        Ok(incident) => {
            if let Some((chat, _)) = origin(q) {
                state.clear_pending((chat.0, q.from.id.0));
            }
            refresh_incident_card(bot, &incident, Some(&note)).await;
            bot.answer_callback_query(q.id.clone())
                .text(format!("You've been assigned to incident #{incident_id}"))
                .await?;
        }
        Err(err) => {
            tracing::warn!(incident_id, code = %err.code, "self-assign failed");
            bot.answer_callback_query(q.id.clone())
                .text(format!("❌ {}", err.message))
                .await?;
        }
    }

    Ok(())
}

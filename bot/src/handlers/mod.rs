pub mod callbacks;
pub mod cloud;
pub mod commands;
pub mod logs;
pub mod pending;
pub mod vpn;

use teloxide::dispatching::{HandlerExt, UpdateFilterExt, UpdateHandler};
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, Message, ParseMode, ThreadId, User};

use duty_core::domain::Actor;

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Dispatch tree: commands first, then pending-flow text input; callback
/// queries route through one parser.
pub fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    let message_handler = Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<commands::Command>()
                .endpoint(commands::handle),
        )
        .endpoint(pending::handle_text);

    dptree::entry()
        .branch(message_handler)
        .branch(Update::filter_callback_query().endpoint(callbacks::handle))
}

/// Operator identity as recorded in the audit trail: `@username` when set,
/// the profile name otherwise.
pub fn actor_from(user: &User) -> Actor {
    let username = match user.username.as_deref() {
        Some(name) => format!("@{name}"),
        None => user.full_name(),
    };
    Actor::new(username, Some(user.id.0 as i64))
}

/// Plain reply into the chat (and forum topic) the update came from.
pub(crate) async fn reply_in(
    bot: &Bot,
    chat: ChatId,
    thread: Option<ThreadId>,
    text: impl Into<String>,
) -> Result<Message, teloxide::RequestError> {
    let mut request = bot.send_message(chat, text.into());
    if let Some(thread) = thread {
        request = request.message_thread_id(thread);
    }
    request.await
}

/// HTML reply with an optional inline keyboard.
pub(crate) async fn reply_menu(
    bot: &Bot,
    chat: ChatId,
    thread: Option<ThreadId>,
    text: String,
    keyboard: Option<InlineKeyboardMarkup>,
) -> Result<Message, teloxide::RequestError> {
    let mut request = bot.send_message(chat, text).parse_mode(ParseMode::Html);
    if let Some(thread) = thread {
        request = request.message_thread_id(thread);
    }
    if let Some(keyboard) = keyboard {
        request = request.reply_markup(keyboard);
    }
    request.await
}

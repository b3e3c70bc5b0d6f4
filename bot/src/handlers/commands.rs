use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use crate::handlers::{cloud, logs, vpn, HandlerResult};
use crate::state::BotState;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    #[command(description = "how to use the bot")]
    Help,
    #[command(description = "incident handling rules")]
    Rules,
    #[command(description = "manage WireGuard interfaces and peers")]
    Vpn,
    #[command(description = "cloud resource usage report")]
    Cloud,
    #[command(description = "tail the bot log, optional line count")]
    Logs(String),
}

const HELP_TEXT: &str = "This bot relays monitoring alerts and manages incidents.\n\
Commands:\n\
/help - this message\n\
/rules - how incidents are handled\n\
/vpn - WireGuard peer management (admins)\n\
/cloud - cloud resource usage (admins)\n\
/logs [n] - tail the bot log (admins)";

const RULES_TEXT: &str = "Incident handling rules:\n\
1. When an alert arrives you can take the incident or reject it.\n\
2. Taking, closing, rejecting and reopening all require a comment.\n\
3. Resolved incidents are acknowledged in the monitoring system.\n\
4. Every action is recorded in the audit trail.";

pub async fn handle(bot: Bot, msg: Message, cmd: Command, state: BotState) -> HandlerResult {
    match cmd {
        Command::Help => {
            bot.send_message(msg.chat.id, HELP_TEXT).await?;
        }
        Command::Rules => {
            bot.send_message(msg.chat.id, RULES_TEXT).await?;
        }
        // Admin utilities: silently ignore non-admin users, matching the
        // access middleware of the original deployment.
        Command::Vpn => {
            if is_admin(&msg, &state) {
                vpn::cmd_vpn(&bot, &msg, &state).await?;
            }
        }
        Command::Cloud => {
            if is_admin(&msg, &state) {
                cloud::cmd_cloud(&bot, &msg, &state).await?;
            }
        }
        Command::Logs(args) => {
            if is_admin(&msg, &state) {
                logs::cmd_logs(&bot, &msg, &state, &args).await?;
            }
        }
    }
    Ok(())
}

fn is_admin(msg: &Message, state: &BotState) -> bool {
    msg.from
        .as_ref()
        .is_some_and(|user| state.is_admin(user.id.0))
}

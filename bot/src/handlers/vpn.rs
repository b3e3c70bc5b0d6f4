use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ThreadId};

use duty_core::error::AppError;
use duty_net::wgdashboard::{PeerFile, WgDashboardClient};

use crate::handlers::callbacks::origin;
use crate::handlers::{reply_in, reply_menu, HandlerResult};
use crate::state::{blocking, BotState, Pending};

fn dot(enabled: bool) -> &'static str {
    if enabled {
        "🟢"
    } else {
        "🔴"
    }
}

fn client(state: &BotState) -> Option<Arc<WgDashboardClient>> {
    state.wg.clone()
}

pub async fn cmd_vpn(bot: &Bot, msg: &Message, state: &BotState) -> HandlerResult {
    show_interfaces(bot, msg.chat.id, msg.thread_id, state).await
}

async fn show_interfaces(
    bot: &Bot,
    chat: ChatId,
    thread: Option<ThreadId>,
    state: &BotState,
) -> HandlerResult {
    let Some(wg) = client(state) else {
        reply_in(bot, chat, thread, "VPN integration is not configured.").await?;
        return Ok(());
    };

    let configs = blocking(move || wg.list_configurations()).await;
    let configs = match configs {
        Ok(configs) => configs,
        Err(err) => {
            reply_in(
                bot,
                chat,
                thread,
                format!("❌ Failed to load configurations: {}", err.message),
            )
            .await?;
            return Ok(());
        }
    };

    if configs.is_empty() {
        reply_in(bot, chat, thread, "No interfaces available.").await?;
        return Ok(());
    }

    let mut rows: Vec<Vec<InlineKeyboardButton>> = configs
        .iter()
        .map(|cfg| {
            vec![InlineKeyboardButton::callback(
                format!("{} {}", dot(cfg.enabled), cfg.name),
                format!("iface:{}", cfg.name),
            )]
        })
        .collect();
    rows.push(vec![InlineKeyboardButton::callback(
        "➕ Add configuration",
        "wg_addcfg",
    )]);

    reply_menu(
        bot,
        chat,
        thread,
        "Choose an interface:".to_string(),
        Some(InlineKeyboardMarkup::new(rows)),
    )
    .await?;
    Ok(())
}

async fn show_peers(
    bot: &Bot,
    chat: ChatId,
    thread: Option<ThreadId>,
    state: &BotState,
    interface: &str,
) -> HandlerResult {
    let Some(wg) = client(state) else {
        return Ok(());
    };

    let info = {
        let interface = interface.to_string();
        blocking(move || wg.configuration_info(&interface)).await
    };
    let info = match info {
        Ok(info) => info,
        Err(err) => {
            reply_in(
                bot,
                chat,
                thread,
                format!("❌ Failed to load peers: {}", err.message),
            )
            .await?;
            return Ok(());
        }
    };

    let text = format!(
        "{} <b>{}</b> — {} peer(s)",
        dot(info.info.enabled),
        teloxide::utils::html::escape(interface),
        info.peers.len()
    );

    let mut rows: Vec<Vec<InlineKeyboardButton>> = Vec::new();
    for pair in info.peers.chunks(2) {
        rows.push(
            pair.iter()
                .map(|peer| {
                    InlineKeyboardButton::callback(
                        format!("{} {}", dot(peer.is_running()), peer.display_name()),
                        format!("peerinfo:{}", peer.id),
                    )
                })
                .collect(),
        );
    }

    let toggle_label = if info.info.enabled {
        "🟥 Disable interface"
    } else {
        "🟩 Enable interface"
    };
    rows.push(vec![
        InlineKeyboardButton::callback("📦 Download all", format!("wg_all:{interface}")),
        InlineKeyboardButton::callback(toggle_label, format!("wg_toggle:{interface}")),
    ]);
    rows.push(vec![
        InlineKeyboardButton::callback("➕ Add peer", "peer_add"),
        InlineKeyboardButton::callback("🗑 Delete interface", format!("wg_delcfg:{interface}")),
    ]);
    rows.push(vec![
        InlineKeyboardButton::callback("🔄 Refresh", format!("wg_refresh:{interface}")),
        InlineKeyboardButton::callback("⬅ Back", "wg_back"),
    ]);

    reply_menu(bot, chat, thread, text, Some(InlineKeyboardMarkup::new(rows))).await?;
    Ok(())
}

pub async fn handle_callback(
    bot: &Bot,
    q: &CallbackQuery,
    state: &BotState,
    kind: &str,
    arg: Option<&str>,
) -> HandlerResult {
    // Same silent gate as the admin commands.
    if !state.is_admin(q.from.id.0) {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    }
    let Some((chat, thread)) = origin(q) else {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };

    match kind {
        "iface" | "wg_refresh" => {
            if let Some(interface) = arg {
                state.select_interface(chat.0, interface);
                show_peers(bot, chat, thread, state, interface).await?;
            }
        }
        "wg_back" => show_interfaces(bot, chat, thread, state).await?,
        "peerinfo" => {
            if let (Some(peer_id), Some(interface)) = (arg, state.selected_interface(chat.0)) {
                peer_menu(bot, chat, thread, state, &interface, peer_id).await?;
            }
        }
        "peer_add" => {
            if let Some(interface) = state.selected_interface(chat.0) {
                state.set_pending((chat.0, q.from.id.0), Pending::WgPeerName { interface });
                reply_in(bot, chat, thread, "Enter a name for the new peer:").await?;
            }
        }
        "peer_del" => {
            if let (Some(peer_id), Some(interface)) = (arg, state.selected_interface(chat.0)) {
                delete_peer(bot, chat, thread, state, &interface, peer_id).await?;
            }
        }
        "peer_dl" => {
            if let (Some(peer_id), Some(interface)) = (arg, state.selected_interface(chat.0)) {
                download_peer(bot, chat, thread, state, &interface, peer_id).await?;
            }
        }
        "wg_all" => {
            if let Some(interface) = arg {
                download_all(bot, chat, thread, state, interface).await?;
            }
        }
        "wg_toggle" => {
            if let Some(interface) = arg {
                toggle_interface(bot, chat, thread, state, interface).await?;
            }
        }
        "wg_delcfg" => {
            if let Some(interface) = arg {
                delete_interface(bot, chat, thread, state, interface).await?;
            }
        }
        "wg_addcfg" => {
            state.set_pending((chat.0, q.from.id.0), Pending::WgConfigJson);
            reply_in(bot, chat, thread, "Send the new configuration as JSON:").await?;
        }
        _ => {}
    }

    bot.answer_callback_query(q.id.clone()).await?;
    Ok(())
}

async fn peer_menu(
    bot: &Bot,
    chat: ChatId,
    thread: Option<ThreadId>,
    state: &BotState,
    interface: &str,
    peer_id: &str,
) -> HandlerResult {
    let Some(wg) = client(state) else {
        return Ok(());
    };

    let info = {
        let interface = interface.to_string();
        blocking(move || wg.configuration_info(&interface)).await
    };
    let Ok(info) = info else {
        reply_in(bot, chat, thread, "❌ Failed to load peer info").await?;
        return Ok(());
    };
    let Some(peer) = info.peers.iter().find(|p| p.id == peer_id) else {
        reply_in(bot, chat, thread, "Peer is gone; refresh the list.").await?;
        return Ok(());
    };

    let text = format!(
        "{} <b>{}</b>\nstatus: {}",
        dot(peer.is_running()),
        teloxide::utils::html::escape(peer.display_name()),
        peer.status.as_deref().unwrap_or("unknown")
    );
    let keyboard = InlineKeyboardMarkup::new([
        vec![
            InlineKeyboardButton::callback("📄 Download config", format!("peer_dl:{}", peer.id)),
            InlineKeyboardButton::callback("🗑 Delete peer", format!("peer_del:{}", peer.id)),
        ],
        vec![InlineKeyboardButton::callback(
            "⬅ Back",
            format!("wg_refresh:{interface}"),
        )],
    ]);

    reply_menu(bot, chat, thread, text, Some(keyboard)).await?;
    Ok(())
}

pub async fn create_peer(
    bot: &Bot,
    chat: ChatId,
    thread: Option<ThreadId>,
    state: &BotState,
    interface: &str,
    peer_name: &str,
) -> HandlerResult {
    if peer_name.is_empty() {
        reply_in(bot, chat, thread, "❌ Peer name cannot be empty").await?;
        return Ok(());
    }
    let Some(wg) = client(state) else {
        return Ok(());
    };

    let result = {
        let interface = interface.to_string();
        let peer_name = peer_name.to_string();
        blocking(move || wg.add_peer(&interface, &peer_name)).await
    };

    match result {
        Ok(_) => {
            reply_in(bot, chat, thread, format!("✅ Peer {peer_name} created")).await?;
            show_peers(bot, chat, thread, state, interface).await?;
        }
        Err(err) => {
            reply_in(
                bot,
                chat,
                thread,
                format!("❌ Failed to create peer: {}", err.message),
            )
            .await?;
        }
    }
    Ok(())
}

pub async fn add_config_from_json(
    bot: &Bot,
    chat: ChatId,
    thread: Option<ThreadId>,
    state: &BotState,
    raw: &str,
) -> HandlerResult {
    let payload: serde_json::Value = match serde_json::from_str(raw) {
        Ok(payload) => payload,
        Err(error) => {
            reply_in(bot, chat, thread, format!("❌ Invalid JSON: {error}")).await?;
            return Ok(());
        }
    };
    let Some(wg) = client(state) else {
        return Ok(());
    };

    let result = blocking(move || wg.add_configuration(payload)).await;
    match result {
        Ok(()) => {
            reply_in(bot, chat, thread, "✅ Configuration created").await?;
            show_interfaces(bot, chat, thread, state).await?;
        }
        Err(err) => {
            reply_in(
                bot,
                chat,
                thread,
                format!("❌ Failed to add configuration: {}", err.message),
            )
            .await?;
        }
    }
    Ok(())
}

async fn delete_peer(
    bot: &Bot,
    chat: ChatId,
    thread: Option<ThreadId>,
    state: &BotState,
    interface: &str,
    peer_id: &str,
) -> HandlerResult {
    let Some(wg) = client(state) else {
        return Ok(());
    };

    let result = {
        let interface = interface.to_string();
        let peer_id = peer_id.to_string();
        blocking(move || wg.delete_peer(&interface, &peer_id)).await
    };

    match result {
        Ok(()) => {
            reply_in(bot, chat, thread, "✅ Peer deleted").await?;
            show_peers(bot, chat, thread, state, interface).await?;
        }
        Err(err) => {
            reply_in(
                bot,
                chat,
                thread,
                format!("❌ Failed to delete peer: {}", err.message),
            )
            .await?;
        }
    }
    Ok(())
}

async fn download_peer(
    bot: &Bot,
    chat: ChatId,
    thread: Option<ThreadId>,
    state: &BotState,
    interface: &str,
    peer_id: &str,
) -> HandlerResult {
    let Some(wg) = client(state) else {
        return Ok(());
    };

    let result = {
        let interface = interface.to_string();
        let peer_id = peer_id.to_string();
        blocking(move || wg.download_peer(&interface, &peer_id)).await
    };

    match result {
        Ok(file) => {
            let name = conf_file_name(&file.file_name);
            let document = InputFile::memory(file.file.into_bytes()).file_name(name);
            let mut request = bot.send_document(chat, document);
            if let Some(thread) = thread {
                request = request.message_thread_id(thread);
            }
            request.await?;
        }
        Err(err) => {
            reply_in(
                bot,
                chat,
                thread,
                format!("❌ Failed to download config: {}", err.message),
            )
            .await?;
        }
    }
    Ok(())
}

async fn download_all(
    bot: &Bot,
    chat: ChatId,
    thread: Option<ThreadId>,
    state: &BotState,
    interface: &str,
) -> HandlerResult {
    let Some(wg) = client(state) else {
        return Ok(());
    };

    let files = {
        let interface = interface.to_string();
        blocking(move || wg.download_all_peers(&interface)).await
    };

    match files.and_then(|files| zip_peer_files(&files)) {
        Ok(archive) => {
            let document =
                InputFile::memory(archive).file_name(format!("{interface}_all_peers.zip"));
            let mut request = bot.send_document(chat, document);
            if let Some(thread) = thread {
                request = request.message_thread_id(thread);
            }
            request.await?;
        }
        Err(err) => {
            reply_in(
                bot,
                chat,
                thread,
                format!("❌ Failed to build archive: {}", err.message),
            )
            .await?;
        }
    }
    Ok(())
}

async fn toggle_interface(
    bot: &Bot,
    chat: ChatId,
    thread: Option<ThreadId>,
    state: &BotState,
    interface: &str,
) -> HandlerResult {
    let Some(wg) = client(state) else {
        return Ok(());
    };

    let result = {
        let interface = interface.to_string();
        blocking(move || wg.toggle_configuration(&interface)).await
    };

    match result {
        Ok(_) => show_peers(bot, chat, thread, state, interface).await?,
        Err(err) => {
            reply_in(
                bot,
                chat,
                thread,
                format!("❌ Failed to toggle interface: {}", err.message),
            )
            .await?;
        }
    }
    Ok(())
}

async fn delete_interface(
    bot: &Bot,
    chat: ChatId,
    thread: Option<ThreadId>,
    state: &BotState,
    interface: &str,
) -> HandlerResult {
    let Some(wg) = client(state) else {
        return Ok(());
    };

    let result = {
        let interface = interface.to_string();
        blocking(move || wg.delete_configuration(&interface)).await
    };

    match result {
        Ok(()) => {
            reply_in(bot, chat, thread, format!("✅ {interface} deleted")).await?;
            show_interfaces(bot, chat, thread, state).await?;
        }
        Err(err) => {
            reply_in(
                bot,
                chat,
                thread,
                format!("❌ Failed to delete interface: {}", err.message),
            )
            .await?;
        }
    }
    Ok(())
}

fn conf_file_name(raw: &str) -> String {
    let base = raw.replace('/', "_");
    let base = base.trim();
    let base = if base.is_empty() { "peer" } else { base };
    if base.ends_with(".conf") {
        base.to_string()
    } else {
        format!("{base}.conf")
    }
}

/// Zip all peer configs; duplicate file names get (1), (2), ... suffixes.
fn zip_peer_files(files: &[PeerFile]) -> Result<Vec<u8>, AppError> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    let mut used: HashMap<String, u32> = HashMap::new();

    for file in files {
        let base = conf_file_name(&file.file_name);
        let name = match used.get_mut(&base) {
            Some(count) => {
                *count += 1;
                let stem = base.trim_end_matches(".conf");
                format!("{stem}({count}).conf")
            }
            None => {
                used.insert(base.clone(), 0);
                base
            }
        };

        writer
            .start_file(name, options)
            .map_err(|e| AppError::wrap("WG_ZIP_FAILED", "Failed to add file to archive", e))?;
        writer
            .write_all(file.file.as_bytes())
            .map_err(|e| AppError::wrap("WG_ZIP_FAILED", "Failed to write archive entry", e))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| AppError::wrap("WG_ZIP_FAILED", "Failed to finish archive", e))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(name: &str, content: &str) -> PeerFile {
        PeerFile {
            file_name: name.to_string(),
            file: content.to_string(),
        }
    }

    #[test]
    fn conf_names_are_normalized() {
        assert_eq!(conf_file_name("laptop"), "laptop.conf");
        assert_eq!(conf_file_name("laptop.conf"), "laptop.conf");
        assert_eq!(conf_file_name("a/b"), "a_b.conf");
        assert_eq!(conf_file_name(""), "peer.conf");
    }

    #[test]
    fn duplicate_names_get_suffixes_in_archive() {
        let files = vec![
            peer("laptop", "[Interface]\nA"),
            peer("laptop", "[Interface]\nB"),
            peer("phone", "[Interface]\nC"),
        ];

        let bytes = zip_peer_files(&files).expect("zip");
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("read back");

        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["laptop.conf", "laptop(1).conf", "phone.conf"]);
    }
}

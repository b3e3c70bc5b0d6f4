use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use teloxide::prelude::*;
use teloxide::types::InputFile;
use teloxide::utils::html;

use crate::handlers::{reply_menu, HandlerResult};
use crate::state::BotState;

const DEFAULT_LINES: usize = 50;
const MAX_LINES: usize = 500;

// A message this long gets sent as a document instead.
const INLINE_LIMIT: usize = 4000;

/// Newest log file in the directory, by modification time.
fn latest_log_file(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if newest.as_ref().map_or(true, |(ts, _)| modified > *ts) {
            newest = Some((modified, entry.path()));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

/// Read the last `lines` lines without loading the whole file: walk backwards
/// in 1 KiB blocks until enough newlines are seen.
fn tail_lines(path: &Path, lines: usize) -> std::io::Result<Vec<String>> {
    const BLOCK_SIZE: u64 = 1024;

    let mut file = fs::File::open(path)?;
    let mut end = file.seek(SeekFrom::End(0))?;
    let mut data: Vec<u8> = Vec::new();

    while end > 0 && data.iter().filter(|b| **b == b'\n').count() <= lines {
        let read_size = BLOCK_SIZE.min(end);
        end -= read_size;
        file.seek(SeekFrom::Start(end))?;

        let mut block = vec![0u8; read_size as usize];
        file.read_exact(&mut block)?;
        block.extend_from_slice(&data);
        data = block;
    }

    let text = String::from_utf8_lossy(&data);
    let mut out: Vec<String> = text.lines().map(ToString::to_string).collect();
    if out.len() > lines {
        out.drain(..out.len() - lines);
    }
    Ok(out)
}

pub async fn cmd_logs(bot: &Bot, msg: &Message, state: &BotState, args: &str) -> HandlerResult {
    let lines = args
        .trim()
        .parse::<usize>()
        .unwrap_or(DEFAULT_LINES)
        .clamp(1, MAX_LINES);

    let log_file = match latest_log_file(&state.config.log_dir) {
        Ok(Some(path)) => path,
        Ok(None) => {
            bot.send_message(msg.chat.id, "No log files found.").await?;
            return Ok(());
        }
        Err(error) => {
            tracing::warn!(error = %error, "failed to list log directory");
            bot.send_message(msg.chat.id, "❌ Failed to read the log directory.")
                .await?;
            return Ok(());
        }
    };

    let tail = match tail_lines(&log_file, lines) {
        Ok(tail) => tail,
        Err(error) => {
            tracing::warn!(error = %error, path = %log_file.display(), "failed to tail log file");
            bot.send_message(msg.chat.id, "❌ Failed to read the log file.")
                .await?;
            return Ok(());
        }
    };

    let joined = tail.join("\n");
    if joined.len() > INLINE_LIMIT {
        let name = log_file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "bot.log".to_string());
        let document = InputFile::memory(joined.into_bytes()).file_name(name);
        bot.send_document(msg.chat.id, document).await?;
    } else {
        let text = format!("<pre>{}</pre>", html::escape(&joined));
        reply_menu(bot, msg.chat.id, msg.thread_id, text, None).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn tail_returns_the_last_n_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bot.log");
        let mut file = fs::File::create(&path).expect("create");
        for i in 0..200 {
            writeln!(file, "line {i}").expect("write");
        }

        let tail = tail_lines(&path, 3).expect("tail");
        assert_eq!(tail, vec!["line 197", "line 198", "line 199"]);
    }

    #[test]
    fn tail_of_short_file_returns_everything() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bot.log");
        fs::write(&path, "only line\n").expect("write");

        let tail = tail_lines(&path, 50).expect("tail");
        assert_eq!(tail, vec!["only line"]);
    }

    #[test]
    fn latest_file_wins_by_mtime() {
        let dir = tempfile::tempdir().expect("tempdir");
        let old = dir.path().join("bot.log.2026-08-05");
        let new = dir.path().join("bot.log.2026-08-06");
        fs::write(&old, "old\n").expect("write");
        fs::write(&new, "new\n").expect("write");

        let older = std::time::SystemTime::now() - std::time::Duration::from_secs(3600);
        let file = fs::File::options().write(true).open(&old).expect("open");
        file.set_modified(older).expect("set mtime");

        let latest = latest_log_file(dir.path()).expect("list").expect("some");
        assert_eq!(latest, new);
    }
}

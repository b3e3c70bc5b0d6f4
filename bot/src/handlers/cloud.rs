use teloxide::prelude::*;

use duty_net::vcloud::CloudUsageReport;

use crate::handlers::{reply_menu, HandlerResult};
use crate::state::{blocking, BotState};

fn pct_suffix(pct: Option<f64>) -> String {
    match pct {
        Some(pct) => format!(" ({pct:.0}%)"),
        None => String::new(),
    }
}

fn gb(mb: i64) -> f64 {
    mb as f64 / 1024.0
}

/// Render the usage snapshot for chat. Capacity units follow the tenant API:
/// CPU in MHz, memory and storage in MB.
pub fn render_report(report: &CloudUsageReport) -> String {
    let mut text = format!(
        "☁️ <b>Cloud resource usage</b>\n\
         🖥 <b>CPU:</b> {} / {} MHz{}\n\
         💾 <b>Memory:</b> {:.1} / {:.1} GB{}",
        report.cpu_mhz.used,
        report.cpu_mhz.allocated,
        pct_suffix(report.cpu_mhz.used_pct()),
        gb(report.memory_mb.used),
        gb(report.memory_mb.allocated),
        pct_suffix(report.memory_mb.used_pct()),
    );

    for policy in &report.storage {
        text.push_str(&format!(
            "\n📦 <b>{}:</b> {:.1} GB used",
            teloxide::utils::html::escape(&policy.policy_name),
            gb(policy.total_used_mb)
        ));
    }

    text
}

pub async fn cmd_cloud(bot: &Bot, msg: &Message, state: &BotState) -> HandlerResult {
    let Some(reporter) = state.cloud.clone() else {
        bot.send_message(msg.chat.id, "Cloud integration is not configured.")
            .await?;
        return Ok(());
    };

    let report = blocking(move || reporter.report()).await;
    match report {
        Ok(report) => {
            reply_menu(bot, msg.chat.id, msg.thread_id, render_report(&report), None).await?;
        }
        Err(err) => {
            tracing::warn!(code = %err.code, "cloud report failed");
            bot.send_message(
                msg.chat.id,
                format!("❌ Failed to fetch usage report: {}", err.message),
            )
            .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use duty_net::vcloud::{CapacityPool, StoragePolicyUsage};

    #[test]
    fn report_renders_all_sections() {
        let report = CloudUsageReport {
            cpu_mhz: CapacityPool {
                allocated: 20000,
                used: 5000,
            },
            memory_mb: CapacityPool {
                allocated: 65536,
                used: 32768,
            },
            storage: vec![
                StoragePolicyUsage {
                    policy_name: "Gold".into(),
                    total_used_mb: 10240,
                },
                StoragePolicyUsage {
                    policy_name: "Bronze".into(),
                    total_used_mb: 512,
                },
            ],
        };

        let text = render_report(&report);
        assert!(text.contains("5000 / 20000 MHz (25%)"));
        assert!(text.contains("32.0 / 64.0 GB (50%)"));
        assert!(text.contains("Gold:</b> 10.0 GB used"));
        assert!(text.contains("Bronze:</b> 0.5 GB used"));
    }
}

use anyhow::Context;
use clap::{Parser, Subcommand};
use teloxide::dispatching::Dispatcher;
use teloxide::dptree;
use teloxide::prelude::*;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use duty_core::db;
use duty_core::domain::NewIncident;

use dutybot::config::Config;
use dutybot::handlers;
use dutybot::publish::publish_incident;
use dutybot::state::BotState;
use dutybot::webhook::{self, WebhookContext};

#[derive(Parser)]
#[command(name = "dutybot", about = "Zabbix to Telegram incident relay bot")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot: Telegram dispatcher plus the alert webhook.
    Run,
    /// Register one incident and post it, then exit (alertscript mode).
    SendAlert {
        /// Monitoring event id, used for upstream acknowledgement.
        event_id: String,
        /// Alert subject, shown as the event line.
        subject: String,
        /// Alert body, shown as details.
        message: String,
        /// Node the alert fired on.
        #[arg(long, default_value = "-")]
        node: String,
        /// Severity label.
        #[arg(long, default_value = "not classified")]
        severity: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_env().context("configuration")?;

    std::fs::create_dir_all(&config.log_dir).context("create log directory")?;
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "dutybot.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(file_writer.and(std::io::stdout))
        .with_ansi(false)
        .init();

    // Migrations run once here; handlers open per-operation connections.
    {
        let mut conn = db::open(&config.db_path).context("open database")?;
        db::migrate(&mut conn).context("migrate database")?;
    }

    match cli.command {
        Commands::Run => run_bot(config).await,
        Commands::SendAlert {
            event_id,
            subject,
            message,
            node,
            severity,
        } => {
            send_alert(
                config,
                NewIncident {
                    event_id: Some(event_id),
                    event: subject.clone(),
                    node,
                    trigger: subject,
                    severity,
                    details: Some(message),
                },
            )
            .await
        }
    }
}

async fn run_bot(config: Config) -> anyhow::Result<()> {
    let webhook_addr = config.webhook_addr;
    let bot = Bot::new(&config.bot_token);
    let state = BotState::new(config);

    tracing::info!(
        admin_count = state.config.admin_ids.len(),
        group_id = state.config.group_id,
        db_path = %state.config.db_path.display(),
        "starting dutybot"
    );

    let listener = tokio::net::TcpListener::bind(webhook_addr)
        .await
        .with_context(|| format!("bind webhook listener on {webhook_addr}"))?;
    let app = webhook::router(WebhookContext {
        bot: bot.clone(),
        state: state.clone(),
    });
    tokio::spawn(async move {
        tracing::info!(%webhook_addr, "alert webhook listening");
        if let Err(error) = axum::serve(listener, app).await {
            tracing::error!(error = %error, "webhook server stopped");
        }
    });

    tracing::info!("dispatcher initialized, bot is ready");
    Dispatcher::builder(bot, handlers::schema())
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn send_alert(config: Config, new: NewIncident) -> anyhow::Result<()> {
    let bot = Bot::new(&config.bot_token);
    let state = BotState::new(config);

    let incident = publish_incident(&bot, &state, new)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("incident #{} posted", incident.id);
    Ok(())
}

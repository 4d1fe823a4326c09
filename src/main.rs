use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use listing_watch::bot::ChatBot;
use listing_watch::broadcast::{Audience, broadcast};
use listing_watch::plugins::Notifier;
use listing_watch::plugins::notifiers::{LogNotifier, TelegramNotifier, telegram_from_config};
use listing_watch::scraper::HttpFetcher;
use listing_watch::utils::text::format_duration_secs;
use listing_watch::{
    AppConfig, Command, CommandHandler, Database, SessionScheduler, SyncEngine, SyncWorker, logging,
    telemetry,
};

#[derive(Parser)]
#[command(name = "listing-watch", version, about = "Watches real-estate searches for new listings")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the scheduler and sync due sessions until interrupted
    Run,
    /// Apply database migrations and exit
    Migrate,
    /// List stored sessions
    Sessions {
        #[arg(long)]
        only_active: bool,
    },
    /// Sync one user immediately
    SyncNow { user_id: i64 },
    /// Show stored listings of a user
    Listings {
        user_id: i64,
        #[arg(long)]
        only_new: bool,
    },
    /// Send an announcement to every active session, or to one user
    Broadcast {
        message: String,
        #[arg(long)]
        user_id: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::from_env()?;
    let _log_guard = logging::init(&config.logging)?;

    let db = Database::connect(&config.database).await?;
    db.migrate().await?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config, db).await,
        Commands::Migrate => {
            info!("Migrations applied");
            Ok(())
        }
        Commands::Sessions { only_active } => show_sessions(&db, only_active).await,
        Commands::SyncNow { user_id } => {
            let (_, notifier) = build_notifier(&config)?;
            let worker = build_worker(&config, &db, notifier, CancellationToken::new())?;
            let handler = CommandHandler::new(db.clone(), worker, &config);
            let reply = handler.dispatch(user_id, Command::SyncNow).await?;
            println!("{}", reply.text);
            Ok(())
        }
        Commands::Listings { user_id, only_new } => show_listings(&db, user_id, only_new).await,
        Commands::Broadcast { message, user_id } => {
            let (_, notifier) = build_notifier(&config)?;
            let audience = user_id.map_or(Audience::ActiveSessions, Audience::User);
            let report = broadcast(&db, notifier.as_ref(), &message, audience).await?;
            println!("Sent: {}, failed: {}", report.sent, report.failed);
            Ok(())
        }
    }
}

async fn run(config: AppConfig, db: Database) -> Result<()> {
    info!("Starting listing-watch...");
    telemetry::install(&config.metrics)?;

    let cancel = CancellationToken::new();
    let (telegram, notifier) = build_notifier(&config)?;
    let worker = build_worker(&config, &db, notifier.clone(), cancel.clone())?;
    let handler = Arc::new(CommandHandler::new(db.clone(), worker.clone(), &config));

    let mut scheduler = SessionScheduler::new(worker, config.scheduler.clone()).await?;
    scheduler.start().await?;

    // Commands arrive through the same bot account that sends notifications
    let bot = match telegram {
        Some(telegram) => {
            let bot = ChatBot::new(telegram, handler, notifier, cancel.clone());
            Some(tokio::spawn(bot.run()))
        }
        None => {
            tracing::warn!("Chat commands are disabled without a Telegram token");
            None
        }
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    scheduler.shutdown().await?;
    if let Some(bot) = bot {
        bot.await?;
    }

    Ok(())
}

/// The Telegram client when configured, and the notifier every component sends through.
fn build_notifier(config: &AppConfig) -> Result<(Option<Arc<TelegramNotifier>>, Arc<dyn Notifier>)> {
    let telegram = telegram_from_config(&config.notifications.telegram)?.map(Arc::new);
    let notifier: Arc<dyn Notifier> = match &telegram {
        Some(telegram) => Arc::clone(telegram) as Arc<dyn Notifier>,
        None => Arc::new(LogNotifier),
    };
    Ok((telegram, notifier))
}

fn build_worker(
    config: &AppConfig,
    db: &Database,
    notifier: Arc<dyn Notifier>,
    cancel: CancellationToken,
) -> Result<Arc<SyncWorker>> {
    let fetcher = Arc::new(HttpFetcher::new(&config.scraper)?);
    let engine = Arc::new(SyncEngine::new(fetcher, db.listings(), &config.scraper));

    Ok(Arc::new(SyncWorker::new(
        db.clone(),
        engine,
        notifier,
        &config.scheduler,
        cancel,
    )))
}

async fn show_sessions(db: &Database, only_active: bool) -> Result<()> {
    let sessions = db.sessions().list(only_active).await?;

    println!(
        "{:<12} {:<12} {:<8} {:<10} {:<26} {:<6}",
        "USER", "CHAT", "ACTIVE", "INTERVAL", "LAST SYNC", "DND"
    );
    for session in sessions {
        println!(
            "{:<12} {:<12} {:<8} {:<10} {:<26} {:<6}",
            session.user_id,
            session.chat_id,
            session.is_active,
            format_duration_secs(session.polling_interval_secs),
            session
                .last_synced_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "never".to_string()),
            session.dnd_active,
        );
    }
    Ok(())
}

async fn show_listings(db: &Database, user_id: i64, only_new: bool) -> Result<()> {
    let listings = db.listings().list(user_id, only_new).await?;

    for listing in &listings {
        println!(
            "{}{} | {} {:.0} | {} | {}",
            if listing.is_new { "* " } else { "  " },
            listing.name,
            listing.price_currency,
            listing.price,
            listing.locality,
            listing.url
        );
    }
    println!("{} listing(s)", listings.len());
    Ok(())
}

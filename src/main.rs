mod bot;
mod claude;
mod config;

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use teloxide::prelude::*;
use teloxide::types::ChatKind;
use tracing::{debug, info, warn};
use tracing_subscriber::prelude::*;

use bot::commands::is_command;
use bot::{
    ClaudeResponder, Collaborators, Dispatcher as CommandDispatcher, DispatcherSettings,
    ExitReason, Inbound, Jukebox, Mailer, MpvGateway, Responder, SharedState, Shutdown,
    SmtpMailer, TelegramClient, TtsClient, YtDlpResolver,
};
use claude::Client as ClaudeClient;
use config::{Config, ConfigError};

struct App {
    dispatcher: CommandDispatcher,
    telegram: Arc<TelegramClient>,
    bot_id: UserId,
    /// Updates queued while we were offline are dropped, so a `restart`
    /// is never replayed.
    started_at: DateTime<Utc>,
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "settings.txt".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(ConfigError::Created { .. }) => {
            println!("Please configure the {config_path} file.");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("moby.log"))
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file in {}: {e}", log_dir.display());
            std::process::exit(1);
        }
    };
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting {}...", config.bot_name);
    info!("Loaded config from {config_path}");
    info!("Owner IDs: {:?}", config.owner_ids);
    for warning in &config.warnings {
        warn!("{}", warning);
    }

    let reason = run(config).await;
    info!("👋 Shutting down ({:?})", reason);
    drop(_guard);
    std::process::exit(reason.exit_code());
}

async fn run(config: Config) -> ExitReason {
    let bot = Bot::new(&config.bot_token);

    let (bot_id, bot_username) = match bot.get_me().await {
        Ok(me) => {
            info!("Bot user ID: {}, username: @{}", me.id, me.username());
            (me.id, Some(me.username().to_string()))
        }
        Err(e) => {
            warn!("Failed to get bot info: {e}");
            (UserId(0), None)
        }
    };

    let tts = config.tts_endpoint.clone().map(TtsClient::new);
    let telegram = Arc::new(TelegramClient::new(bot.clone(), config.owner_ids.clone(), tts));
    let resolver = Arc::new(YtDlpResolver::new(config.ytdlp_path.clone()));
    let gateway = Arc::new(MpvGateway::new(config.mpv_path.clone(), config.data_dir.join("mpv")));

    let responder: Option<Arc<dyn Responder>> = match &config.anthropic_api_key {
        Some(key) => {
            info!("Chat responder enabled");
            Some(Arc::new(ClaudeResponder::new(ClaudeClient::new(key.clone()), &config.bot_name)))
        }
        None => {
            info!("Chat responder disabled (no anthropic_api_key)");
            None
        }
    };
    let mailer: Option<Arc<dyn Mailer>> = match config.email.as_ref().map(SmtpMailer::new) {
        Some(Ok(mailer)) => {
            info!("📧 Email enabled");
            Some(Arc::new(mailer))
        }
        Some(Err(e)) => {
            warn!("Email disabled: {}", e);
            None
        }
        None => None,
    };

    let state = Arc::new(SharedState::new(config.default_volume));
    let shutdown = Shutdown::new();

    let jukebox = Jukebox::new(
        state.clone(),
        telegram.clone(),
        resolver.clone(),
        config.idle_presence.clone(),
        config.jukebox_interval,
    )
    .spawn(shutdown.clone());

    let settings = DispatcherSettings {
        bot_name: config.bot_name.clone(),
        bot_username,
        source_url: config.source_url.clone(),
        jokes_path: config.jokes_path.clone(),
        text_gateway: config.text_gateway().map(str::to_string),
    };
    let deps = Collaborators {
        sink: telegram.clone(),
        gateway,
        resolver,
        responder,
        mailer,
    };
    let app = Arc::new(App {
        dispatcher: CommandDispatcher::new(state.clone(), settings, deps, shutdown.clone()),
        telegram,
        bot_id,
        started_at: Utc::now() - TimeDelta::seconds(1),
    });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_new_message));
    let mut updates = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![app])
        .enable_ctrlc_handler()
        .build();

    let reason = tokio::select! {
        _ = updates.dispatch() => ExitReason::Interrupted,
        reason = shutdown.wait() => reason,
    };
    shutdown.trigger(reason);

    if let Err(e) = jukebox.await {
        warn!("Jukebox task failed: {e}");
    }
    if let Some(player) = state.take_active_player().await
        && let Err(e) = player.stop().await
    {
        warn!("Failed to stop player: {e}");
    }
    shutdown.reason().unwrap_or(reason)
}

async fn handle_new_message(msg: Message, app: Arc<App>) -> ResponseResult<()> {
    if msg.date < app.started_at {
        debug!("Skipping stale message {} from {}", msg.id.0, msg.date);
        return Ok(());
    }
    let (Some(text), Some(user)) = (msg.text(), msg.from.as_ref()) else {
        return Ok(());
    };

    let username = user.username.as_deref().unwrap_or(&user.first_name).to_string();
    let chat_id = msg.chat.id.0;
    let user_id = user.id.0 as i64;
    let is_group = !matches!(msg.chat.kind, ChatKind::Private(_));

    // Admin status costs an API call; only commands need it.
    let is_admin = is_command(text) && app.telegram.is_admin(chat_id, user_id).await;

    let inbound = Inbound {
        message_id: msg.id.0 as i64,
        chat_id,
        user_id,
        username,
        text: text.to_string(),
        is_admin,
        voice_channel: is_group.then_some(chat_id),
        from_self: user.id == app.bot_id,
    };
    let outcome = app.dispatcher.handle(&inbound).await;
    debug!("Message {} → {:?}", inbound.message_id, outcome);
    Ok(())
}

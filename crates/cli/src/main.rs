mod auth_commands;

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::Context,
    clap::{Args, Parser, Subcommand},
    parley_agents::{
        ConversationBackend, build_pool, load_slot_credentials, providers::ChatGptBackend,
    },
    parley_channels::{ChannelOutbound, InboundSink},
    parley_chat::{AuthGate, ChatDispatcher, commands::COMMAND_DESCRIPTIONS},
    parley_config::{ParleyConfig, SlotLoadPolicy},
    parley_credentials::{
        ChainAcquirer, CredentialAcquirer, CredentialStore, EnvAcquirer, PromptAcquirer,
    },
    parley_telegram::{PollExit, TelegramBot, TelegramConfig},
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "parley", version, about = "Parley: chat with ChatGPT from Telegram")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Custom config directory (holds parley.toml and slot credentials).
    #[arg(long, global = true, env = "PARLEY_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    #[command(flatten)]
    overrides: ConfigOverrides,
}

/// Flags that take precedence over the config file and environment.
#[derive(Args, Debug, Default)]
struct ConfigOverrides {
    /// Minimum seconds between edits of a streaming reply.
    #[arg(long)]
    edit_wait: Option<u64>,
    /// Comma-separated Telegram user IDs or usernames allowed to use the bot.
    #[arg(long)]
    allow: Option<String>,
    /// Number of upstream agent slots.
    #[arg(long)]
    slots: Option<usize>,
    /// What to do when a stored slot credential is unreadable.
    #[arg(long, value_enum)]
    slot_load_policy: Option<PolicyArg>,
    /// Base URL of the upstream conversation service.
    #[arg(long)]
    upstream_url: Option<String>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum PolicyArg {
    Truncate,
    Fail,
}

impl From<PolicyArg> for SlotLoadPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Truncate => Self::Truncate,
            PolicyArg::Fail => Self::Fail,
        }
    }
}

impl ConfigOverrides {
    fn apply(&self, config: &mut ParleyConfig) {
        if let Some(secs) = self.edit_wait {
            config.edit_wait_seconds = secs;
        }
        if let Some(raw) = self.allow.as_deref() {
            config.allowlist = parley_config::parse_allowlist(raw);
        }
        if let Some(slots) = self.slots {
            config.agent_slots = slots;
        }
        if let Some(policy) = self.slot_load_policy {
            config.slot_load_policy = policy.into();
        }
        if let Some(url) = &self.upstream_url {
            config.upstream_url.clone_from(url);
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot (default when no subcommand is provided).
    Run,
    /// Manage stored upstream session tokens.
    Auth {
        #[command(subcommand)]
        action: auth_commands::AuthAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Read the config file, then layer environment and flags on top.
fn load_config(cli: &Cli) -> anyhow::Result<(ParleyConfig, PathBuf)> {
    let dir = parley_config::config_dir(cli.config_dir.as_deref());
    let mut config = parley_config::discover_and_load(&dir)?;
    parley_config::apply_env_overrides(&mut config)?;
    cli.overrides.apply(&mut config);
    Ok((config, dir))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    parley_config::load_dotenv();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "parley starting");

    let (config, dir) = load_config(&cli)?;
    match &cli.command {
        None | Some(Commands::Run) => run(config, dir).await,
        Some(Commands::Auth { action }) => auth_commands::handle_auth(action, &config, &dir).await,
    }
}

async fn run(mut config: ParleyConfig, dir: PathBuf) -> anyhow::Result<()> {
    parley_config::validate(&mut config).context("invalid configuration")?;
    info!(?config, config_dir = %dir.display(), "configuration loaded");

    let store = CredentialStore::new(&dir);
    // unattended deployments set PARLEY_SESSION_TOKEN_<N>; otherwise ask on the terminal
    let acquirer = ChainAcquirer::new(vec![
        Box::new(EnvAcquirer) as Box<dyn CredentialAcquirer>,
        Box::new(PromptAcquirer),
    ]);
    let credentials =
        load_slot_credentials(&store, &acquirer, config.agent_slots, config.slot_load_policy)
            .await
            .context("could not load agent credentials")?;

    let upstream = config.upstream_url.clone();
    let pool = build_pool(&credentials, |credential| {
        let backend = ChatGptBackend::new(upstream.as_str(), credential.token.clone())?;
        Ok(Arc::new(backend) as Arc<dyn ConversationBackend>)
    })?;
    info!(agents = pool.len(), requested = config.agent_slots, "agent pool ready");

    let telegram = TelegramBot::connect(
        TelegramConfig::new(config.telegram_token.clone()).with_commands(COMMAND_DESCRIPTIONS),
    )
    .await
    .context("could not connect to Telegram")?;

    let outbound: Arc<dyn ChannelOutbound> = Arc::new(telegram.outbound());
    let dispatcher = Arc::new(ChatDispatcher::new(
        AuthGate::new(config.allowlist.clone()),
        Arc::new(pool),
        outbound,
        config.edit_wait(),
    ));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown requested, no longer accepting messages");
        on_signal.cancel();
    });

    let exit = telegram
        .run_polling(Arc::clone(&dispatcher) as Arc<dyn InboundSink>, cancel)
        .await;

    dispatcher.shutdown().await;
    info!("all responses delivered, exiting");

    match exit {
        PollExit::Cancelled => Ok(()),
        PollExit::Conflict => {
            anyhow::bail!("another instance is already polling with this bot token")
        },
    }
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "could not listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "could not listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

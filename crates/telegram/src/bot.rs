use std::sync::Arc;

use {
    parley_channels::InboundSink,
    secrecy::ExposeSecret,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, BotCommand, UpdateKind},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{config::TelegramConfig, error::Result, handlers, outbound::TelegramOutbound};

/// Why the polling loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    /// The cancellation token fired.
    Cancelled,
    /// Another process is polling with the same token.
    Conflict,
}

/// A connected bot, ready to poll.
pub struct TelegramBot {
    bot: Bot,
    username: Option<String>,
    config: TelegramConfig,
}

impl TelegramBot {
    /// Build the client, verify the token and prepare the bot for long
    /// polling: the webhook is cleared and commands are registered.
    pub async fn connect(config: TelegramConfig) -> Result<Self> {
        // The client timeout must outlast the long-poll timeout or idle polls
        // abort before Telegram answers.
        let client = teloxide::net::default_reqwest_settings()
            .timeout(config.client_timeout)
            .build()?;
        let mut bot = Bot::with_client(config.token.expose_secret(), client);
        if let Some(url) = config.api_url.clone() {
            bot = bot.set_api_url(url);
        }

        let me = bot.get_me().await?;
        let username = me.username.clone();

        bot.delete_webhook().send().await?;

        if !config.commands.is_empty() {
            let commands: Vec<BotCommand> = config
                .commands
                .iter()
                .map(|(name, description)| BotCommand::new(name, description))
                .collect();
            if let Err(e) = bot.set_my_commands(commands).await {
                warn!("failed to register bot commands: {e}");
            }
        }

        info!(username = ?username, "telegram bot connected (webhook cleared)");
        Ok(Self {
            bot,
            username,
            config,
        })
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Outbound handle sharing this bot's client.
    pub fn outbound(&self) -> TelegramOutbound {
        TelegramOutbound::new(self.bot.clone())
    }

    /// Long-poll for updates and hand text messages to `sink` in arrival
    /// order until `cancel` fires or another instance takes over the token.
    ///
    /// An in-flight poll is abandoned on cancellation. Updates already
    /// dispatched are acknowledged before returning so a restart does not
    /// see them again.
    pub async fn run_polling(
        &self,
        sink: Arc<dyn InboundSink>,
        cancel: CancellationToken,
    ) -> PollExit {
        info!("starting telegram polling loop");
        let mut offset: i32 = 0;

        let exit = loop {
            let result = tokio::select! {
                () = cancel.cancelled() => break PollExit::Cancelled,
                result = self
                    .bot
                    .get_updates()
                    .offset(offset)
                    .timeout(self.config.poll_timeout_secs)
                    .allowed_updates(vec![AllowedUpdate::Message])
                    .send() => result,
            };

            match result {
                Ok(updates) => {
                    debug!(count = updates.len(), "got telegram updates");
                    for update in updates {
                        offset = update.id.as_offset();
                        match update.kind {
                            UpdateKind::Message(msg) => {
                                handlers::handle_message(&msg, sink.as_ref()).await;
                            },
                            other => debug!("ignoring non-message update: {other:?}"),
                        }
                    }
                },
                Err(RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                    warn!("telegram polling stopped: another instance is already running with this token");
                    break PollExit::Conflict;
                },
                Err(e) => {
                    warn!(error = %e, "telegram getUpdates failed, backing off");
                    tokio::select! {
                        () = cancel.cancelled() => break PollExit::Cancelled,
                        () = tokio::time::sleep(self.config.error_backoff) => {},
                    }
                },
            }
        };

        if offset != 0 {
            self.acknowledge(offset).await;
        }
        info!(?exit, "telegram polling stopped");
        exit
    }

    /// Confirm every update below `offset` without fetching new ones.
    async fn acknowledge(&self, offset: i32) {
        let ack = self
            .bot
            .get_updates()
            .offset(offset)
            .limit(1)
            .timeout(0)
            .allowed_updates(vec![AllowedUpdate::Message])
            .send()
            .await;
        if let Err(e) = ack {
            warn!(error = %e, "could not acknowledge processed updates");
        }
    }
}

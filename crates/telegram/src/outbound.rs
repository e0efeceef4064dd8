use std::{future::Future, time::Duration};

use {
    async_trait::async_trait,
    teloxide::{
        ApiError, RequestError,
        payloads::{EditMessageTextSetters, SendMessageSetters},
        prelude::*,
        types::{ChatAction, ChatId, MessageId, ParseMode, ReplyParameters},
    },
    tracing::{debug, warn},
};

use {
    parley_channels::{ChannelOutbound, Error as ChannelError, Result as ChannelResult},
    parley_common::types::{MessageRef, ReplyTarget},
};

use crate::markdown::{Rendered, render_message};

const TELEGRAM_RETRY_AFTER_MAX_RETRIES: usize = 4;

/// Sends and edits messages through the Bot API.
///
/// Text is rendered to HTML first. When Telegram refuses the markup, the
/// same request is repeated as plain text. Rate-limit responses are waited
/// out a bounded number of times.
#[derive(Clone)]
pub struct TelegramOutbound {
    bot: Bot,
}

impl TelegramOutbound {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    async fn send_with_fallback(
        &self,
        to: &ReplyTarget,
        rendered: &Rendered,
    ) -> Result<Message, RequestError> {
        let chat_id = ChatId(to.chat_id);
        let reply_params = reply_parameters(to);

        if let Some(html) = rendered.html.as_deref() {
            let sent = with_retry(to.chat_id, "send message (html)", || {
                let mut req = self.bot.send_message(chat_id, html).parse_mode(ParseMode::Html);
                if let Some(rp) = &reply_params {
                    req = req.reply_parameters(rp.clone());
                }
                async move { req.await }
            })
            .await;
            match sent {
                Ok(message) => return Ok(message),
                Err(e) => warn!(
                    chat_id = to.chat_id,
                    error = %e,
                    "telegram HTML send failed, retrying as plain text"
                ),
            }
        }

        with_retry(to.chat_id, "send message (plain)", || {
            let mut req = self.bot.send_message(chat_id, rendered.plain.as_str());
            if let Some(rp) = &reply_params {
                req = req.reply_parameters(rp.clone());
            }
            async move { req.await }
        })
        .await
    }

    async fn edit_with_fallback(
        &self,
        message: &MessageRef,
        rendered: &Rendered,
    ) -> Result<(), RequestError> {
        let chat_id = ChatId(message.chat_id);
        let message_id = MessageId(message.message_id);

        if let Some(html) = rendered.html.as_deref() {
            let edited = with_retry(message.chat_id, "edit message (html)", || {
                let req = self
                    .bot
                    .edit_message_text(chat_id, message_id, html)
                    .parse_mode(ParseMode::Html);
                async move { req.await }
            })
            .await;
            match edited {
                Ok(_) => return Ok(()),
                Err(e) if is_message_not_modified_error(&e) => return Ok(()),
                Err(e) => warn!(
                    chat_id = message.chat_id,
                    message_id = message.message_id,
                    error = %e,
                    "telegram HTML edit failed, retrying as plain text"
                ),
            }
        }

        match with_retry(message.chat_id, "edit message (plain)", || {
            let req = self
                .bot
                .edit_message_text(chat_id, message_id, rendered.plain.as_str());
            async move { req.await }
        })
        .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_message_not_modified_error(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ChannelOutbound for TelegramOutbound {
    async fn send_text(&self, to: &ReplyTarget, text: &str) -> ChannelResult<MessageRef> {
        let message = self
            .send_with_fallback(to, &render_message(text))
            .await
            .map_err(|e| ChannelError::external("telegram send message", e))?;
        debug!(chat_id = to.chat_id, message_id = message.id.0, "telegram message sent");
        Ok(MessageRef {
            chat_id: message.chat.id.0,
            message_id: message.id.0,
        })
    }

    async fn edit_text(&self, message: &MessageRef, text: &str) -> ChannelResult<()> {
        self.edit_with_fallback(message, &render_message(text))
            .await
            .map_err(|e| ChannelError::external("telegram edit message", e))
    }

    async fn send_typing(&self, chat_id: i64) -> ChannelResult<()> {
        self.bot
            .send_chat_action(ChatId(chat_id), ChatAction::Typing)
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::external("telegram chat action", e))
    }
}

/// Run a request, sleeping through `RetryAfter` responses up to
/// [`TELEGRAM_RETRY_AFTER_MAX_RETRIES`] times. Other errors return at once.
async fn with_retry<T, F, Fut>(
    chat_id: i64,
    operation: &'static str,
    mut request: F,
) -> Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let mut retries = 0usize;

    loop {
        let err = match request().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        let Some(wait) = retry_after_duration(&err) else {
            return Err(err);
        };

        if retries >= TELEGRAM_RETRY_AFTER_MAX_RETRIES {
            warn!(
                chat_id,
                operation,
                retries,
                retry_after_secs = wait.as_secs(),
                "telegram rate limit persisted after retries"
            );
            return Err(err);
        }

        retries += 1;
        warn!(
            chat_id,
            operation,
            retries,
            max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
            retry_after_secs = wait.as_secs(),
            "telegram rate limited, waiting before retry"
        );
        tokio::time::sleep(wait).await;
    }
}

fn reply_parameters(to: &ReplyTarget) -> Option<ReplyParameters> {
    to.reply_to
        .map(|id| ReplyParameters::new(MessageId(id)).allow_sending_without_reply())
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}

fn is_message_not_modified_error(error: &RequestError) -> bool {
    matches!(error, RequestError::Api(ApiError::MessageNotModified))
}

//! Edit-in-place streaming of a response into one outbound message.

use std::{pin::pin, sync::Arc, time::Duration};

use {
    futures::{Stream, StreamExt},
    parley_common::types::{Fragment, MessageRef, ReplyTarget},
    tokio::time::{Instant, sleep_until},
    tracing::{debug, warn},
};

use crate::{error::Result, plugin::ChannelOutbound};

/// Text shown in the outbound message until the first edit.
pub const DEFAULT_PLACEHOLDER: &str = "…";

/// How the relayed response ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Completed,
    Failed(String),
}

/// Summary of one relayed response.
#[derive(Debug, Clone)]
pub struct RelayReport {
    pub message: MessageRef,
    pub outcome: RelayOutcome,
    /// Text written by the terminal edit.
    pub final_text: String,
    /// Edit calls issued, including the terminal one.
    pub edits: usize,
    pub failed_edits: usize,
    pub final_edit_ok: bool,
}

/// Drives throttled edits of a single placeholder message from a fragment
/// stream.
///
/// Intermediate edits are issued only when the accumulated text changed and
/// at least `min_interval` passed since the previous edit. The terminal
/// fragment is flushed immediately. A failed response replaces the text with
/// `Error: <details>` rather than appending to the partial output.
pub struct StreamRelay {
    outbound: Arc<dyn ChannelOutbound>,
    min_interval: Duration,
    placeholder: String,
}

impl StreamRelay {
    pub fn new(outbound: Arc<dyn ChannelOutbound>, min_interval: Duration) -> Self {
        Self {
            outbound,
            min_interval,
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
        }
    }

    #[must_use]
    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Relay `fragments` into a new message sent to `to`.
    ///
    /// The stream is always consumed up to its terminal fragment, even when
    /// the placeholder cannot be created; in that case the send error is
    /// returned afterwards.
    pub async fn relay<S>(&self, to: &ReplyTarget, fragments: S) -> Result<RelayReport>
    where
        S: Stream<Item = Fragment> + Send,
    {
        let mut fragments = pin!(fragments);

        let message = match self.outbound.send_text(to, &self.placeholder).await {
            Ok(message) => message,
            Err(e) => {
                warn!(chat_id = to.chat_id, error = %e, "could not create placeholder, discarding response");
                while let Some(fragment) = fragments.next().await {
                    if fragment.is_terminal() {
                        break;
                    }
                }
                return Err(e);
            },
        };

        let mut accumulated = String::new();
        let mut shown = self.placeholder.clone();
        let mut last_edit = Instant::now();
        let mut edits = 0;
        let mut failed_edits = 0;

        let outcome = loop {
            let dirty = !accumulated.is_empty() && accumulated != shown;
            // an interval too large to schedule leaves only the terminal edit
            let deadline = if dirty {
                last_edit.checked_add(self.min_interval)
            } else {
                None
            };
            let next = match deadline {
                Some(deadline) => tokio::select! {
                    fragment = fragments.next() => Some(fragment),
                    () = sleep_until(deadline) => None,
                },
                None => Some(fragments.next().await),
            };

            match next {
                // throttle window elapsed with unsent text
                None => {
                    last_edit = Instant::now();
                    edits += 1;
                    match self.outbound.edit_text(&message, &accumulated).await {
                        Ok(()) => shown.clone_from(&accumulated),
                        Err(e) => {
                            failed_edits += 1;
                            warn!(
                                chat_id = message.chat_id,
                                message_id = message.message_id,
                                error = %e,
                                "intermediate edit failed, retrying at next tick"
                            );
                        },
                    }
                },
                Some(Some(Fragment::Delta(delta))) => accumulated.push_str(&delta),
                Some(Some(Fragment::Done)) => break RelayOutcome::Completed,
                Some(Some(Fragment::Error(error))) => break RelayOutcome::Failed(error),
                Some(None) => break RelayOutcome::Failed("response ended unexpectedly".into()),
            }
        };

        let final_text = match &outcome {
            RelayOutcome::Completed => accumulated,
            RelayOutcome::Failed(error) => format!("Error: {error}"),
        };
        edits += 1;
        let final_edit_ok = match self.outbound.edit_text(&message, &final_text).await {
            Ok(()) => true,
            Err(e) => {
                failed_edits += 1;
                warn!(
                    chat_id = message.chat_id,
                    message_id = message.message_id,
                    error = %e,
                    "final edit failed"
                );
                false
            },
        };

        debug!(
            chat_id = message.chat_id,
            message_id = message.message_id,
            edits,
            failed_edits,
            completed = outcome == RelayOutcome::Completed,
            "relay finished"
        );

        Ok(RelayReport {
            message,
            outcome,
            final_text,
            edits,
            failed_edits,
            final_edit_ok,
        })
    }
}

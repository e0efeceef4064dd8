//! ChatGPT web conversation backend.
//!
//! A browser session token is exchanged for a short-lived access token at
//! `{base}/api/auth/session`; turns are posted to
//! `{base}/backend-api/conversation`, which answers with an SSE stream of
//! cumulative message snapshots.

use std::time::Duration;

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    futures::StreamExt,
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    tokio::{sync::Mutex, time::timeout},
    tracing::{debug, info, trace, warn},
};

use crate::{
    error::{Error, Result},
    model::{ConversationBackend, TurnRequest, UpstreamEvent, UpstreamStream},
    providers::sse_data,
};

pub const DEFAULT_MODEL: &str = "text-davinci-002-render-sha";

const SESSION_COOKIE: &str = "__Secure-next-auth.session-token";
const USER_AGENT: &str = concat!("parley/", env!("CARGO_PKG_VERSION"));
/// Access tokens are refreshed this many seconds before they expire.
const EXPIRY_SKEW_SECS: i64 = 60;
/// Longest silence tolerated between two chunks of a streamed reply.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

struct AccessToken {
    token: Secret<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now + chrono::Duration::seconds(EXPIRY_SKEW_SECS) < expires_at,
            None => true,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    access_token: Option<String>,
    expires: Option<String>,
}

pub struct ChatGptBackend {
    base_url: String,
    model: String,
    session_token: Secret<String>,
    client: reqwest::Client,
    idle_timeout: Duration,
    access: Mutex<Option<AccessToken>>,
}

impl ChatGptBackend {
    pub fn new(base_url: impl Into<String>, session_token: Secret<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: DEFAULT_MODEL.to_string(),
            session_token,
            client,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            access: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Fail a streamed reply when no data arrives for `idle_timeout`.
    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// A valid access token, exchanging the session token when the cached
    /// one is missing or about to expire.
    async fn access_token(&self) -> Result<Secret<String>> {
        let mut cached = self.access.lock().await;
        if let Some(access) = cached.as_ref()
            && access.is_fresh(Utc::now())
        {
            return Ok(access.token.clone());
        }

        let access = self.exchange_session_token().await?;
        let token = access.token.clone();
        *cached = Some(access);
        Ok(token)
    }

    async fn exchange_session_token(&self) -> Result<AccessToken> {
        debug!(base_url = %self.base_url, "exchanging session token");
        let resp = self
            .client
            .get(format!("{}/api/auth/session", self.base_url))
            .header(
                reqwest::header::COOKIE,
                format!("{SESSION_COOKIE}={}", self.session_token.expose_secret()),
            )
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::CredentialExchange(format!(
                "session endpoint returned HTTP {}",
                status.as_u16()
            )));
        }

        let session: SessionResponse = resp.json().await?;
        let token = session
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::CredentialExchange("session token was not accepted".into()))?;
        let expires_at = session.expires.as_deref().and_then(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| warn!(expires = raw, error = %e, "unparseable access token expiry"))
                .ok()
        });
        info!(expires_at = ?expires_at, "access token refreshed");

        Ok(AccessToken {
            token: Secret::new(token),
            expires_at,
        })
    }

    async fn forget_access_token(&self) {
        *self.access.lock().await = None;
    }

    fn request_body(&self, request: &TurnRequest) -> serde_json::Value {
        let parent = request
            .continuation
            .as_ref()
            .map(|c| c.last_turn_id.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut body = serde_json::json!({
            "action": "next",
            "messages": [{
                "id": uuid::Uuid::new_v4().to_string(),
                "role": "user",
                "content": {
                    "content_type": "text",
                    "parts": [request.text],
                },
            }],
            "model": self.model,
            "parent_message_id": parent,
        });
        if let Some(continuation) = &request.continuation {
            body["conversation_id"] = serde_json::Value::String(continuation.conversation_id.clone());
        }
        body
    }
}

#[async_trait]
impl ConversationBackend for ChatGptBackend {
    fn name(&self) -> &str {
        "chatgpt"
    }

    async fn converse(&self, request: TurnRequest) -> Result<UpstreamStream> {
        let access_token = self.access_token().await?;
        let body = self.request_body(&request);
        trace!(body = %body, "conversation request body");

        let send = self
            .client
            .post(format!("{}/backend-api/conversation", self.base_url))
            .bearer_auth(access_token.expose_secret())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body)
            .send();
        let resp = timeout(self.idle_timeout, send)
            .await
            .map_err(|_| Error::Timeout(self.idle_timeout))??;

        let status = resp.status();
        if !status.is_success() {
            if status == reqwest::StatusCode::UNAUTHORIZED {
                self.forget_access_token().await;
            }
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }

        let idle_timeout = self.idle_timeout;
        Ok(Box::pin(async_stream::stream! {
            let mut byte_stream = resp.bytes_stream();
            let mut buf: Vec<u8> = Vec::new();
            let mut state = TurnState::default();

            loop {
                let chunk = match timeout(idle_timeout, byte_stream.next()).await {
                    Ok(Some(Ok(c))) => c,
                    Ok(Some(Err(e))) => {
                        yield UpstreamEvent::Failed(e.to_string());
                        return;
                    },
                    Ok(None) => break,
                    Err(_) => {
                        warn!(?idle_timeout, "upstream stalled mid-response");
                        yield UpstreamEvent::Failed(format!("no data from upstream for {idle_timeout:?}"));
                        return;
                    },
                };
                buf.extend_from_slice(&chunk);

                while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = buf.drain(..=pos).collect();
                    match process_sse_line(&String::from_utf8_lossy(&raw), &mut state) {
                        LineOutcome::Skip => {},
                        LineOutcome::Delta(delta) => {
                            yield UpstreamEvent::Delta(delta);
                        },
                        LineOutcome::Finished(event) => {
                            yield event;
                            return;
                        },
                    }
                }
            }

            // the server may close without a trailing newline or [DONE]
            if !buf.is_empty() {
                match process_sse_line(&String::from_utf8_lossy(&buf), &mut state) {
                    LineOutcome::Skip => {},
                    LineOutcome::Delta(delta) => {
                        yield UpstreamEvent::Delta(delta);
                    },
                    LineOutcome::Finished(event) => {
                        yield event;
                        return;
                    },
                }
            }

            yield state.finish();
        }))
    }
}

/// What has been seen so far in one streamed turn.
#[derive(Debug, Default)]
struct TurnState {
    /// Text already forwarded as deltas.
    emitted: String,
    conversation_id: Option<String>,
    message_id: Option<String>,
}

impl TurnState {
    /// Terminal event for a stream that ended (by `[DONE]` or EOF).
    fn finish(&mut self) -> UpstreamEvent {
        match (self.conversation_id.take(), self.message_id.take()) {
            (Some(conversation_id), Some(turn_id)) => UpstreamEvent::Completed {
                conversation_id,
                turn_id,
            },
            _ => UpstreamEvent::Failed("response ended before the conversation was identified".into()),
        }
    }

    /// Convert a cumulative snapshot into the newly appended suffix.
    fn delta_from(&mut self, snapshot: &str) -> Option<String> {
        if snapshot.len() <= self.emitted.len() {
            return None;
        }
        match snapshot.strip_prefix(self.emitted.as_str()) {
            Some(suffix) => {
                let suffix = suffix.to_string();
                self.emitted = snapshot.to_string();
                Some(suffix)
            },
            None => {
                // rewritten text cannot be retracted from the chat; follow the
                // new snapshot from here on
                debug!("upstream rewrote earlier text, skipping snapshot");
                self.emitted = snapshot.to_string();
                None
            },
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum LineOutcome {
    Skip,
    Delta(String),
    Finished(UpstreamEvent),
}

fn process_sse_line(line: &str, state: &mut TurnState) -> LineOutcome {
    let line = line.trim();
    let Some(data) = sse_data(line) else {
        return LineOutcome::Skip;
    };
    if data == "[DONE]" {
        return LineOutcome::Finished(state.finish());
    }

    let Ok(evt) = serde_json::from_str::<serde_json::Value>(data) else {
        trace!(data, "skipping non-JSON SSE payload");
        return LineOutcome::Skip;
    };

    if let Some(error) = evt.get("error").filter(|e| !e.is_null()) {
        let message = error
            .as_str()
            .map(str::to_string)
            .or_else(|| error["message"].as_str().map(str::to_string))
            .unwrap_or_else(|| error.to_string());
        return LineOutcome::Finished(UpstreamEvent::Failed(message));
    }

    if let Some(conversation_id) = evt["conversation_id"].as_str() {
        state.conversation_id = Some(conversation_id.to_string());
    }

    let message = &evt["message"];
    if message.is_null() {
        return LineOutcome::Skip;
    }
    let role = message["author"]["role"].as_str().unwrap_or("assistant");
    if role != "assistant" {
        return LineOutcome::Skip;
    }
    if let Some(id) = message["id"].as_str() {
        state.message_id = Some(id.to_string());
    }

    match message["content"]["parts"][0]
        .as_str()
        .and_then(|snapshot| state.delta_from(snapshot))
    {
        Some(delta) => LineOutcome::Delta(delta),
        None => LineOutcome::Skip,
    }
}

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use {
    futures::StreamExt,
    parley_common::types::{ChatId, Fragment},
    tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, oneshot},
    tracing::{debug, info, warn},
};

use crate::{
    error::Result,
    model::{ConversationBackend, FragmentStream, TurnRequest, UpstreamEvent, UpstreamStream},
    session::ConversationSession,
};

type SessionHandle = Arc<AsyncMutex<ConversationSession>>;

struct ChatEntry {
    session: SessionHandle,
    /// Released when the most recently issued ticket is dropped.
    tail: Option<oneshot::Receiver<()>>,
}

/// A reserved place in one chat's queue.
///
/// Tickets are issued synchronously, in the order messages arrive, so work
/// for the same chat keeps that order even when it runs on separate tasks
/// with their own network round-trips before touching the session. The
/// place is given up when the ticket is dropped.
pub struct ChatTicket {
    chat_id: ChatId,
    ahead: Option<oneshot::Receiver<()>>,
    _release: oneshot::Sender<()>,
}

impl ChatTicket {
    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    /// Wait until every ticket issued earlier for this chat was dropped.
    pub async fn ready(&mut self) {
        if let Some(ahead) = self.ahead.take() {
            // an error only means the earlier holder is gone, which is the signal
            let _ = ahead.await;
        }
    }
}

/// One upstream session plus the per-chat conversations it serves.
///
/// Each chat's [`ConversationSession`] sits behind its own async lock. A
/// send holds that lock until its fragment stream reaches a terminal
/// element (or is dropped), so a second send or a reset for the same chat
/// queues behind it while other chats proceed independently.
pub struct Agent {
    slot: usize,
    backend: Arc<dyn ConversationBackend>,
    conversations: Mutex<HashMap<ChatId, ChatEntry>>,
}

impl Agent {
    pub fn new(slot: usize, backend: Arc<dyn ConversationBackend>) -> Self {
        Self {
            slot,
            backend,
            conversations: Mutex::new(HashMap::new()),
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    fn with_entry<T>(&self, chat_id: ChatId, f: impl FnOnce(&mut ChatEntry) -> T) -> T {
        let mut map = self
            .conversations
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let entry = map.entry(chat_id).or_insert_with(|| ChatEntry {
            session: Arc::new(AsyncMutex::new(ConversationSession::new(chat_id))),
            tail: None,
        });
        f(entry)
    }

    fn session(&self, chat_id: ChatId) -> SessionHandle {
        self.with_entry(chat_id, |entry| Arc::clone(&entry.session))
    }

    /// Take the next place in `chat_id`'s queue without waiting.
    ///
    /// Callers that hand same-chat work to separate tasks take a ticket on
    /// the ordered path first and [`ChatTicket::ready`] it inside the task.
    pub fn enqueue(&self, chat_id: ChatId) -> ChatTicket {
        let (release, next) = oneshot::channel();
        let ahead = self.with_entry(chat_id, |entry| entry.tail.replace(next));
        ChatTicket {
            chat_id,
            ahead,
            _release: release,
        }
    }

    /// Whether a send is currently streaming for this chat.
    pub fn is_busy(&self, chat_id: ChatId) -> bool {
        let handle = {
            let map = self
                .conversations
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            map.get(&chat_id).map(|entry| Arc::clone(&entry.session))
        };
        handle.is_some_and(|h| h.try_lock().is_err())
    }

    /// Send `text` on behalf of `chat_id` and stream the reply.
    ///
    /// Waits for any in-flight send or reset on the same chat first. The
    /// session's ids are updated once, when the upstream reports
    /// completion; a failed or abandoned turn leaves them untouched.
    pub async fn send(&self, text: &str, chat_id: ChatId) -> Result<FragmentStream> {
        let handle = self.session(chat_id);
        if handle.try_lock().is_err() {
            debug!(slot = self.slot, chat_id, "chat busy, queueing send");
        }
        let session = handle.lock_owned().await;

        let request = TurnRequest {
            text: text.to_string(),
            continuation: session.continuation().cloned(),
        };
        debug!(
            slot = self.slot,
            chat_id,
            continuing = request.continuation.is_some(),
            "sending turn upstream"
        );

        let upstream = self.backend.converse(request).await?;
        Ok(Box::pin(track_turn(self.slot, session, upstream)))
    }

    /// Forget the upstream conversation for a chat.
    ///
    /// Queues behind an in-flight send for the same chat. Returns whether a
    /// conversation was active.
    pub async fn reset(&self, chat_id: ChatId) -> bool {
        let handle = self.session(chat_id);
        let mut session = handle.lock().await;
        let had_conversation = session.reset();
        info!(slot = self.slot, chat_id, had_conversation, "conversation reset");
        had_conversation
    }

    /// Copy of a chat's session, waiting for any in-flight send.
    pub async fn session_snapshot(&self, chat_id: ChatId) -> ConversationSession {
        self.session(chat_id).lock().await.clone()
    }

    /// Number of chats this agent has seen.
    pub fn conversation_count(&self) -> usize {
        self.conversations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

/// Forward upstream events as fragments, writing the session exactly once
/// when the turn completes and guaranteeing a single terminal fragment.
fn track_turn(
    slot: usize,
    mut session: OwnedMutexGuard<ConversationSession>,
    mut upstream: UpstreamStream,
) -> impl futures::Stream<Item = Fragment> + Send {
    async_stream::stream! {
        while let Some(event) = upstream.next().await {
            match event {
                UpstreamEvent::Delta(delta) => {
                    if !delta.is_empty() {
                        yield Fragment::Delta(delta);
                    }
                },
                UpstreamEvent::Completed { conversation_id, turn_id } => {
                    debug!(
                        slot,
                        chat_id = session.chat_id(),
                        conversation_id = %conversation_id,
                        "turn completed"
                    );
                    session.record_turn(conversation_id, turn_id);
                    drop(session);
                    yield Fragment::Done;
                    return;
                },
                UpstreamEvent::Failed(error) => {
                    warn!(slot, chat_id = session.chat_id(), %error, "turn failed");
                    drop(session);
                    yield Fragment::Error(error);
                    return;
                },
            }
        }
        warn!(slot, chat_id = session.chat_id(), "upstream ended without a final event");
        drop(session);
        yield Fragment::Error("upstream ended without a final response".into());
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{error::Error, session::Continuation},
        async_trait::async_trait,
        std::{collections::VecDeque, time::Duration},
        tokio::sync::oneshot,
    };

    enum Script {
        Reply(Vec<UpstreamEvent>),
        Reject(u16),
        /// Emit one delta, then wait for the signal before completing.
        Held(oneshot::Receiver<()>),
    }

    #[derive(Default)]
    struct ScriptedBackend {
        scripts: Mutex<VecDeque<Script>>,
        requests: Mutex<Vec<TurnRequest>>,
    }

    impl ScriptedBackend {
        fn push(&self, script: Script) {
            self.scripts.lock().unwrap().push_back(script);
        }

        fn requests(&self) -> Vec<TurnRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ConversationBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn converse(&self, request: TurnRequest) -> Result<UpstreamStream> {
            let n = {
                let mut reqs = self.requests.lock().unwrap();
                reqs.push(request);
                reqs.len()
            };
            let script = self.scripts.lock().unwrap().pop_front().expect("no script left");
            match script {
                Script::Reply(events) => Ok(Box::pin(futures::stream::iter(events))),
                Script::Reject(status) => Err(Error::Status {
                    status,
                    body: "nope".into(),
                }),
                Script::Held(rx) => Ok(Box::pin(async_stream::stream! {
                    yield UpstreamEvent::Delta("partial".into());
                    let _ = rx.await;
                    yield UpstreamEvent::Completed {
                        conversation_id: format!("held-conv-{n}"),
                        turn_id: format!("held-turn-{n}"),
                    };
                })),
            }
        }
    }

    fn completed(conv: &str, turn: &str) -> UpstreamEvent {
        UpstreamEvent::Completed {
            conversation_id: conv.into(),
            turn_id: turn.into(),
        }
    }

    async fn drain(stream: FragmentStream) -> Vec<Fragment> {
        stream.collect().await
    }

    #[tokio::test]
    async fn successful_turn_records_both_ids() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push(Script::Reply(vec![
            UpstreamEvent::Delta("Hel".into()),
            UpstreamEvent::Delta("lo!".into()),
            completed("c1", "t1"),
        ]));
        let agent = Agent::new(0, backend.clone());

        let fragments = drain(agent.send("hi", 7).await.unwrap()).await;
        assert_eq!(fragments, vec![
            Fragment::Delta("Hel".into()),
            Fragment::Delta("lo!".into()),
            Fragment::Done,
        ]);

        let session = agent.session_snapshot(7).await;
        assert_eq!(session.conversation_id(), Some("c1"));
        assert_eq!(session.last_turn_id(), Some("t1"));
        assert!(backend.requests()[0].continuation.is_none());
    }

    #[tokio::test]
    async fn second_turn_continues_and_reset_starts_fresh() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push(Script::Reply(vec![completed("c1", "t1")]));
        backend.push(Script::Reply(vec![completed("c1", "t2")]));
        backend.push(Script::Reply(vec![completed("c2", "t3")]));
        let agent = Agent::new(0, backend.clone());

        drain(agent.send("one", 7).await.unwrap()).await;
        drain(agent.send("two", 7).await.unwrap()).await;
        assert!(agent.reset(7).await);
        let after_reset = agent.session_snapshot(7).await;
        assert!(after_reset.conversation_id().is_none());
        assert!(after_reset.last_turn_id().is_none());

        drain(agent.send("three", 7).await.unwrap()).await;

        let reqs = backend.requests();
        assert_eq!(reqs[1].continuation, Some(Continuation {
            conversation_id: "c1".into(),
            last_turn_id: "t1".into(),
        }));
        assert!(reqs[2].continuation.is_none());
        assert_eq!(agent.session_snapshot(7).await.conversation_id(), Some("c2"));
    }

    #[tokio::test]
    async fn failed_turn_keeps_previous_ids() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push(Script::Reply(vec![completed("c1", "t1")]));
        backend.push(Script::Reply(vec![
            UpstreamEvent::Delta("par".into()),
            UpstreamEvent::Failed("connection reset".into()),
        ]));
        let agent = Agent::new(0, backend);

        drain(agent.send("one", 7).await.unwrap()).await;
        let fragments = drain(agent.send("two", 7).await.unwrap()).await;
        assert_eq!(fragments.last(), Some(&Fragment::Error("connection reset".into())));

        let session = agent.session_snapshot(7).await;
        assert_eq!(session.conversation_id(), Some("c1"));
        assert_eq!(session.last_turn_id(), Some("t1"));
    }

    #[tokio::test]
    async fn stream_without_final_event_ends_in_error() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push(Script::Reply(vec![UpstreamEvent::Delta("dangling".into())]));
        let agent = Agent::new(0, backend);

        let fragments = drain(agent.send("hi", 1).await.unwrap()).await;
        assert_eq!(fragments.len(), 2);
        assert!(matches!(fragments[1], Fragment::Error(_)));
        assert!(agent.session_snapshot(1).await.continuation().is_none());
    }

    #[tokio::test]
    async fn rejected_send_leaves_session_and_lock_free() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push(Script::Reject(401));
        let agent = Agent::new(0, backend);

        let err = agent.send("hi", 3).await.err().expect("send should fail");
        assert!(matches!(err, Error::Status { status: 401, .. }));
        assert!(!agent.is_busy(3));
        assert!(agent.session_snapshot(3).await.continuation().is_none());
    }

    #[tokio::test]
    async fn same_chat_sends_are_serialized() {
        let backend = Arc::new(ScriptedBackend::default());
        let (release, held) = oneshot::channel();
        backend.push(Script::Held(held));
        backend.push(Script::Reply(vec![completed("c2", "t2")]));
        let agent = Arc::new(Agent::new(0, backend.clone()));

        let mut first = agent.send("one", 9).await.unwrap();
        assert_eq!(first.next().await, Some(Fragment::Delta("partial".into())));
        assert!(agent.is_busy(9));

        let queued = {
            let agent = Arc::clone(&agent);
            tokio::spawn(async move { drain(agent.send("two", 9).await.unwrap()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!queued.is_finished(), "second send must wait for the first");
        assert_eq!(backend.requests().len(), 1);

        release.send(()).unwrap();
        assert_eq!(first.next().await, Some(Fragment::Done));
        assert!(first.next().await.is_none());

        queued.await.unwrap();
        let reqs = backend.requests();
        assert_eq!(
            reqs[1].continuation.as_ref().map(|c| c.conversation_id.as_str()),
            Some("held-conv-1")
        );
    }

    #[tokio::test]
    async fn different_chats_do_not_contend() {
        let backend = Arc::new(ScriptedBackend::default());
        let (_release, held) = oneshot::channel::<()>();
        backend.push(Script::Held(held));
        backend.push(Script::Reply(vec![completed("c", "t")]));
        let agent = Agent::new(0, backend);

        let mut first = agent.send("one", 1).await.unwrap();
        first.next().await;

        let other = tokio::time::timeout(Duration::from_secs(1), async {
            drain(agent.send("two", 2).await.unwrap()).await
        })
        .await
        .expect("other chat must not block");
        assert_eq!(other, vec![Fragment::Done]);
        assert_eq!(agent.conversation_count(), 2);
    }

    #[tokio::test]
    async fn tickets_release_in_issue_order() {
        let agent = Agent::new(0, Arc::new(ScriptedBackend::default()));
        let first = agent.enqueue(6);
        let mut second = agent.enqueue(6);
        let mut third = agent.enqueue(6);
        let mut elsewhere = agent.enqueue(7);

        tokio::time::timeout(Duration::from_secs(1), elsewhere.ready())
            .await
            .expect("other chat has its own queue");

        let waiting = tokio::spawn(async move {
            third.ready().await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), second.ready())
            .await
            .expect("second is next once the first is dropped");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished(), "third waits for second");

        drop(second);
        tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn reset_waits_for_streaming_turn() {
        let backend = Arc::new(ScriptedBackend::default());
        let (release, held) = oneshot::channel();
        backend.push(Script::Held(held));
        let agent = Arc::new(Agent::new(0, backend));

        let mut stream = agent.send("one", 4).await.unwrap();
        stream.next().await;

        let reset = {
            let agent = Arc::clone(&agent);
            tokio::spawn(async move { agent.reset(4).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!reset.is_finished());

        release.send(()).unwrap();
        while stream.next().await.is_some() {}

        // the reset ran after the turn completed, so it cleared real ids
        assert!(reset.await.unwrap());
        assert!(agent.session_snapshot(4).await.continuation().is_none());
    }

    #[tokio::test]
    async fn dropping_stream_releases_chat() {
        let backend = Arc::new(ScriptedBackend::default());
        let (_release, held) = oneshot::channel::<()>();
        backend.push(Script::Held(held));
        let agent = Agent::new(0, backend);

        let mut stream = agent.send("one", 5).await.unwrap();
        stream.next().await;
        assert!(agent.is_busy(5));
        drop(stream);
        assert!(!agent.is_busy(5));
        assert!(agent.session_snapshot(5).await.continuation().is_none());
    }
}

//! SessionMultiplexer - bidirectional collaboration sessions

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{
    CloseReason, CollabMessage, ContractError, MessageKind, SessionConfig, SessionInfo,
    SYSTEM_SENDER,
};
use stream_channel::{
    channel, CancellationToken, Delivery, StreamReceiver, StreamSender, Ticker,
};
use tokio::sync::oneshot;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, instrument, warn};

use crate::actor::{Command, SessionView};
use crate::error::SessionError;
use crate::mailbox::Mailbox;
use crate::registry::{Registry, SessionHandle};

/// Attempts to reach a live session actor on join
const JOIN_ATTEMPTS: usize = 3;

/// Outbound stream buffer; the mailbox does the real queueing
const OUTBOUND_CAPACITY: usize = 1;

struct Inner {
    config: SessionConfig,
    registry: Arc<Registry>,
    shutdown: CancellationToken,
    participants: AtomicUsize,
}

/// Routes messages between the participants of named sessions
///
/// Cheap to clone; all clones share one registry.
#[derive(Clone)]
pub struct SessionMultiplexer {
    inner: Arc<Inner>,
}

impl SessionMultiplexer {
    pub fn new(config: SessionConfig, shutdown: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                registry: Arc::new(Registry::default()),
                shutdown,
                participants: AtomicUsize::new(0),
            }),
        }
    }

    /// Join `session_id` as `participant_id`
    ///
    /// `inbound` carries the participant's messages; the returned stream
    /// carries everything routed to it. The session is created on first join.
    #[instrument(name = "session_join", skip(self, inbound))]
    pub async fn join(
        &self,
        session_id: &str,
        participant_id: &str,
        inbound: StreamReceiver<CollabMessage>,
    ) -> Result<StreamReceiver<CollabMessage>, SessionError> {
        if session_id.trim().is_empty() {
            return Err(ContractError::validation("session id must not be empty").into());
        }
        if participant_id.trim().is_empty() || participant_id == SYSTEM_SENDER {
            return Err(ContractError::validation(format!(
                "invalid participant id '{participant_id}'"
            ))
            .into());
        }

        let mailbox = Arc::new(Mailbox::new(self.inner.config.mailbox_capacity));
        let handle = self.register(session_id, participant_id, &mailbox).await?;

        let (out_tx, out_rx) = channel(OUTBOUND_CAPACITY, Delivery::Reliable);
        tokio::spawn(pump(Arc::clone(&mailbox), out_tx.clone()));

        let active = self.inner.participants.fetch_add(1, Ordering::Relaxed) + 1;
        observability::record_session_join(active);

        let participant = Participant {
            session_id: session_id.to_string(),
            participant_id: participant_id.to_string(),
            handle,
            mailbox,
            inbound,
            outbound: out_tx,
        };
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let reason = participant.run(&inner).await;
            inner.participants.fetch_sub(1, Ordering::Relaxed);
            observability::record_session_leave(&reason);
        });

        Ok(out_rx)
    }

    async fn register(
        &self,
        session_id: &str,
        participant_id: &str,
        mailbox: &Arc<Mailbox>,
    ) -> Result<SessionHandle, SessionError> {
        let config = &self.inner.config;
        for attempt in 1..=JOIN_ATTEMPTS {
            let handle = self.inner.registry.get_or_spawn(
                session_id,
                config.history_capacity,
                config.replay_history,
            );

            let (reply, response) = oneshot::channel();
            let command = Command::Join {
                participant_id: participant_id.to_string(),
                mailbox: Arc::clone(mailbox),
                reply,
            };

            // 发送失败或应答丢失：actor 正在退出，换新会话重试
            if handle.commands.send(command).await.is_err() {
                debug!(attempt, "session actor gone, retrying join");
                continue;
            }
            match response.await {
                Ok(Ok(())) => return Ok(handle),
                Ok(Err(SessionError::SessionClosed { .. })) | Err(_) => {
                    debug!(attempt, "session closed during join, retrying");
                }
                Ok(Err(e)) => return Err(e),
            }
        }
        Err(SessionError::closed(session_id))
    }

    /// Participants and session id, or None if the session does not exist
    pub async fn session_info(&self, session_id: &str) -> Option<SessionInfo> {
        self.inspect(session_id).await.map(|view| view.info)
    }

    /// Recent chat history of a session (oldest first)
    pub async fn history(&self, session_id: &str) -> Vec<CollabMessage> {
        self.inspect(session_id)
            .await
            .map(|view| view.history)
            .unwrap_or_default()
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Number of connected participants across all sessions
    pub fn participant_count(&self) -> usize {
        self.inner.participants.load(Ordering::Relaxed)
    }

    async fn inspect(&self, session_id: &str) -> Option<SessionView> {
        let handle = self.inner.registry.get(session_id)?;
        let (reply, response) = oneshot::channel();
        handle.commands.send(Command::Inspect { reply }).await.ok()?;
        response.await.ok()
    }
}

/// Mailbox -> outbound stream
async fn pump(mailbox: Arc<Mailbox>, out: StreamSender<CollabMessage>) {
    while let Some(message) = mailbox.pop().await {
        if out.send(message).await.is_err() {
            break;
        }
    }
    mailbox.close();
}

/// One connected participant
struct Participant {
    session_id: String,
    participant_id: String,
    handle: SessionHandle,
    mailbox: Arc<Mailbox>,
    inbound: StreamReceiver<CollabMessage>,
    outbound: StreamSender<CollabMessage>,
}

impl Participant {
    /// Inbound loop: liveness, heartbeats and chat routing
    async fn run(self, inner: &Inner) -> CloseReason {
        let timeout = Duration::from_millis(inner.config.session_timeout_ms);
        let mut deadline = Instant::now() + timeout;
        let mut heartbeat =
            Ticker::delayed(Duration::from_millis(inner.config.heartbeat_interval_ms));

        let reason = loop {
            tokio::select! {
                biased;
                _ = inner.shutdown.cancelled() => break CloseReason::Shutdown,
                reason = self.outbound.closed() => break reason,
                _ = sleep_until(deadline) => break CloseReason::Timeout,
                _ = heartbeat.tick() => {
                    self.mailbox
                        .push_lossy(CollabMessage::heartbeat(&self.session_id, SYSTEM_SENDER));
                }
                received = self.inbound.recv() => {
                    let message = match received {
                        Ok(message) => message,
                        Err(end) => break end.reason,
                    };
                    deadline = Instant::now() + timeout;

                    match message.kind {
                        MessageKind::Chat => {
                            // 收件人背压期间仍要响应关闭与超时
                            tokio::select! {
                                biased;
                                _ = inner.shutdown.cancelled() => break CloseReason::Shutdown,
                                reason = self.outbound.closed() => break reason,
                                _ = sleep_until(deadline) => break CloseReason::Timeout,
                                _ = self.route_chat(message) => {}
                            }
                        }
                        MessageKind::Heartbeat => {}
                        MessageKind::System => {
                            debug!(participant = %self.participant_id, "ignoring client system message");
                        }
                    }
                }
            }
        };

        self.leave(reason.clone()).await;
        reason
    }

    /// Stamp, record and deliver one chat message to everyone else
    async fn route_chat(&self, mut message: CollabMessage) {
        message.sender_id = self.participant_id.clone();
        message.session_id = self.session_id.clone();

        let (reply, response) = oneshot::channel();
        let command = Command::Chat {
            message: message.clone(),
            reply,
        };
        if self.handle.commands.send(command).await.is_err() {
            return;
        }
        let Ok(recipients) = response.await else {
            return;
        };

        for mailbox in recipients {
            // A recipient that left meanwhile has a closed mailbox
            let _ = mailbox.push_chat(message.clone()).await;
        }
    }

    async fn leave(self, reason: CloseReason) {
        let command = Command::Leave {
            participant_id: self.participant_id.clone(),
            reason: reason.clone(),
        };
        if self.handle.commands.send(command).await.is_err() {
            warn!(session = %self.session_id, "session actor gone before leave");
        }

        self.mailbox.close();
        self.outbound.close(reason.clone());
        self.inbound.close(reason.clone());

        info!(
            session = %self.session_id,
            participant = %self.participant_id,
            reason = %reason,
            "participant stream closed"
        );
    }
}

//! Session actor - single writer of one session's participants and history

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use contracts::{CloseReason, CollabMessage, SessionInfo};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::SessionError;
use crate::mailbox::Mailbox;
use crate::registry::Registry;

/// Commands processed by the session actor, in arrival order
pub(crate) enum Command {
    Join {
        participant_id: String,
        mailbox: Arc<Mailbox>,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Leave {
        participant_id: String,
        reason: CloseReason,
    },
    /// Record a chat message; replies with the mailboxes of everyone else
    Chat {
        message: CollabMessage,
        reply: oneshot::Sender<Vec<Arc<Mailbox>>>,
    },
    Inspect {
        reply: oneshot::Sender<SessionView>,
    },
}

/// Read-only copy of session state
#[derive(Debug, Clone)]
pub(crate) struct SessionView {
    pub info: SessionInfo,
    pub history: Vec<CollabMessage>,
}

pub(crate) struct SessionActor {
    session_id: String,
    generation: u64,
    participants: BTreeMap<String, Arc<Mailbox>>,
    history: VecDeque<CollabMessage>,
    history_capacity: usize,
    replay_history: bool,
    /// 无成员时最多等待的时长
    empty_grace: Duration,
    registry: Arc<Registry>,
}

impl SessionActor {
    pub fn new(
        session_id: String,
        generation: u64,
        history_capacity: usize,
        replay_history: bool,
        empty_grace: Duration,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            session_id,
            generation,
            participants: BTreeMap::new(),
            history: VecDeque::with_capacity(history_capacity),
            history_capacity,
            replay_history,
            empty_grace,
            registry,
        }
    }

    /// Run until the last participant leaves, or no one joins within the grace period
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        debug!(session = %self.session_id, "session created");

        loop {
            let next = if self.participants.is_empty() {
                match timeout(self.empty_grace, commands.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        debug!(session = %self.session_id, "no participant joined");
                        break;
                    }
                }
            } else {
                commands.recv().await
            };
            let Some(command) = next else {
                break;
            };

            match command {
                Command::Join {
                    participant_id,
                    mailbox,
                    reply,
                } => {
                    let _ = reply.send(self.join(participant_id, mailbox));
                }
                Command::Leave {
                    participant_id,
                    reason,
                } => {
                    self.leave(&participant_id, &reason);
                    if self.participants.is_empty() {
                        break;
                    }
                }
                Command::Chat { message, reply } => {
                    let _ = reply.send(self.chat(message));
                }
                Command::Inspect { reply } => {
                    let _ = reply.send(self.view());
                }
            }
        }

        // 先从注册表摘除，之后到达的 join 会创建新的会话
        self.registry.remove(&self.session_id, self.generation);
        commands.close();
        while let Ok(command) = commands.try_recv() {
            match command {
                Command::Join { reply, .. } => {
                    let _ = reply.send(Err(SessionError::closed(&self.session_id)));
                }
                Command::Inspect { reply } => {
                    let _ = reply.send(self.view());
                }
                // Chat reply dropped: sender finds no recipients
                Command::Chat { .. } | Command::Leave { .. } => {}
            }
        }

        info!(session = %self.session_id, "session destroyed");
    }

    fn join(&mut self, participant_id: String, mailbox: Arc<Mailbox>) -> Result<(), SessionError> {
        if self.participants.contains_key(&participant_id) {
            return Err(SessionError::duplicate(&self.session_id, participant_id));
        }

        if self.replay_history {
            mailbox.preload(self.history.iter().cloned());
        }

        let notice = CollabMessage::system(
            &self.session_id,
            format!("{participant_id} joined"),
        );
        self.broadcast_notice(&notice);

        self.participants.insert(participant_id.clone(), mailbox);
        info!(
            session = %self.session_id,
            participant = %participant_id,
            participants = self.participants.len(),
            "participant joined"
        );
        Ok(())
    }

    fn leave(&mut self, participant_id: &str, reason: &CloseReason) {
        let Some(mailbox) = self.participants.remove(participant_id) else {
            return;
        };
        mailbox.close();

        let notice = CollabMessage::system(
            &self.session_id,
            format!("{participant_id} left ({reason})"),
        );
        self.broadcast_notice(&notice);

        info!(
            session = %self.session_id,
            participant = %participant_id,
            reason = %reason,
            participants = self.participants.len(),
            "participant left"
        );
    }

    fn chat(&mut self, message: CollabMessage) -> Vec<Arc<Mailbox>> {
        let recipients = self
            .participants
            .iter()
            .filter(|(id, _)| **id != message.sender_id)
            .map(|(_, mailbox)| Arc::clone(mailbox))
            .collect();

        if self.history_capacity > 0 {
            if self.history.len() == self.history_capacity {
                self.history.pop_front();
            }
            self.history.push_back(message);
        }
        recipients
    }

    fn broadcast_notice(&self, notice: &CollabMessage) {
        for mailbox in self.participants.values() {
            mailbox.push_lossy(notice.clone());
        }
    }

    fn view(&self) -> SessionView {
        SessionView {
            info: SessionInfo {
                session_id: self.session_id.clone(),
                participants: self.participants.keys().cloned().collect(),
            },
            history: self.history.iter().cloned().collect(),
        }
    }
}

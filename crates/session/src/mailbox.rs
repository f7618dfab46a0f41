//! Mailbox - 每个参与者的出站队列
//!
//! 容量有界，两种入队策略：
//! - 非聊天消息（system / heartbeat）永不阻塞：满时淘汰最旧的非聊天消息；
//!   若队列里只剩聊天消息，则丢弃新到的这条
//! - 聊天消息永不丢弃：满时先淘汰最旧的非聊天消息；
//!   队列全是聊天消息时由推送方等待空位（背压传回发送者）

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use contracts::CollabMessage;
use tokio::sync::Notify;

/// 非阻塞入队的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// 直接入队
    Queued,
    /// 入队，并淘汰了最旧的一条非聊天消息
    EvictedOldest,
    /// 队列只剩聊天消息，新消息被丢弃
    DroppedIncoming,
    /// 邮箱已关闭
    Closed,
}

/// 邮箱已关闭
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxClosed;

struct State {
    queue: VecDeque<CollabMessage>,
    closed: bool,
}

/// 参与者出站邮箱
pub struct Mailbox {
    state: Mutex<State>,
    capacity: usize,
    /// 唤醒消费者
    items: Notify,
    /// 唤醒等待空位的聊天推送方
    space: Notify,
}

impl Mailbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(capacity.max(1)),
                closed: false,
            }),
            capacity: capacity.max(1),
            items: Notify::new(),
            space: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// 非阻塞入队，用于 system / heartbeat
    pub fn push_lossy(&self, message: CollabMessage) -> PushOutcome {
        let outcome = {
            let mut state = self.lock();
            if state.closed {
                return PushOutcome::Closed;
            }

            if state.queue.len() < self.capacity {
                state.queue.push_back(message);
                PushOutcome::Queued
            } else if let Some(pos) = state.queue.iter().position(|m| !m.is_chat()) {
                state.queue.remove(pos);
                state.queue.push_back(message);
                PushOutcome::EvictedOldest
            } else {
                PushOutcome::DroppedIncoming
            }
        };

        match outcome {
            PushOutcome::Queued => self.items.notify_one(),
            PushOutcome::EvictedOldest => {
                observability::record_mailbox_drop();
                self.items.notify_one();
            }
            PushOutcome::DroppedIncoming => observability::record_mailbox_drop(),
            PushOutcome::Closed => {}
        }
        outcome
    }

    /// 聊天消息入队
    ///
    /// 满时淘汰最旧的非聊天消息；队列全是聊天消息时等待空位。
    pub async fn push_chat(&self, message: CollabMessage) -> Result<(), MailboxClosed> {
        loop {
            // 先注册等待，再检查状态，避免错过 pop 的唤醒
            let space = self.space.notified();
            {
                let mut state = self.lock();
                if state.closed {
                    return Err(MailboxClosed);
                }

                let evicted = if state.queue.len() < self.capacity {
                    Some(false)
                } else {
                    let oldest_notice = state.queue.iter().position(|m| !m.is_chat());
                    oldest_notice.map(|pos| state.queue.remove(pos).is_some())
                };

                if let Some(evicted) = evicted {
                    state.queue.push_back(message);
                    drop(state);
                    if evicted {
                        observability::record_mailbox_drop();
                    }
                    self.items.notify_one();
                    return Ok(());
                }
            }
            space.await;
        }
    }

    /// 新成员入会时预装历史消息，不受容量限制
    pub fn preload(&self, history: impl IntoIterator<Item = CollabMessage>) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.queue.extend(history);
        drop(state);
        self.items.notify_one();
    }

    /// 取出下一条；关闭且排空后返回 None
    pub async fn pop(&self) -> Option<CollabMessage> {
        loop {
            let items = self.items.notified();
            {
                let mut state = self.lock();
                if let Some(message) = state.queue.pop_front() {
                    drop(state);
                    self.space.notify_waiters();
                    return Some(message);
                }
                if state.closed {
                    return None;
                }
            }
            items.await;
        }
    }

    /// 关闭邮箱，唤醒所有等待方
    pub fn close(&self) {
        self.lock().closed = true;
        self.items.notify_waiters();
        self.items.notify_one();
        self.space.notify_waiters();
    }
}

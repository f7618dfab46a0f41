//! 会话注册表：session_id -> 会话 actor 的命令入口

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::actor::{Command, SessionActor};

/// actor 命令队列长度
const COMMAND_QUEUE: usize = 64;

/// 新建会话等待首个成员的时间，超时即销毁
const EMPTY_SESSION_GRACE: Duration = Duration::from_secs(5);

/// 会话 actor 句柄
#[derive(Clone)]
pub(crate) struct SessionHandle {
    pub generation: u64,
    pub commands: mpsc::Sender<Command>,
}

/// 会话注册表
///
/// 只保存句柄；会话状态由各自的 actor 独占。
pub(crate) struct Registry {
    sessions: Mutex<HashMap<String, SessionHandle>>,
    next_generation: AtomicU64,
    empty_grace: Duration,
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_empty_grace(EMPTY_SESSION_GRACE)
    }
}

impl Registry {
    pub fn with_empty_grace(empty_grace: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            empty_grace,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 取得会话句柄；不存在时创建并启动 actor
    pub fn get_or_spawn(
        self: &Arc<Self>,
        session_id: &str,
        history_capacity: usize,
        replay_history: bool,
    ) -> SessionHandle {
        let mut sessions = self.lock();
        if let Some(handle) = sessions.get(session_id) {
            return handle.clone();
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        let actor = SessionActor::new(
            session_id.to_string(),
            generation,
            history_capacity,
            replay_history,
            self.empty_grace,
            Arc::clone(self),
        );
        tokio::spawn(actor.run(rx));

        let handle = SessionHandle {
            generation,
            commands: tx,
        };
        sessions.insert(session_id.to_string(), handle.clone());
        observability::record_sessions_active(sessions.len());
        handle
    }

    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.lock().get(session_id).cloned()
    }

    /// 摘除会话；仅当登记的仍是同一代 actor
    pub fn remove(&self, session_id: &str, generation: u64) {
        let mut sessions = self.lock();
        if sessions
            .get(session_id)
            .is_some_and(|h| h.generation == generation)
        {
            sessions.remove(session_id);
        }
        observability::record_sessions_active(sessions.len());
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }
}

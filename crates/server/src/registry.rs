//! ConnectionRegistry - 连接表
//!
//! 每条打开的流登记一项：种类、对端地址、打开时间和收发计数。
//! `on_open` 返回 RAII 守卫，守卫析构即 `on_close`。

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use contracts::ContractError;
use serde::Serialize;
use tracing::debug;

/// 流种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Ingest,
    Snapshots,
    Session,
    Alerts,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Snapshots => "snapshots",
            Self::Session => "session",
            Self::Alerts => "alerts",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 连接标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// 单条连接的收发计数
#[derive(Debug, Default)]
pub struct ConnectionCounters {
    inbound: AtomicU64,
    outbound: AtomicU64,
}

impl ConnectionCounters {
    pub fn inbound(&self) -> u64 {
        self.inbound.load(Ordering::Relaxed)
    }

    pub fn outbound(&self) -> u64 {
        self.outbound.load(Ordering::Relaxed)
    }
}

/// 连接的只读视图
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub kind: StreamKind,
    pub peer: Option<SocketAddr>,
    pub opened_at: DateTime<Utc>,
    pub messages_in: u64,
    pub messages_out: u64,
}

struct Entry {
    kind: StreamKind,
    peer: Option<SocketAddr>,
    opened_at: DateTime<Utc>,
    counters: Arc<ConnectionCounters>,
}

/// 连接表
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, Entry>>,
    next_id: AtomicU64,
    max_connections: usize,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            max_connections,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, Entry>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 登记一条新连接；超过上限返回 `ResourceExhausted`
    pub fn on_open(
        self: &Arc<Self>,
        kind: StreamKind,
        peer: Option<SocketAddr>,
    ) -> Result<ConnectionGuard, ContractError> {
        let mut connections = self.lock();
        if connections.len() >= self.max_connections {
            return Err(ContractError::resource_exhausted(
                "connections",
                format!("connection limit of {} reached", self.max_connections),
            ));
        }

        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let counters = Arc::new(ConnectionCounters::default());
        connections.insert(
            id,
            Entry {
                kind,
                peer,
                opened_at: Utc::now(),
                counters: Arc::clone(&counters),
            },
        );
        let active = connections.len();
        drop(connections);

        observability::record_connection_opened(kind.as_str(), active);
        debug!(connection = %id, kind = %kind, peer = ?peer, "connection opened");

        Ok(ConnectionGuard {
            id,
            kind,
            counters,
            registry: Arc::clone(self),
        })
    }

    fn on_close(&self, id: ConnectionId, kind: StreamKind) {
        let active = {
            let mut connections = self.lock();
            connections.remove(&id);
            connections.len()
        };
        observability::record_connection_closed(kind.as_str(), active);
        debug!(connection = %id, kind = %kind, "connection closed");
    }

    /// 当前连接数
    pub fn active(&self) -> usize {
        self.lock().len()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// 按种类统计
    pub fn count_by_kind(&self) -> BTreeMap<StreamKind, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.lock().values() {
            *counts.entry(entry.kind).or_insert(0) += 1;
        }
        counts
    }

    /// 所有连接，按 id 排序
    pub fn list(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<ConnectionInfo> = self
            .lock()
            .iter()
            .map(|(id, entry)| ConnectionInfo {
                id: *id,
                kind: entry.kind,
                peer: entry.peer,
                opened_at: entry.opened_at,
                messages_in: entry.counters.inbound(),
                messages_out: entry.counters.outbound(),
            })
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }
}

/// 连接守卫，析构时从连接表移除
pub struct ConnectionGuard {
    id: ConnectionId,
    kind: StreamKind,
    counters: Arc<ConnectionCounters>,
    registry: Arc<ConnectionRegistry>,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn record_inbound(&self) {
        self.counters.inbound.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outbound(&self) {
        self.counters.outbound.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counters(&self) -> &ConnectionCounters {
        &self.counters
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.on_close(self.id, self.kind);
    }
}

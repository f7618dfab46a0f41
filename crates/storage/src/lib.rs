//! # Storage
//!
//! 外部协作方的参考实现。
//!
//! 负责：
//! - `MemoryStore`: 内存时序存储 (去重 + 保留上限)
//! - `BroadcastBus`: 进程内广播事件总线
//! - `FileArchive` + `ArchiveHandle`: 归档写入，独立队列隔离慢写

pub mod archive;
pub mod bus;
pub mod handle;
pub mod memory;
pub mod metrics;

pub use archive::FileArchive;
pub use bus::{BroadcastBus, BroadcastReceiver};
pub use handle::ArchiveHandle;
pub use memory::MemoryStore;
pub use metrics::{ArchiveMetrics, ArchiveMetricsSnapshot};

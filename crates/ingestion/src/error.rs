//! Ingestion 拒绝原因
//!
//! Display 文本即写入 `IngestResult.errors` 的字符串。

use thiserror::Error;

/// 记录或批次被拒绝的原因
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    /// 批次记录数超过 max_batch_size，整批拒绝
    #[error("batch exceeds max_batch_size")]
    OversizedBatch,

    /// 值不是有限数字
    #[error("invalid value")]
    InvalidValue,

    /// 时间戳晚于 now + max_clock_skew_ms
    #[error("timestamp in the future")]
    FutureTimestamp,

    /// 指标名不合法
    #[error("invalid metric name")]
    InvalidMetricName,

    /// 重试后存储仍写入失败，分区剩余记录被拒绝
    #[error("store write failed for '{metric_name}': {message}")]
    StoreFailure {
        /// 指标名
        metric_name: String,
        /// 底层错误
        message: String,
    },
}

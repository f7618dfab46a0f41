//! 流服务指标收集模块
//!
//! 各服务在关键路径上调用 `record_*`，未安装 recorder 时为空操作。

use contracts::{CloseReason, IngestResult};
use metrics::{counter, gauge, histogram};

/// 记录一次 ingestion 调用结束
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_ingest_call;
///
/// let result = handler.ingest(inbound).await;
/// record_ingest_call(&result, started.elapsed().as_secs_f64() * 1000.0);
/// ```
pub fn record_ingest_call(result: &IngestResult, elapsed_ms: f64) {
    counter!("streamgate_ingest_calls_total").increment(1);
    counter!("streamgate_ingest_batches_total").increment(result.batches_received);
    counter!("streamgate_records_accepted_total").increment(result.accepted_count);
    counter!("streamgate_records_rejected_total").increment(result.rejected_count);

    if result.duplicate_count > 0 {
        counter!("streamgate_records_duplicate_total").increment(result.duplicate_count);
    }

    histogram!("streamgate_ingest_call_duration_ms").record(elapsed_ms);
}

/// 记录整批拒绝 (超出 max_batch_size)
pub fn record_batch_rejected(records: usize) {
    counter!("streamgate_batches_rejected_total").increment(1);
    histogram!("streamgate_rejected_batch_size").record(records as f64);
}

/// 记录存储写入重试
pub fn record_store_retry(metric_name: &str, recovered: bool) {
    let status = if recovered { "recovered" } else { "failed" };
    counter!(
        "streamgate_store_retries_total",
        "metric" => metric_name.to_string(),
        "status" => status
    )
    .increment(1);
}

/// 记录派生事件发布
pub fn record_event_derived(severity: &str, published: bool) {
    let status = if published { "published" } else { "failed" };
    counter!(
        "streamgate_events_derived_total",
        "severity" => severity.to_string(),
        "status" => status
    )
    .increment(1);
}

/// 记录快照推送
pub fn record_snapshot_sent(values: usize) {
    counter!("streamgate_snapshots_sent_total").increment(1);
    histogram!("streamgate_snapshot_values").record(values as f64);
}

/// 记录跳过的快照 tick (查询失败)
pub fn record_snapshot_tick_skipped() {
    counter!("streamgate_snapshot_ticks_skipped_total").increment(1);
}

/// 记录会话加入
pub fn record_session_join(active_sessions: usize) {
    counter!("streamgate_session_joins_total").increment(1);
    gauge!("streamgate_sessions_active").set(active_sessions as f64);
}

/// 记录会话离开
pub fn record_session_leave(reason: &CloseReason) {
    counter!(
        "streamgate_session_leaves_total",
        "reason" => close_label(reason)
    )
    .increment(1);
}

/// 记录会话销毁后的活跃数
pub fn record_sessions_active(active_sessions: usize) {
    gauge!("streamgate_sessions_active").set(active_sessions as f64);
}

/// 记录 mailbox 丢弃的非 chat 消息
pub fn record_mailbox_drop() {
    counter!("streamgate_mailbox_dropped_total").increment(1);
}

/// 记录告警投递
pub fn record_alert_delivered() {
    counter!("streamgate_alerts_delivered_total").increment(1);
}

/// 记录告警订阅者落后丢失的事件
pub fn record_alert_lagged(missed: u64) {
    counter!("streamgate_alerts_lagged_total").increment(missed);
}

/// 记录告警订阅者数量
pub fn record_alert_subscribers(active: usize) {
    gauge!("streamgate_alert_subscribers_active").set(active as f64);
}

/// 记录连接建立
pub fn record_connection_opened(kind: &str, active: usize) {
    counter!(
        "streamgate_connections_opened_total",
        "kind" => kind.to_string()
    )
    .increment(1);
    gauge!("streamgate_connections_active").set(active as f64);
}

/// 记录连接关闭
pub fn record_connection_closed(kind: &str, active: usize) {
    counter!(
        "streamgate_connections_closed_total",
        "kind" => kind.to_string()
    )
    .increment(1);
    gauge!("streamgate_connections_active").set(active as f64);
}

fn close_label(reason: &CloseReason) -> &'static str {
    match reason {
        CloseReason::Completed => "completed",
        CloseReason::Cancelled => "cancelled",
        CloseReason::PeerGone => "peer_gone",
        CloseReason::Timeout => "timeout",
        CloseReason::Shutdown => "shutdown",
        CloseReason::Rejected(_) => "rejected",
        CloseReason::Error(_) => "error",
    }
}

/// Ingestion 统计聚合器
///
/// 在内存中聚合每次调用的 IngestResult，便于输出摘要。
#[derive(Debug, Clone, Default)]
pub struct IngestStatsAggregator {
    /// 调用次数
    pub total_calls: u64,

    /// 批次总数
    pub total_batches: u64,

    /// 接受记录数
    pub total_accepted: u64,

    /// 拒绝记录数
    pub total_rejected: u64,

    /// 重复记录数
    pub total_duplicates: u64,

    /// 调用耗时统计 (毫秒)
    pub latency_ms: RunningStats,
}

impl IngestStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, result: &IngestResult, elapsed_ms: f64) {
        self.total_calls += 1;
        self.total_batches += result.batches_received;
        self.total_accepted += result.accepted_count;
        self.total_rejected += result.rejected_count;
        self.total_duplicates += result.duplicate_count;
        self.latency_ms.push(elapsed_ms);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> IngestSummary {
        let total_records = self.total_accepted + self.total_rejected + self.total_duplicates;
        IngestSummary {
            total_calls: self.total_calls,
            total_batches: self.total_batches,
            total_accepted: self.total_accepted,
            total_rejected: self.total_rejected,
            total_duplicates: self.total_duplicates,
            reject_rate: if total_records > 0 {
                self.total_rejected as f64 / total_records as f64 * 100.0
            } else {
                0.0
            },
            call_latency_ms: StatsSummary::from(&self.latency_ms),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Ingestion 摘要
#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    pub total_calls: u64,
    pub total_batches: u64,
    pub total_accepted: u64,
    pub total_rejected: u64,
    pub total_duplicates: u64,
    pub reject_rate: f64,
    pub call_latency_ms: StatsSummary,
}

impl std::fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Ingestion Summary ===")?;
        writeln!(f, "Calls: {}", self.total_calls)?;
        writeln!(f, "Batches: {}", self.total_batches)?;
        writeln!(f, "Accepted records: {}", self.total_accepted)?;
        writeln!(
            f,
            "Rejected records: {} ({:.2}%)",
            self.total_rejected, self.reject_rate
        )?;
        writeln!(f, "Duplicate records: {}", self.total_duplicates)?;
        writeln!(f, "Call latency (ms): {}", self.call_latency_ms)?;
        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

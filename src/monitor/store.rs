//! 检测结果存储
//!
//! 线程安全、只追加的时间序列存储，按 (目标, 请求配置) 分组，
//! 同时维护每个目标的最新状态视图。
//!
//! 并发保证：
//! - 所有写入在同一把写锁下完成，单个序列的写入不会交错
//! - 读取返回拥有所有权的副本，读者不会看到写了一半的记录
//! - `remove` 与同一目标上正在进行的 `append` 竞争时按最后写入者生效：
//!   晚到的写入会重新创建该目标的条目，但状态始终完整

use crate::monitor::result::{CheckResult, LatencyPoint, LatestStatus, SeriesStats};
use crate::monitor::target::Target;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// 更新通知通道容量
const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// 存储选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// 每个 (目标, 请求配置) 序列保留的最大结果数，`None` 表示不限制
    pub max_series_len: Option<usize>,
}

/// 单个目标的存储条目
#[derive(Debug, Default)]
struct TargetEntry {
    /// 按请求配置分组的结果序列
    series: HashMap<String, VecDeque<CheckResult>>,
    /// 每个请求配置的最新结果
    latest: LatestStatus,
}

/// 检测结果存储
#[derive(Debug)]
pub struct ResultStore {
    /// 目标条目
    entries: RwLock<HashMap<Target, TargetEntry>>,
    /// 存储选项
    options: StoreOptions,
    /// 结果更新广播
    updates: broadcast::Sender<CheckResult>,
}

impl ResultStore {
    /// 创建新的结果存储
    pub fn new(options: StoreOptions) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            entries: RwLock::new(HashMap::new()),
            options,
            updates,
        }
    }

    /// 存储选项
    pub fn options(&self) -> StoreOptions {
        self.options
    }

    /// 追加检测结果
    ///
    /// 序列按时间戳保持有序：如果结果比序列尾部更早（并发写入者
    /// 获取锁的顺序与完成顺序不同），会插入到对应位置。
    pub async fn append(&self, result: CheckResult) {
        {
            let mut entries = self.entries.write().await;
            let entry = entries.entry(result.target.clone()).or_default();

            let is_newest = entry
                .latest
                .get(&result.profile)
                .is_none_or(|previous| previous.timestamp <= result.timestamp);
            if is_newest {
                entry.latest.insert(result.profile.clone(), result.clone());
            }

            let series = entry.series.entry(result.profile.clone()).or_default();
            let position = series
                .iter()
                .rposition(|existing| existing.timestamp <= result.timestamp)
                .map_or(0, |index| index + 1);
            series.insert(position, result.clone());

            if let Some(max_len) = self.options.max_series_len {
                while series.len() > max_len {
                    series.pop_front();
                }
            }
        }

        // 没有订阅者时发送失败，忽略即可
        let _ = self.updates.send(result);
    }

    /// 订阅结果更新，每条结果在写入可见之后推送
    pub fn subscribe(&self) -> broadcast::Receiver<CheckResult> {
        self.updates.subscribe()
    }

    /// 获取目标的最新状态（每个请求配置一条）
    pub async fn snapshot(&self, target: &str) -> Option<LatestStatus> {
        let entries = self.entries.read().await;
        entries.get(target).map(|entry| entry.latest.clone())
    }

    /// 获取所有目标的最新状态
    pub async fn snapshot_all(&self) -> BTreeMap<Target, LatestStatus> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .map(|(target, entry)| (target.clone(), entry.latest.clone()))
            .collect()
    }

    /// 获取 (目标, 请求配置) 的结果序列，按时间顺序
    pub async fn series(&self, target: &str, profile: &str) -> Vec<CheckResult> {
        let entries = self.entries.read().await;
        entries
            .get(target)
            .and_then(|entry| entry.series.get(profile))
            .map(|series| series.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// 获取用于图表的 (时间戳, 延迟) 序列
    pub async fn latency_series(&self, target: &str, profile: &str) -> Vec<LatencyPoint> {
        let entries = self.entries.read().await;
        entries
            .get(target)
            .and_then(|entry| entry.series.get(profile))
            .map(|series| series.iter().map(LatencyPoint::from).collect())
            .unwrap_or_default()
    }

    /// 获取序列统计信息
    pub async fn stats(&self, target: &str, profile: &str) -> SeriesStats {
        let entries = self.entries.read().await;
        entries
            .get(target)
            .and_then(|entry| entry.series.get(profile))
            .map(|series| SeriesStats::from_series(series.iter()))
            .unwrap_or_default()
    }

    /// 序列长度
    pub async fn series_len(&self, target: &str, profile: &str) -> usize {
        let entries = self.entries.read().await;
        entries
            .get(target)
            .and_then(|entry| entry.series.get(profile))
            .map_or(0, VecDeque::len)
    }

    /// 有结果的目标列表
    pub async fn targets(&self) -> Vec<Target> {
        let entries = self.entries.read().await;
        let mut targets: Vec<Target> = entries.keys().cloned().collect();
        targets.sort();
        targets
    }

    /// 删除目标的所有序列和最新状态
    pub async fn remove(&self, target: &str) -> bool {
        let mut entries = self.entries.write().await;
        let removed = entries.remove(target).is_some();
        if removed {
            debug!("已清除目标的检测结果: {}", target);
        }
        removed
    }
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new(StoreOptions::default())
    }
}

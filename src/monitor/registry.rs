//! 监控注册表
//!
//! 维护 目标 -> 监控任务句柄 的映射，是生命周期操作的并发安全边界。
//! `start`/`stop`/`stop_all`/`reconcile` 在同一把互斥锁下修改映射，
//! 因此同一目标任何时刻最多只有一个运行中的监控任务。

use crate::config::types::{validate_config, Config};
use crate::error::{ConfigError, Result};
use crate::monitor::profile::Profile;
use crate::monitor::prober::HttpProber;
use crate::monitor::result::CheckResult;
use crate::monitor::store::{ResultStore, StoreOptions};
use crate::monitor::target::Target;
use crate::monitor::target_monitor::{
    MonitorHandle, MonitorState, ProbeContext, TargetMonitor, DEFAULT_CHECK_INTERVAL,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// 目标列表变更结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// 新启动的目标
    pub started: Vec<Target>,
    /// 被移除的目标
    pub removed: Vec<Target>,
}

impl ReconcileReport {
    /// 是否没有任何变化
    pub fn is_empty(&self) -> bool {
        self.started.is_empty() && self.removed.is_empty()
    }
}

/// 注册表状态
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStatus {
    /// 运行中的监控任务数量
    pub active_targets: usize,
    /// 默认检测间隔（秒）
    pub default_interval_seconds: u64,
    /// 请求配置名称
    pub profiles: Vec<String>,
    /// 状态生成时间
    pub generated_at: DateTime<Utc>,
}

/// 监控注册表
pub struct MonitorRegistry {
    /// 运行中的监控任务
    monitors: Mutex<HashMap<Target, MonitorHandle>>,
    /// 探测上下文
    context: Arc<ProbeContext>,
    /// 默认检测间隔
    default_interval: Duration,
}

impl MonitorRegistry {
    /// 创建新的监控注册表
    ///
    /// # 参数
    /// * `context` - 探测上下文
    /// * `default_interval` - 默认检测间隔，为0时使用 `DEFAULT_CHECK_INTERVAL`
    pub fn new(context: Arc<ProbeContext>, default_interval: Duration) -> Self {
        let default_interval = if default_interval.is_zero() {
            warn!("默认检测间隔为0，使用 {}秒", DEFAULT_CHECK_INTERVAL.as_secs());
            DEFAULT_CHECK_INTERVAL
        } else {
            default_interval
        };
        Self {
            monitors: Mutex::new(HashMap::new()),
            context,
            default_interval,
        }
    }

    /// 根据配置创建注册表
    ///
    /// 配置验证失败（例如非法请求头、间隔为0）会在这里返回错误，此时没有任何监控任务启动
    pub fn from_config(config: &Config) -> Result<Self> {
        validate_config(config).map_err(ConfigError::ValidationError)?;
        let profiles = Profile::from_configs(&config.profiles)?;
        let prober = HttpProber::new(config.monitor.request_timeout())?;
        let store = ResultStore::new(StoreOptions {
            max_series_len: config.monitor.max_series_len,
        });
        let context = ProbeContext::new(Arc::new(prober), Arc::new(store), profiles);

        Ok(Self::new(
            Arc::new(context),
            config.monitor.check_interval(),
        ))
    }

    /// 结果存储
    pub fn store(&self) -> &Arc<ResultStore> {
        self.context.store()
    }

    /// 请求配置列表
    pub fn profiles(&self) -> &[Profile] {
        self.context.profiles()
    }

    /// 默认检测间隔
    pub fn default_interval(&self) -> Duration {
        self.default_interval
    }

    /// 以默认间隔开始监控目标，已在监控中时不做任何操作
    ///
    /// # 返回
    /// * `bool` - 是否新启动了监控任务
    pub async fn start(&self, target: Target) -> bool {
        self.start_with_interval(target, self.default_interval).await
    }

    /// 以指定间隔开始监控目标，间隔为0时拒绝启动
    pub async fn start_with_interval(&self, target: Target, interval: Duration) -> bool {
        if interval.is_zero() {
            warn!("拒绝以0间隔监控目标: {}", target);
            return false;
        }
        let mut monitors = self.monitors.lock().await;
        Self::start_locked(&mut monitors, &self.context, target, interval)
    }

    /// 开始监控多个目标
    ///
    /// # 返回
    /// * `usize` - 新启动的监控任务数量
    pub async fn start_all(&self, targets: impl IntoIterator<Item = Target>) -> usize {
        let mut monitors = self.monitors.lock().await;
        targets
            .into_iter()
            .filter(|target| {
                Self::start_locked(
                    &mut monitors,
                    &self.context,
                    target.clone(),
                    self.default_interval,
                )
            })
            .count()
    }

    fn start_locked(
        monitors: &mut HashMap<Target, MonitorHandle>,
        context: &Arc<ProbeContext>,
        target: Target,
        interval: Duration,
    ) -> bool {
        if let Some(existing) = monitors.get(&target) {
            if existing.state() == MonitorState::Running {
                debug!("目标已在监控中: {}", target);
                return false;
            }
            // 任务已意外退出，替换为新任务
            debug!("替换已退出的监控任务: {}", target);
        }

        let handle = TargetMonitor::new(target.clone(), interval, Arc::clone(context)).spawn();
        monitors.insert(target, handle);
        true
    }

    /// 停止监控目标，未在监控中时不做任何操作
    ///
    /// 已有结果保留在存储中，使用 `remove` 同时清除结果
    pub async fn stop(&self, target: &str) -> bool {
        let mut monitors = self.monitors.lock().await;
        match monitors.remove(target) {
            // 在持锁期间发出停止信号，之后的 start 不会与旧任务并存
            Some(handle) => {
                handle.stop();
                true
            }
            None => false,
        }
    }

    /// 停止所有监控任务
    ///
    /// # 返回
    /// * `usize` - 停止的任务数量
    pub async fn stop_all(&self) -> usize {
        let handles = self.drain_and_stop().await;
        handles.len()
    }

    /// 停止所有监控任务并等待它们退出
    ///
    /// 正在进行的检测会完成并写入结果，等待时间以请求超时为上限
    pub async fn shutdown(&self) {
        let handles = self.drain_and_stop().await;
        let count = handles.len();
        futures::future::join_all(handles.into_iter().map(MonitorHandle::join)).await;
        info!("所有监控任务已退出，共 {} 个", count);
    }

    async fn drain_and_stop(&self) -> Vec<MonitorHandle> {
        let mut monitors = self.monitors.lock().await;
        let handles: Vec<MonitorHandle> = monitors.drain().map(|(_, handle)| handle).collect();
        for handle in &handles {
            handle.stop();
        }
        handles
    }

    /// 停止监控目标并清除它的所有结果
    pub async fn remove(&self, target: &str) -> bool {
        let stopped = self.stop(target).await;
        let purged = self.store().remove(target).await;
        stopped || purged
    }

    /// 应用新的目标列表：启动新增目标，移除不再出现的目标
    pub async fn reconcile(&self, targets: impl IntoIterator<Item = Target>) -> ReconcileReport {
        let wanted: BTreeSet<Target> = targets.into_iter().collect();
        let mut report = ReconcileReport::default();

        {
            let mut monitors = self.monitors.lock().await;

            let stale: Vec<Target> = monitors
                .keys()
                .filter(|target| !wanted.contains(*target))
                .cloned()
                .collect();
            for handle in stale.iter().filter_map(|target| monitors.remove(target)) {
                handle.stop();
            }

            for target in &wanted {
                if Self::start_locked(
                    &mut monitors,
                    &self.context,
                    target.clone(),
                    self.default_interval,
                ) {
                    report.started.push(target.clone());
                }
            }

            report.removed = stale;
        }

        for target in &report.removed {
            self.store().remove(target.as_str()).await;
        }

        if !report.is_empty() {
            info!(
                "目标列表已更新: 新增 {} 个, 移除 {} 个",
                report.started.len(),
                report.removed.len()
            );
        }
        report
    }

    /// 当前监控中的目标
    pub async fn active_targets(&self) -> BTreeSet<Target> {
        let monitors = self.monitors.lock().await;
        monitors.keys().cloned().collect()
    }

    /// 目标是否在监控中
    pub async fn is_active(&self, target: &str) -> bool {
        let monitors = self.monitors.lock().await;
        monitors.contains_key(target)
    }

    /// 立即对目标执行一次检测，不经过调度
    ///
    /// 返回时每个目标的每个请求配置都已写入一条结果
    pub async fn check_now(&self, targets: &[Target]) -> Vec<CheckResult> {
        info!("立即检测 {} 个目标", targets.len());
        let checks = targets
            .iter()
            .map(|target| self.context.check_target(target));
        futures::future::join_all(checks)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// 注册表状态
    pub async fn status(&self) -> RegistryStatus {
        let monitors = self.monitors.lock().await;
        RegistryStatus {
            active_targets: monitors.len(),
            default_interval_seconds: self.default_interval.as_secs(),
            profiles: self
                .profiles()
                .iter()
                .map(|profile| profile.name.clone())
                .collect(),
            generated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::test_support::{context_with, target, FakeProber};
    use tokio::time::sleep;

    fn registry(prober: Arc<FakeProber>, interval: Duration) -> MonitorRegistry {
        MonitorRegistry::new(context_with(prober), interval)
    }

    #[tokio::test]
    async fn test_double_start_creates_one_monitor() {
        let prober = Arc::new(FakeProber::ok());
        let registry = registry(Arc::clone(&prober), Duration::from_secs(3600));

        assert!(registry.start(target("https://a.example")).await);
        assert!(!registry.start(target("https://a.example")).await);

        sleep(Duration::from_millis(100)).await;
        assert_eq!(registry.active_targets().await.len(), 1);
        // 一个任务的首次检测：两个请求配置各一次
        assert_eq!(prober.calls(), 2);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_concurrent_starts_create_one_monitor() {
        let prober = Arc::new(FakeProber::ok());
        let registry = Arc::new(registry(Arc::clone(&prober), Duration::from_secs(3600)));

        let starts: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.start(target("https://a.example")).await })
            })
            .collect();

        let mut created = 0;
        for start in starts {
            if start.await.unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 1);

        sleep(Duration::from_millis(100)).await;
        assert_eq!(prober.calls(), 2);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_twice_is_noop() {
        let registry = registry(Arc::new(FakeProber::ok()), Duration::from_secs(3600));
        registry.start(target("https://a.example")).await;

        assert!(registry.stop("https://a.example").await);
        assert!(!registry.stop("https://a.example").await);
        assert!(!registry.is_active("https://a.example").await);
        assert!(registry.active_targets().await.is_empty());
    }

    #[tokio::test]
    async fn test_stop_keeps_results_remove_purges() {
        let registry = registry(Arc::new(FakeProber::ok()), Duration::from_secs(3600));
        registry.start(target("https://a.example")).await;
        sleep(Duration::from_millis(100)).await;

        registry.stop("https://a.example").await;
        assert!(registry.store().snapshot("https://a.example").await.is_some());

        assert!(registry.remove("https://a.example").await);
        assert!(registry.store().snapshot("https://a.example").await.is_none());
        assert!(!registry.remove("https://a.example").await);
    }

    #[tokio::test]
    async fn test_start_all_and_stop_all() {
        let registry = registry(Arc::new(FakeProber::ok()), Duration::from_secs(3600));
        let started = registry
            .start_all(vec![
                target("https://a.example"),
                target("https://b.example"),
                target("https://a.example"),
            ])
            .await;
        assert_eq!(started, 2);
        assert_eq!(registry.status().await.active_targets, 2);

        assert_eq!(registry.stop_all().await, 2);
        assert_eq!(registry.stop_all().await, 0);
        assert!(registry.active_targets().await.is_empty());
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let prober = Arc::new(FakeProber::ok());
        let registry = registry(Arc::clone(&prober), Duration::from_secs(3600));

        registry.start(target("https://a.example")).await;
        sleep(Duration::from_millis(100)).await;
        registry.stop("https://a.example").await;
        assert!(registry.start(target("https://a.example")).await);

        sleep(Duration::from_millis(100)).await;
        assert_eq!(prober.calls(), 4);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_reconcile() {
        let registry = registry(Arc::new(FakeProber::ok()), Duration::from_secs(3600));
        registry
            .start_all(vec![target("https://a.example"), target("https://b.example")])
            .await;
        sleep(Duration::from_millis(100)).await;

        let report = registry
            .reconcile(vec![target("https://b.example"), target("https://c.example")])
            .await;
        assert_eq!(report.started, vec![target("https://c.example")]);
        assert_eq!(report.removed, vec![target("https://a.example")]);

        let active: Vec<_> = registry.active_targets().await.into_iter().collect();
        assert_eq!(
            active,
            vec![target("https://b.example"), target("https://c.example")]
        );
        assert!(registry.store().snapshot("https://a.example").await.is_none());

        let unchanged = registry
            .reconcile(vec![target("https://b.example"), target("https://c.example")])
            .await;
        assert!(unchanged.is_empty());
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_check_now_appends_one_result_per_profile() {
        let registry = registry(Arc::new(FakeProber::ok()), Duration::from_secs(3600));
        let targets = vec![target("https://a.example"), target("https://b.example")];

        let results = registry.check_now(&targets).await;
        assert_eq!(results.len(), 4);

        for target in &targets {
            let snapshot = registry.store().snapshot(target.as_str()).await.unwrap();
            assert_eq!(snapshot.len(), 2);
            assert_eq!(registry.store().series_len(target.as_str(), "Chrome").await, 1);
        }
        // 立即检测不会启动监控任务
        assert!(registry.active_targets().await.is_empty());
    }

    #[tokio::test]
    async fn test_status_lists_profiles() {
        let registry = registry(Arc::new(FakeProber::ok()), Duration::from_secs(300));
        let status = registry.status().await;
        assert_eq!(status.active_targets, 0);
        assert_eq!(status.default_interval_seconds, 300);
        assert_eq!(status.profiles, vec!["Chrome", "GoogleBot"]);
    }

    #[tokio::test]
    async fn test_zero_interval_never_leaves_dead_monitor() {
        let prober = Arc::new(FakeProber::ok());
        let registry = registry(Arc::clone(&prober), Duration::ZERO);
        assert_eq!(registry.default_interval(), DEFAULT_CHECK_INTERVAL);

        assert!(registry.start(target("https://a.example")).await);
        sleep(Duration::from_millis(200)).await;
        assert_eq!(prober.calls(), 2);

        // 显式的0间隔被拒绝，不会登记为活动目标
        assert!(
            !registry
                .start_with_interval(target("https://b.example"), Duration::ZERO)
                .await
        );
        assert!(!registry.is_active("https://b.example").await);
        assert_eq!(registry.active_targets().await.len(), 1);

        registry.shutdown().await;
    }

    #[test]
    fn test_from_config_rejects_zero_interval() {
        let mut config = Config::default();
        config.monitor.check_interval_seconds = 0;

        let err = match MonitorRegistry::from_config(&config) {
            Ok(_) => panic!("zero interval accepted"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("检测间隔"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_restart_under_contention_keeps_single_monitor() {
        let prober = Arc::new(FakeProber::ok());
        let registry = Arc::new(registry(Arc::clone(&prober), Duration::from_millis(100)));
        registry.start(target("https://a.example")).await;

        for _ in 0..10 {
            let stopper = Arc::clone(&registry);
            let starter = Arc::clone(&registry);
            let _ = tokio::join!(
                tokio::spawn(async move { stopper.stop("https://a.example").await }),
                tokio::spawn(async move { starter.start(target("https://a.example")).await }),
            );
        }
        registry.start(target("https://a.example")).await;
        assert_eq!(registry.active_targets().await.len(), 1);

        sleep(Duration::from_millis(30)).await;
        let before = prober.calls();
        sleep(Duration::from_millis(350)).await;
        let during = prober.calls() - before;

        // 单个监控任务在这段时间内最多 4 次检测，每次 2 个请求配置
        assert!(during <= 8, "{during} probes, more than one live monitor");

        registry.shutdown().await;
    }
}

//! 单目标监控任务
//!
//! 每个目标一个后台任务，按固定间隔对所有请求配置执行探测并写入结果存储。
//!
//! 状态机: `Running -> Stopped`。第一次检测在启动时立即执行，之后按间隔执行。
//! 停止是协作式的：停止信号在两次检测之间被观察到，正在进行的检测
//! 会继续完成并写入结果。

use crate::monitor::profile::Profile;
use crate::monitor::prober::Prober;
use crate::monitor::result::CheckResult;
use crate::monitor::store::ResultStore;
use crate::monitor::target::Target;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// 默认检测间隔（5分钟）
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(300);

/// 探测上下文，所有监控任务共享
pub struct ProbeContext {
    /// 探测器
    prober: Arc<dyn Prober>,
    /// 结果存储
    store: Arc<ResultStore>,
    /// 请求配置列表
    profiles: Arc<[Profile]>,
}

impl ProbeContext {
    /// 创建新的探测上下文
    pub fn new(prober: Arc<dyn Prober>, store: Arc<ResultStore>, profiles: Vec<Profile>) -> Self {
        Self {
            prober,
            store,
            profiles: profiles.into(),
        }
    }

    /// 结果存储
    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    /// 请求配置列表
    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    /// 使用所有请求配置探测一个目标
    ///
    /// 各请求配置并发探测，每个结果在探测完成时立即写入存储，
    /// 因此序列顺序是完成顺序。
    pub async fn check_target(&self, target: &Target) -> Vec<CheckResult> {
        let probes = self.profiles.iter().map(|profile| async move {
            let outcome = self.prober.probe(target, profile).await;
            let result = CheckResult::new(target.clone(), profile.name.clone(), outcome);

            match result.outcome.error_description() {
                None => debug!(
                    target_url = %target,
                    profile = %profile.name,
                    "检测完成: {}",
                    result.outcome
                ),
                Some(description) => warn!(
                    target_url = %target,
                    profile = %profile.name,
                    "检测失败: {}",
                    description
                ),
            }

            self.store.append(result.clone()).await;
            result
        });

        futures::future::join_all(probes).await
    }
}

/// 监控任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// 运行中
    Running,
    /// 已停止
    Stopped,
}

/// 单目标监控任务的句柄
///
/// 持有取消信号和后台任务。句柄被丢弃时发送端关闭，后台任务也会退出。
#[derive(Debug)]
pub struct MonitorHandle {
    /// 目标
    target: Target,
    /// 检测间隔
    interval: Duration,
    /// 取消信号
    cancel: watch::Sender<bool>,
    /// 后台任务
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// 目标
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// 检测间隔
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 请求停止，重复调用无副作用
    pub fn stop(&self) {
        let signalled = self.cancel.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        });
        if signalled {
            info!("请求停止目标监控任务: {}", self.target);
        }
    }

    /// 当前状态
    pub fn state(&self) -> MonitorState {
        if *self.cancel.borrow() || self.task.is_finished() {
            MonitorState::Stopped
        } else {
            MonitorState::Running
        }
    }

    /// 等待后台任务退出（需要先调用 `stop`，否则会一直等待）
    pub async fn join(self) {
        let target = self.target.clone();
        // 保留发送端直到任务结束，避免提前触发关闭
        let _cancel = self.cancel;
        if let Err(e) = self.task.await {
            warn!("目标监控任务异常退出 {}: {}", target, e);
        }
    }
}

/// 单目标监控任务
pub struct TargetMonitor {
    /// 目标
    target: Target,
    /// 检测间隔
    interval: Duration,
    /// 探测上下文
    context: Arc<ProbeContext>,
}

impl TargetMonitor {
    /// 创建监控任务
    ///
    /// 间隔为0时使用 `DEFAULT_CHECK_INTERVAL`
    pub fn new(target: Target, interval: Duration, context: Arc<ProbeContext>) -> Self {
        let interval = if interval.is_zero() {
            warn!("目标 {} 的检测间隔为0，使用默认间隔", target);
            DEFAULT_CHECK_INTERVAL
        } else {
            interval
        };
        Self {
            target,
            interval,
            context,
        }
    }

    /// 在后台启动监控任务，返回句柄
    pub fn spawn(self) -> MonitorHandle {
        let (cancel, cancel_rx) = watch::channel(false);
        let target = self.target.clone();
        let interval = self.interval;
        let task = tokio::spawn(self.run(cancel_rx));

        MonitorHandle {
            target,
            interval,
            cancel,
            task,
        }
    }

    /// 监控循环
    async fn run(self, mut cancel_rx: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        // 检测耗时超过间隔时不补发，保证同一请求配置最多一个检测在进行
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "启动目标监控任务: {} (间隔 {}s)",
            self.target,
            self.interval.as_secs_f64()
        );

        loop {
            tokio::select! {
                biased;
                _ = wait_cancelled(&mut cancel_rx) => break,
                _ = ticker.tick() => {}
            }

            debug!("开始检测目标: {}", self.target);
            self.context.check_target(&self.target).await;
        }

        info!("目标监控任务已停止: {}", self.target);
    }
}

/// 等待取消信号，发送端关闭也视为取消
async fn wait_cancelled(cancel_rx: &mut watch::Receiver<bool>) {
    loop {
        let cancelled = *cancel_rx.borrow_and_update();
        if cancelled {
            return;
        }
        if cancel_rx.changed().await.is_err() {
            return;
        }
    }
}

//! 目标文件监控模块
//!
//! 监控目标列表文件的变化，重新解析后广播新的目标列表

use crate::input::read_targets_file;
use crate::monitor::target::Target;
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info};

/// 目标列表变更事件
#[derive(Debug, Clone)]
pub struct TargetsChangeEvent {
    /// 目标文件路径
    pub path: PathBuf,
    /// 新的目标列表
    pub targets: Vec<Target>,
    /// 变更时间
    pub timestamp: Instant,
    /// 版本号
    pub version: u64,
}

/// 目标文件监控器
pub struct TargetsWatcher {
    /// 目标文件路径（规范化后）
    path: PathBuf,
    /// 文件系统监控器
    watcher: Option<RecommendedWatcher>,
    /// 事件发送器
    event_sender: broadcast::Sender<TargetsChangeEvent>,
    /// 防抖动延迟
    debounce_delay: Duration,
}

impl TargetsWatcher {
    /// 创建新的目标文件监控器
    ///
    /// # 参数
    /// * `path` - 目标文件路径
    /// * `debounce_delay` - 防抖动延迟时间
    ///
    /// # 返回
    /// * `Result<(Self, broadcast::Receiver<TargetsChangeEvent>)>` - 监控器和事件接收器
    pub fn new<P: AsRef<Path>>(
        path: P,
        debounce_delay: Duration,
    ) -> Result<(Self, broadcast::Receiver<TargetsChangeEvent>)> {
        let path = Self::validate_path(path.as_ref())?;
        let (event_sender, event_receiver) = broadcast::channel(16);

        let watcher = Self {
            path,
            watcher: None,
            event_sender,
            debounce_delay,
        };

        Ok((watcher, event_receiver))
    }

    /// 验证并规范化文件路径
    fn validate_path(path: &Path) -> Result<PathBuf> {
        if !path.is_file() {
            return Err(anyhow::anyhow!("目标文件不存在或不是文件: {}", path.display()));
        }
        path.canonicalize()
            .with_context(|| format!("无法解析目标文件路径: {}", path.display()))
    }

    /// 被监控的文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 启动文件监控
    pub fn start(&mut self) -> Result<()> {
        info!("启动目标文件监控: {}", self.path.display());

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            notify::Config::default().with_poll_interval(Duration::from_secs(1)),
        )
        .context("创建文件监控器失败")?;

        // 监控文件所在目录，编辑器常以替换文件的方式保存
        let watch_path = self.path.parent().unwrap_or(&self.path);
        watcher
            .watch(watch_path, RecursiveMode::NonRecursive)
            .with_context(|| format!("监控目录失败: {}", watch_path.display()))?;

        self.watcher = Some(watcher);

        tokio::spawn(Self::handle_file_events(
            rx,
            self.path.clone(),
            self.event_sender.clone(),
            self.debounce_delay,
        ));

        Ok(())
    }

    /// 处理文件系统事件
    async fn handle_file_events(
        mut rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
        path: PathBuf,
        event_sender: broadcast::Sender<TargetsChangeEvent>,
        debounce_delay: Duration,
    ) {
        let mut last_event_time: Option<Instant> = None;
        let mut version = 1u64;

        while let Some(res) = rx.recv().await {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    error!("文件监控事件错误: {}", e);
                    continue;
                }
            };

            if !Self::is_target_file_event(&event, &path) {
                continue;
            }

            let now = Instant::now();
            if last_event_time.is_some_and(|last| now.duration_since(last) < debounce_delay) {
                debug!("跳过重复事件（防抖动）");
                continue;
            }

            // 等待写入完成，期间积压的事件属于同一次保存
            tokio::time::sleep(debounce_delay).await;
            let skipped = Self::drain_pending(&mut rx);
            if skipped > 0 {
                debug!("合并了 {} 个积压的文件事件", skipped);
            }
            last_event_time = Some(Instant::now());

            match read_targets_file(&path).await {
                Ok(targets) => {
                    info!("目标文件已重新加载，版本: {}, 目标数: {}", version, targets.len());
                    let change = TargetsChangeEvent {
                        path: path.clone(),
                        targets,
                        timestamp: Instant::now(),
                        version,
                    };
                    version += 1;
                    if event_sender.send(change).is_err() {
                        debug!("没有目标变更订阅者");
                    }
                }
                Err(e) => error!("重新加载目标文件失败: {}", e),
            }
        }

        debug!("目标文件事件处理已结束");
    }

    /// 丢弃通道中已经积压的事件，返回丢弃的数量
    fn drain_pending(rx: &mut mpsc::UnboundedReceiver<notify::Result<Event>>) -> usize {
        let mut drained = 0;
        while rx.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }

    /// 检查是否是目标文件的事件
    fn is_target_file_event(event: &Event, target_path: &Path) -> bool {
        match &event.kind {
            EventKind::Modify(_) | EventKind::Create(_) => {
                event.paths.iter().any(|path| path == target_path)
            }
            _ => false,
        }
    }

    /// 订阅变更事件
    pub fn subscribe(&self) -> broadcast::Receiver<TargetsChangeEvent> {
        self.event_sender.subscribe()
    }

    /// 停止监控
    pub fn stop(&mut self) {
        if self.watcher.take().is_some() {
            info!("目标文件监控已停止");
        }
    }
}

impl Drop for TargetsWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

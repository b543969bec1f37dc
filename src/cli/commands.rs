//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{Config, ConfigLoader, TargetsChangeEvent, TargetsWatcher, TomlConfigLoader};
use crate::error::{ConfigError, Result};
use crate::input::{merge_targets, read_targets_file};
use crate::monitor::{CheckResult, LatestStatus, MonitorRegistry, Target};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// 目标文件防抖动延迟
const TARGETS_DEBOUNCE: Duration = Duration::from_millis(500);

/// `init` 命令写入的配置模板
const CONFIG_TEMPLATE: &str = include_str!("../../templates/url-monitor.toml");

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 加载配置
///
/// 未显式指定且默认路径不存在时使用默认配置；显式指定的文件必须存在
pub async fn load_config(args: &Args) -> Result<Config> {
    let config_path = args.get_config_path();
    if !config_path.exists() && !args.has_explicit_config() {
        info!("未找到配置文件 {}，使用默认配置", config_path.display());
        return Ok(Config::default());
    }

    let loader = TomlConfigLoader::new(true);
    loader.load_from_file(&config_path).await
}

/// 目标来源
///
/// 第一个目标文件会被监控变化，其余来源在运行期间保持不变
#[derive(Debug, Default)]
pub struct TargetSources {
    /// 固定的目标
    pub fixed: Vec<Target>,
    /// 需要监控的目标文件
    pub watched_file: Option<PathBuf>,
    /// 监控文件当前的目标
    pub watched: Vec<Target>,
}

impl TargetSources {
    /// 从命令行参数和配置收集目标
    pub async fn resolve(args: &Args, config: &Config) -> Result<Self> {
        let mut fixed: Vec<Target> = args
            .urls
            .iter()
            .chain(config.monitor.targets.iter())
            .filter_map(|raw| Target::parse(raw))
            .collect();

        let mut files = args
            .urls_file
            .iter()
            .chain(config.monitor.targets_file.iter())
            .cloned();

        let watched_file = files.next();
        let watched = match &watched_file {
            Some(path) => read_targets_file(path).await?,
            None => Vec::new(),
        };

        for path in files {
            fixed.extend(read_targets_file(&path).await?);
        }

        Ok(Self {
            fixed: merge_targets(fixed),
            watched_file,
            watched,
        })
    }

    /// 合并后的全部目标
    pub fn all(&self) -> Vec<Target> {
        merge_targets(self.fixed.iter().chain(self.watched.iter()).cloned())
    }

    /// 以新的文件内容替换监控文件的目标
    pub fn replace_watched(&mut self, targets: Vec<Target>) -> Vec<Target> {
        self.watched = targets;
        self.all()
    }
}

/// 版本命令
pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Version { format } = &args.command {
            match format {
                OutputFormat::Json => {
                    let version_info = serde_json::json!({
                        "name": crate::APP_NAME,
                        "version": crate::VERSION,
                        "description": crate::APP_DESCRIPTION
                    });
                    println!("{}", serde_json::to_string_pretty(&version_info)?);
                }
                _ => {
                    println!("{} v{}", crate::APP_NAME, crate::VERSION);
                    println!("{}", crate::APP_DESCRIPTION);
                }
            }
        }
        Ok(())
    }
}

/// 初始化命令
pub struct InitCommand;

#[async_trait]
impl Command for InitCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Init { config_path, force } = &args.command {
            self.create_config_file(config_path, *force).await
        } else {
            Ok(())
        }
    }
}

impl InitCommand {
    /// 创建配置文件
    async fn create_config_file(&self, config_path: &Path, force: bool) -> Result<()> {
        if config_path.exists() && !force {
            eprintln!("配置文件已存在: {}", config_path.display());
            eprintln!("使用 --force 参数覆盖现有文件");
            return Ok(());
        }

        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        tokio::fs::write(config_path, CONFIG_TEMPLATE).await?;

        println!("配置文件已创建: {}", config_path.display());
        println!("请编辑配置文件以添加要监控的目标");

        Ok(())
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate { verbose } = &args.command {
            self.validate_config_file(&args.get_config_path(), *verbose)
                .await
        } else {
            Ok(())
        }
    }
}

impl ValidateCommand {
    /// 验证配置文件
    async fn validate_config_file(&self, config_path: &Path, verbose: bool) -> Result<()> {
        println!("验证配置文件: {}", config_path.display());

        let loader = TomlConfigLoader::new(true);
        let config = loader.load_from_file(config_path).await?;

        if let Some(targets_file) = &config.monitor.targets_file {
            if !targets_file.is_file() {
                return Err(ConfigError::ValidationError(format!(
                    "目标文件不存在: {}",
                    targets_file.display()
                ))
                .into());
            }
        }

        if verbose {
            println!("配置验证通过！");
            println!("监控配置:");
            println!("  检测间隔: {}秒", config.monitor.check_interval_seconds);
            println!("  请求超时: {}秒", config.monitor.request_timeout_seconds);
            println!("  日志级别: {}", config.monitor.log_level);
            match config.monitor.max_series_len {
                Some(len) => println!("  序列上限: {len}"),
                None => println!("  序列上限: 不限制"),
            }
            println!("  内联目标: {}", config.monitor.targets.len());
            if let Some(targets_file) = &config.monitor.targets_file {
                println!("  目标文件: {}", targets_file.display());
            }

            println!("请求配置:");
            for (i, profile) in config.profiles.iter().enumerate() {
                println!("  {}. {}", i + 1, profile.name);
                if let Some(user_agent) = &profile.user_agent {
                    println!("     User-Agent: {user_agent}");
                }
                for (name, value) in &profile.headers {
                    println!("     {name}: {value}");
                }
            }
        } else {
            println!("✓ 配置文件验证通过");
            println!("✓ 找到 {} 个请求配置", config.profiles.len());
        }

        Ok(())
    }
}

/// 检测命令
pub struct CheckCommand;

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Check { format } = &args.command {
            self.perform_check(args, *format).await
        } else {
            Ok(())
        }
    }
}

impl CheckCommand {
    /// 对所有目标执行一次检测
    async fn perform_check(&self, args: &Args, format: OutputFormat) -> Result<()> {
        let config = load_config(args).await?;
        let targets = TargetSources::resolve(args, &config).await?.all();

        if targets.is_empty() {
            eprintln!("未找到任何目标，请使用 --url、--urls-file 或配置文件指定");
            return Ok(());
        }

        let registry = MonitorRegistry::from_config(&config)?;
        let results = registry.check_now(&targets).await;

        print_results(&results, format)
    }
}

/// 持续监控命令
pub struct WatchCommand;

#[async_trait]
impl Command for WatchCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Watch {
            interval,
            refresh,
            format,
        } = &args.command
        {
            self.run(args, *interval, *refresh, *format).await
        } else {
            Ok(())
        }
    }
}

impl WatchCommand {
    /// 启动监控并等待中断信号
    async fn run(
        &self,
        args: &Args,
        interval: Option<u64>,
        refresh: u64,
        format: OutputFormat,
    ) -> Result<()> {
        if refresh == 0 {
            return Err(ConfigError::ValidationError("状态输出间隔必须大于0".to_string()).into());
        }

        let mut config = load_config(args).await?;
        if let Some(interval_secs) = interval {
            if interval_secs == 0 {
                return Err(ConfigError::ValidationError("检测间隔必须大于0".to_string()).into());
            }
            config.monitor.check_interval_seconds = interval_secs;
        }

        let mut sources = TargetSources::resolve(args, &config).await?;
        let registry = Arc::new(MonitorRegistry::from_config(&config)?);

        let started = registry.start_all(sources.all()).await;
        info!(
            "开始监控 {} 个目标，检测间隔 {}秒",
            started, config.monitor.check_interval_seconds
        );
        if started == 0 {
            warn!("当前没有任何目标，等待目标文件更新");
        }

        // 目标文件热重载
        let mut watcher = None;
        let mut changes = None;
        if let Some(path) = &sources.watched_file {
            let (mut targets_watcher, receiver) = TargetsWatcher::new(path, TARGETS_DEBOUNCE)?;
            targets_watcher.start()?;
            watcher = Some(targets_watcher);
            changes = Some(receiver);
        }

        let period = Duration::from_secs(refresh);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = &mut shutdown => {
                    match result {
                        Ok(()) => info!("收到中断信号，正在停止监控..."),
                        Err(e) => error!("监听中断信号失败: {}", e),
                    }
                    break;
                }
                _ = ticker.tick() => {
                    let snapshot = registry.store().snapshot_all().await;
                    if let Err(e) = print_snapshot(&snapshot, format) {
                        error!("输出状态失败: {}", e);
                    }
                }
                Some(change) = next_change(&mut changes) => {
                    let targets = sources.replace_watched(change.targets);
                    let report = registry.reconcile(targets).await;
                    info!(
                        "目标文件版本 {}: 新增 {} 个目标，移除 {} 个目标",
                        change.version,
                        report.started.len(),
                        report.removed.len()
                    );
                }
            }
        }

        if let Some(mut targets_watcher) = watcher {
            targets_watcher.stop();
        }
        registry.shutdown().await;
        info!("监控已停止");
        Ok(())
    }
}

/// 等待下一个目标变更事件，没有监控文件时永不返回
async fn next_change(
    changes: &mut Option<broadcast::Receiver<TargetsChangeEvent>>,
) -> Option<TargetsChangeEvent> {
    let Some(receiver) = changes.as_mut() else {
        return std::future::pending().await;
    };

    loop {
        match receiver.recv().await {
            Ok(change) => return Some(change),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("跳过了 {} 个目标变更事件", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return std::future::pending().await,
        }
    }
}

/// 按指定格式输出检测结果
pub fn print_results(results: &[CheckResult], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(results)?),
        OutputFormat::Table => print_table_results(results.iter()),
        OutputFormat::Text => print_text_results(results.iter()),
    }
    Ok(())
}

/// 按指定格式输出最新状态快照
fn print_snapshot(snapshot: &BTreeMap<Target, LatestStatus>, format: OutputFormat) -> Result<()> {
    let latest = snapshot.values().flat_map(|status| status.values());
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(snapshot)?),
        OutputFormat::Table => print_table_results(latest),
        OutputFormat::Text => {
            println!("--- {} ---", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
            print_text_results(latest);
        }
    }
    Ok(())
}

/// 打印文本格式结果
fn print_text_results<'a>(results: impl Iterator<Item = &'a CheckResult>) {
    for result in results {
        let status_icon = if result.outcome.is_success() {
            "✓"
        } else {
            "✗"
        };
        println!(
            "{} {} [{}] - {}",
            status_icon, result.target, result.profile, result.outcome
        );
    }
}

/// 打印表格格式结果
fn print_table_results<'a>(results: impl Iterator<Item = &'a CheckResult>) {
    println!(
        "{:<40} {:<12} {:<8} {:<10} {:<30}",
        "目标", "请求配置", "状态码", "响应时间", "错误信息"
    );
    println!("{}", "-".repeat(104));

    for result in results {
        let status_code = result
            .outcome
            .status_code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "N/A".to_string());
        let latency = result
            .outcome
            .latency_ms()
            .map(|ms| format!("{ms}ms"))
            .unwrap_or_else(|| "N/A".to_string());
        let error_msg = result.outcome.error_description().unwrap_or("");

        println!(
            "{:<40} {:<12} {:<8} {:<10} {:<30}",
            result.target, result.profile, status_code, latency, error_msg
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_config_template_is_valid() {
        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_string(CONFIG_TEMPLATE).await.unwrap();
        assert_eq!(config.profiles.len(), 2);
        assert_eq!(config.monitor.check_interval_seconds, 300);
    }

    #[tokio::test]
    async fn test_load_config_missing_explicit_file() {
        let args = Args::try_parse_from([
            "url-monitor",
            "--config",
            "/nonexistent/url-monitor.toml",
            "check",
        ])
        .unwrap();
        assert!(load_config(&args).await.is_err());
    }

    #[tokio::test]
    async fn test_resolve_targets_from_all_sources() {
        let mut urls_file = NamedTempFile::new().unwrap();
        writeln!(urls_file, "https://b.example\nhttps://c.example").unwrap();

        let args = Args::try_parse_from([
            "url-monitor",
            "--url",
            "https://a.example",
            "--url",
            "https://b.example",
            "--urls-file",
            urls_file.path().to_str().unwrap(),
            "check",
        ])
        .unwrap();
        let mut config = Config::default();
        config.monitor.targets = vec!["https://d.example".to_string(), "  ".to_string()];

        let mut sources = TargetSources::resolve(&args, &config).await.unwrap();
        assert_eq!(sources.watched_file.as_deref(), Some(urls_file.path()));

        let all: Vec<String> = sources.all().iter().map(|t| t.to_string()).collect();
        assert_eq!(
            all,
            vec![
                "https://a.example",
                "https://b.example",
                "https://d.example",
                "https://c.example"
            ]
        );

        let updated = sources.replace_watched(vec![Target::parse("https://e.example").unwrap()]);
        assert_eq!(updated.len(), 4);
        assert!(!updated.iter().any(|t| t.as_str() == "https://c.example"));
    }

    #[tokio::test]
    async fn test_init_writes_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("url-monitor.toml");

        InitCommand.create_config_file(&path, false).await.unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, CONFIG_TEMPLATE);

        // 已存在时不覆盖
        std::fs::write(&path, "# custom").unwrap();
        InitCommand.create_config_file(&path, false).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# custom");
    }
}

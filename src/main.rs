//! URL Monitor 主程序入口
//!
//! 并发URL监控工具

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use url_monitor::cli::{
    Args, CheckCommand, Command, Commands, InitCommand, ValidateCommand, VersionCommand,
    WatchCommand,
};
use url_monitor::config::{ConfigLoader, TomlConfigLoader};
use url_monitor::logging::{LogConfig, LoggingSystem};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    // 初始化日志系统
    let log_config = LogConfig {
        level: resolve_log_level(&args).await,
        console: true,
        json_format: false,
        ..Default::default()
    };

    let _logging_system = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    info!("URL Monitor v{} 启动", url_monitor::VERSION);

    // 执行命令
    if let Err(e) = execute_command(&args).await {
        error!("命令执行失败: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// 确定日志级别
///
/// 命令行参数优先，其次是配置文件中的 `log_level`，都没有时使用 info。
/// 配置文件的错误留给具体命令报告。
async fn resolve_log_level(args: &Args) -> log::LevelFilter {
    if let Some(level) = args.log_level {
        return level.into();
    }

    let config_path = args.get_config_path();
    if !config_path.exists() {
        return log::LevelFilter::Info;
    }

    TomlConfigLoader::new(true)
        .load_from_file(&config_path)
        .await
        .ok()
        .and_then(|config| LogConfig::parse_level(&config.monitor.log_level))
        .unwrap_or(log::LevelFilter::Info)
}

/// 执行CLI命令
async fn execute_command(args: &Args) -> Result<()> {
    let command: Box<dyn Command> = match &args.command {
        Commands::Check { .. } => Box::new(CheckCommand),
        Commands::Watch { .. } => Box::new(WatchCommand),
        Commands::Validate { .. } => Box::new(ValidateCommand),
        Commands::Init { .. } => Box::new(InitCommand),
        Commands::Version { .. } => Box::new(VersionCommand),
    };

    command.execute(args).await.map_err(|e| anyhow::anyhow!(e))
}

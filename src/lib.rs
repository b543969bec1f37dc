//! URL Monitor - 并发URL监控工具
//!
//! 这是一个用Rust编写的URL监控工具，支持：
//! - 以多个客户端请求配置（User-Agent、请求头）探测目标
//! - 每个目标独立的周期性调度
//! - 线程安全的结果时间序列存储与最新状态视图
//! - 目标文件热重载
//! - 结构化日志记录

pub mod cli;
pub mod config;
pub mod error;
pub mod input;
pub mod logging;
pub mod monitor;

// 重新导出主要类型
pub use config::{Config, MonitorConfig, ProfileConfig};
pub use error::UrlMonitorError;
pub use monitor::{CheckResult, MonitorRegistry, Outcome, ResultStore, Target};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

//! 配置管理模块
//!
//! 提供配置文件解析、验证和目标文件热重载功能

pub mod loader;
pub mod types;
pub mod watcher;

// 重新导出主要类型
pub use loader::{get_default_config_path, ConfigLoader, TomlConfigLoader};
pub use types::{validate_config, Config, MonitorConfig, ProfileConfig};
pub use watcher::{TargetsChangeEvent, TargetsWatcher};

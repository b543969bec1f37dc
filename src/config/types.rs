//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use crate::monitor::profile::Profile;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

/// Chrome 浏览器的 User-Agent
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// GoogleBot 爬虫的 User-Agent
pub const GOOGLEBOT_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 6.0.1; Nexus 5X Build/MMB29P) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/41.0.2272.96 Mobile Safari/537.36 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

/// 主配置结构，包含监控配置和请求配置列表
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// 监控配置项
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// 请求配置列表，为空时使用内置的 Chrome 和 GoogleBot
    #[serde(default = "default_profiles")]
    pub profiles: Vec<ProfileConfig>,
}

/// 监控配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorConfig {
    /// 检测间隔（秒）
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    /// 请求超时时间（秒）
    #[serde(default = "default_timeout")]
    pub request_timeout_seconds: u64,
    /// 每个目标/请求配置保留的最大结果数，不设置则不限制
    #[serde(default)]
    pub max_series_len: Option<usize>,
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 内联的目标列表
    #[serde(default)]
    pub targets: Vec<String>,
    /// 目标列表文件（每行一个URL）
    #[serde(default)]
    pub targets_file: Option<PathBuf>,
}

/// 请求配置：一个命名的请求身份
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileConfig {
    /// 显示名称
    pub name: String,
    /// User-Agent，会覆盖 headers 中的同名字段
    #[serde(default)]
    pub user_agent: Option<String>,
    /// 额外的请求头
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl ProfileConfig {
    /// 创建只带 User-Agent 的请求配置
    pub fn with_user_agent(name: &str, user_agent: &str) -> Self {
        Self {
            name: name.to_string(),
            user_agent: Some(user_agent.to_string()),
            headers: HashMap::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig::default(),
            profiles: default_profiles(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: default_check_interval(),
            request_timeout_seconds: default_timeout(),
            max_series_len: None,
            log_level: default_log_level(),
            targets: Vec::new(),
            targets_file: None,
        }
    }
}

impl MonitorConfig {
    /// 检测间隔
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    /// 请求超时时间
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

// 默认值函数
fn default_check_interval() -> u64 {
    300
}
fn default_timeout() -> u64 {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}

/// 内置请求配置
pub fn default_profiles() -> Vec<ProfileConfig> {
    vec![
        ProfileConfig::with_user_agent("Chrome", CHROME_USER_AGENT),
        ProfileConfig::with_user_agent("GoogleBot", GOOGLEBOT_USER_AGENT),
    ]
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    if config.monitor.check_interval_seconds == 0 {
        return Err("检测间隔不能为0".to_string());
    }

    if config.monitor.request_timeout_seconds == 0 {
        return Err("请求超时时间不能为0".to_string());
    }

    if config.monitor.max_series_len == Some(0) {
        return Err("最大保留结果数不能为0".to_string());
    }

    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.monitor.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.monitor.log_level, valid_log_levels
        ));
    }

    if config.profiles.is_empty() {
        return Err("至少需要配置一个请求配置".to_string());
    }

    let mut seen = HashSet::new();
    for profile in &config.profiles {
        if profile.name.trim().is_empty() {
            return Err("请求配置名称不能为空".to_string());
        }
        if !seen.insert(profile.name.as_str()) {
            return Err(format!("请求配置名称重复: {}", profile.name));
        }
        Profile::from_config(profile).map_err(|e| e.to_string())?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.monitor.check_interval(), Duration::from_secs(300));
        assert_eq!(config.monitor.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.profiles.len(), 2);
        assert_eq!(config.profiles[0].name, "Chrome");
        assert_eq!(config.profiles[1].name, "GoogleBot");
    }

    #[test]
    fn test_validate_zero_interval() {
        let mut config = Config::default();
        config.monitor.check_interval_seconds = 0;
        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("检测间隔"));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.monitor.request_timeout_seconds = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_series_len() {
        let mut config = Config::default();
        config.monitor.max_series_len = Some(0);
        assert!(validate_config(&config).is_err());

        config.monitor.max_series_len = Some(10);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();
        config.monitor.log_level = "verbose".to_string();
        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("日志级别"));
    }

    #[test]
    fn test_validate_duplicate_profiles() {
        let mut config = Config::default();
        config
            .profiles
            .push(ProfileConfig::with_user_agent("Chrome", "other"));
        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("重复"));
    }

    #[test]
    fn test_validate_empty_profiles() {
        let mut config = Config::default();
        config.profiles.clear();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_malformed_header() {
        let mut config = Config::default();
        let mut profile = ProfileConfig::with_user_agent("Broken", "agent");
        profile
            .headers
            .insert("Bad Header".to_string(), "value".to_string());
        config.profiles.push(profile);

        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("Broken"));
    }
}

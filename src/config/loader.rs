//! 配置加载器实现
//!
//! 提供TOML配置文件解析、环境变量替换和错误处理功能

use crate::config::types::{validate_config, Config};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "url-monitor.toml";

/// 配置加载器trait，定义配置加载接口
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    /// 从文件加载配置
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    ///
    /// # 返回
    /// * `Result<Config>` - 加载的配置或错误
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config>;

    /// 从字符串加载配置
    async fn load_from_string(&self, content: &str) -> Result<Config>;

    /// 验证配置
    fn validate(&self, config: &Config) -> Result<()>;
}

/// TOML配置加载器实现
#[derive(Debug, Clone)]
pub struct TomlConfigLoader {
    /// 是否启用环境变量替换
    enable_env_substitution: bool,
}

impl TomlConfigLoader {
    /// 创建新的TOML配置加载器
    ///
    /// # 参数
    /// * `enable_env_substitution` - 是否启用环境变量替换
    pub fn new(enable_env_substitution: bool) -> Self {
        Self {
            enable_env_substitution,
        }
    }

    /// 替换字符串中 `${VAR_NAME}` 形式的环境变量
    fn substitute_env_vars(&self, content: &str) -> Result<String> {
        if !self.enable_env_substitution {
            return Ok(content.to_string());
        }

        let env_var_regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| ConfigError::ParseError(format!("正则表达式错误: {e}")))?;

        let mut result = content.to_string();
        for captures in env_var_regex.captures_iter(content) {
            let full_match = &captures[0];
            let var_name = &captures[1];

            let value = std::env::var(var_name).map_err(|_| ConfigError::EnvVarError {
                var: var_name.to_string(),
            })?;
            result = result.replace(full_match, &value);
        }

        Ok(result)
    }

    /// 解析TOML内容
    fn parse_toml(&self, content: &str) -> Result<Config> {
        let processed_content = self.substitute_env_vars(content)?;
        let config: Config = toml::from_str(&processed_content)
            .map_err(|e| ConfigError::ParseError(format!("TOML解析失败: {e}")))?;
        Ok(config)
    }
}

impl Default for TomlConfigLoader {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl ConfigLoader for TomlConfigLoader {
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            }
            .into());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::ParseError(format!("读取文件失败: {e}")))?;

        let mut config = self.parse_toml(&content)?;
        self.validate(&config)?;

        // 目标文件的相对路径以配置文件所在目录为基准
        if let (Some(targets_file), Some(parent)) =
            (config.monitor.targets_file.as_mut(), path.parent())
        {
            if targets_file.is_relative() {
                *targets_file = parent.join(&*targets_file);
            }
        }

        log::info!("成功加载配置文件: {}", path.display());
        log::debug!("配置内容: {:?}", config);

        Ok(config)
    }

    async fn load_from_string(&self, content: &str) -> Result<Config> {
        let config = self.parse_toml(content)?;
        self.validate(&config)?;

        log::debug!("成功解析配置字符串");

        Ok(config)
    }

    fn validate(&self, config: &Config) -> Result<()> {
        validate_config(config).map_err(|e| ConfigError::ValidationError(e).into())
    }
}

/// 获取默认配置文件路径
///
/// 优先使用当前目录下的 `url-monitor.toml`，否则使用用户配置目录
pub fn get_default_config_path() -> PathBuf {
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return local;
    }

    dirs::config_dir()
        .map(|config_dir| config_dir.join("url-monitor").join("config.toml"))
        .unwrap_or(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TEST_CONFIG_TOML: &str = r#"
[monitor]
check_interval_seconds = 60
request_timeout_seconds = 3
max_series_len = 500
log_level = "debug"
targets = ["https://example.com", "https://rust-lang.org"]

[[profiles]]
name = "Chrome"
user_agent = "Mozilla/5.0 Chrome"

[[profiles]]
name = "Curl"
user_agent = "curl/8.0"
[profiles.headers]
"Accept" = "*/*"
"#;

    const TEST_CONFIG_WITH_ENV_VARS: &str = r#"
[monitor]
targets = ["${MONITOR_TARGET}"]

[[profiles]]
name = "Api"
[profiles.headers]
"Authorization" = "Bearer ${API_TOKEN}"
"#;

    #[tokio::test]
    async fn test_toml_parsing() {
        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_string(TEST_CONFIG_TOML).await.unwrap();

        assert_eq!(config.monitor.check_interval_seconds, 60);
        assert_eq!(config.monitor.request_timeout_seconds, 3);
        assert_eq!(config.monitor.max_series_len, Some(500));
        assert_eq!(config.monitor.targets.len(), 2);
        assert_eq!(config.profiles.len(), 2);
        assert_eq!(config.profiles[1].name, "Curl");
        assert_eq!(
            config.profiles[1].headers.get("Accept"),
            Some(&"*/*".to_string())
        );
    }

    #[tokio::test]
    async fn test_defaults_when_sections_missing() {
        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_string("").await.unwrap();

        assert_eq!(config, Config::default());
    }

    #[tokio::test]
    #[serial]
    async fn test_env_var_substitution() {
        env::set_var("MONITOR_TARGET", "https://internal.example");
        env::set_var("API_TOKEN", "test-token-123");

        let loader = TomlConfigLoader::new(true);
        let config = loader
            .load_from_string(TEST_CONFIG_WITH_ENV_VARS)
            .await
            .unwrap();

        assert_eq!(config.monitor.targets, vec!["https://internal.example"]);
        assert_eq!(
            config.profiles[0].headers.get("Authorization"),
            Some(&"Bearer test-token-123".to_string())
        );

        env::remove_var("MONITOR_TARGET");
        env::remove_var("API_TOKEN");
    }

    #[tokio::test]
    #[serial]
    async fn test_env_var_substitution_missing_var() {
        let config_with_missing_var = r#"
[monitor]
targets = ["${MISSING_TARGET_VAR}"]
"#;

        let loader = TomlConfigLoader::new(true);
        let result = loader.load_from_string(config_with_missing_var).await;

        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("MISSING_TARGET_VAR"));
    }

    #[tokio::test]
    async fn test_malformed_profile_header_rejected() {
        let content = r#"
[[profiles]]
name = "Broken"
[profiles.headers]
"Bad Header" = "value"
"#;
        let loader = TomlConfigLoader::new(false);
        let err = loader.load_from_string(content).await.unwrap_err();
        assert!(err.to_string().contains("Broken"));
    }

    #[tokio::test]
    async fn test_load_from_file_resolves_targets_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[monitor]\ntargets_file = \"urls.txt\"").unwrap();

        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_file(file.path()).await.unwrap();

        let expected = file.path().parent().unwrap().join("urls.txt");
        assert_eq!(config.monitor.targets_file, Some(expected));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let loader = TomlConfigLoader::new(false);
        let err = loader
            .load_from_file("/nonexistent/url-monitor.toml")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("配置文件不存在"));
    }

    #[test]
    fn test_substitute_env_vars_disabled() {
        let loader = TomlConfigLoader::new(false);
        let content = "test ${VAR} content";
        let result = loader.substitute_env_vars(content).unwrap();
        assert_eq!(result, content);
    }

    #[test]
    fn test_get_default_config_path() {
        let path = get_default_config_path();
        assert!(path.to_string_lossy().ends_with(".toml"));
    }
}

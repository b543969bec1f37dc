//! 错误处理模块
//!
//! 定义应用程序的统一错误类型。单次探测的失败不在这里：
//! 它们作为 `Outcome::Failure` 数据记录，不会以错误的形式传播。

use thiserror::Error;

/// URL Monitor 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum UrlMonitorError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
///
/// 这些错误只会在启动阶段出现，任何监控任务启动之前就会返回给调用方。
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },

    /// 请求配置的请求头无效
    #[error("请求配置 {profile} 的请求头无效: {header}")]
    InvalidHeader { profile: String, header: String },
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, UrlMonitorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_converts_into_app_error() {
        let err: UrlMonitorError = ConfigError::InvalidHeader {
            profile: "Chrome".to_string(),
            header: "Bad Header".to_string(),
        }
        .into();

        let message = err.to_string();
        assert!(message.contains("Chrome"));
        assert!(message.contains("Bad Header"));
    }

    #[test]
    fn test_env_var_error_names_variable() {
        let err = ConfigError::EnvVarError {
            var: "API_TOKEN".to_string(),
        };
        assert!(err.to_string().contains("API_TOKEN"));
    }
}

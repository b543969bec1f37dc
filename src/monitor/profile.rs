//! 请求配置
//!
//! 一个请求配置代表一种客户端身份（浏览器、爬虫等），
//! 由显示名称和一组固定的请求头组成，运行期间不可变

use crate::config::types::ProfileConfig;
use crate::error::ConfigError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use std::str::FromStr;

/// 经过校验的请求配置
#[derive(Debug, Clone)]
pub struct Profile {
    /// 显示名称
    pub name: String,
    /// 请求头
    pub headers: HeaderMap,
}

impl Profile {
    /// 从配置构建请求配置，请求头名称或值非法时返回错误
    pub fn from_config(config: &ProfileConfig) -> Result<Self, ConfigError> {
        let invalid = |header: &str| ConfigError::InvalidHeader {
            profile: config.name.clone(),
            header: header.to_string(),
        };

        let mut headers = HeaderMap::new();
        for (key, value) in &config.headers {
            let name = HeaderName::from_str(key).map_err(|_| invalid(key))?;
            let value = HeaderValue::from_str(value).map_err(|_| invalid(key))?;
            headers.insert(name, value);
        }

        if let Some(user_agent) = &config.user_agent {
            let value = HeaderValue::from_str(user_agent).map_err(|_| invalid("User-Agent"))?;
            headers.insert(USER_AGENT, value);
        }

        Ok(Self {
            name: config.name.clone(),
            headers,
        })
    }

    /// 批量构建，任意一个失败即返回错误
    pub fn from_configs(configs: &[ProfileConfig]) -> Result<Vec<Self>, ConfigError> {
        configs.iter().map(Self::from_config).collect()
    }

    /// 获取 User-Agent（如果设置了）
    pub fn user_agent(&self) -> Option<&str> {
        self.headers.get(USER_AGENT).and_then(|v| v.to_str().ok())
    }
}

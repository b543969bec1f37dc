//! 监控目标
//!
//! 目标是规范化后的URL字符串，作为监控和存储的唯一键

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// 被监控的URL
///
/// 创建后不可变。只做空白裁剪，不校验URL格式：
/// 非法URL会在探测时得到 `FailureKind::InvalidUrl`。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Target(String);

impl Target {
    /// 从原始字符串创建目标，空白字符串返回 `None`
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// 获取URL字符串
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl AsRef<str> for Target {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Target {
    fn borrow(&self) -> &str {
        &self.0
    }
}

//! 检测结果数据结构
//!
//! 定义单次探测的结果、失败分类以及供展示层使用的派生视图

use crate::monitor::target::Target;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// 失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// 请求超时
    Timeout,
    /// 连接失败
    Connect,
    /// DNS解析失败
    Dns,
    /// TLS/证书错误
    Tls,
    /// 响应格式错误
    Protocol,
    /// URL无效
    InvalidUrl,
    /// 其他错误
    Other,
}

impl FailureKind {
    /// 是否属于网络层失败（连接拒绝、DNS失败、超时）
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            FailureKind::Timeout | FailureKind::Connect | FailureKind::Dns | FailureKind::Tls
        )
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "超时"),
            FailureKind::Connect => write!(f, "连接失败"),
            FailureKind::Dns => write!(f, "DNS失败"),
            FailureKind::Tls => write!(f, "TLS错误"),
            FailureKind::Protocol => write!(f, "协议错误"),
            FailureKind::InvalidUrl => write!(f, "URL无效"),
            FailureKind::Other => write!(f, "其他错误"),
        }
    }
}

/// 单次探测的结果
///
/// 任何完成的HTTP响应（包括4xx/5xx）都是 `Success`，
/// `Failure` 只用于传输层失败
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    /// 收到HTTP响应
    Success {
        /// HTTP状态码
        status_code: u16,
        /// 从发出请求到收到响应头的耗时（毫秒）
        latency_ms: u64,
    },
    /// 传输层失败
    Failure {
        /// 失败分类
        kind: FailureKind,
        /// 错误描述，保证非空
        description: String,
    },
}

impl Outcome {
    /// 创建成功结果
    pub fn success(status_code: u16, latency: Duration) -> Self {
        Outcome::Success {
            status_code,
            latency_ms: latency.as_millis() as u64,
        }
    }

    /// 创建失败结果，空描述会被替换为失败分类名称
    pub fn failure(kind: FailureKind, description: impl Into<String>) -> Self {
        let description = description.into();
        let description = if description.trim().is_empty() {
            kind.to_string()
        } else {
            description
        };
        Outcome::Failure { kind, description }
    }

    /// 是否收到了HTTP响应
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    /// HTTP状态码
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Outcome::Success { status_code, .. } => Some(*status_code),
            Outcome::Failure { .. } => None,
        }
    }

    /// 响应耗时，失败时未定义
    pub fn latency_ms(&self) -> Option<u64> {
        match self {
            Outcome::Success { latency_ms, .. } => Some(*latency_ms),
            Outcome::Failure { .. } => None,
        }
    }

    /// 错误描述
    pub fn error_description(&self) -> Option<&str> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::Failure { description, .. } => Some(description),
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Success {
                status_code,
                latency_ms,
            } => write!(f, "{status_code} ({latency_ms}ms)"),
            Outcome::Failure { description, .. } => write!(f, "{description}"),
        }
    }
}

/// 检测结果，创建后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// 检测ID
    pub id: Uuid,
    /// 目标
    pub target: Target,
    /// 请求配置名称
    pub profile: String,
    /// 探测完成时间
    pub timestamp: DateTime<Utc>,
    /// 探测结果
    pub outcome: Outcome,
}

impl CheckResult {
    /// 以当前时间创建检测结果
    pub fn new(target: Target, profile: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            profile: profile.into(),
            timestamp: Utc::now(),
            outcome,
        }
    }

    /// 指定时间戳
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// 转换为JSON字符串
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// 一个目标下每个请求配置的最新结果
pub type LatestStatus = BTreeMap<String, CheckResult>;

/// 延迟图表的数据点，失败时 `latency_ms` 为空
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyPoint {
    /// 时间戳
    pub timestamp: DateTime<Utc>,
    /// 延迟（毫秒）
    pub latency_ms: Option<u64>,
}

impl From<&CheckResult> for LatencyPoint {
    fn from(result: &CheckResult) -> Self {
        Self {
            timestamp: result.timestamp,
            latency_ms: result.outcome.latency_ms(),
        }
    }
}

/// 序列统计信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesStats {
    /// 总检测次数
    pub total_checks: u64,
    /// 收到响应的次数
    pub successful_checks: u64,
    /// 传输失败次数
    pub failed_checks: u64,
    /// 平均响应时间（毫秒）
    pub average_latency_ms: f64,
    /// 最大响应时间（毫秒）
    pub max_latency_ms: u64,
    /// 最小响应时间（毫秒）
    pub min_latency_ms: u64,
    /// 成功率（百分比）
    pub success_rate: f64,
    /// 最后检测时间
    pub last_check_time: Option<DateTime<Utc>>,
}

impl Default for SeriesStats {
    fn default() -> Self {
        Self {
            total_checks: 0,
            successful_checks: 0,
            failed_checks: 0,
            average_latency_ms: 0.0,
            max_latency_ms: 0,
            min_latency_ms: u64::MAX,
            success_rate: 0.0,
            last_check_time: None,
        }
    }
}

impl SeriesStats {
    /// 从结果序列计算统计信息
    pub fn from_series<'a>(series: impl IntoIterator<Item = &'a CheckResult>) -> Self {
        let mut stats = Self::default();
        for result in series {
            stats.update(result);
        }
        stats
    }

    /// 更新统计信息
    pub fn update(&mut self, result: &CheckResult) {
        self.total_checks += 1;
        self.last_check_time = Some(result.timestamp);

        match result.outcome.latency_ms() {
            Some(latency_ms) => {
                let previous = self.successful_checks as f64;
                self.successful_checks += 1;
                self.max_latency_ms = self.max_latency_ms.max(latency_ms);
                self.min_latency_ms = self.min_latency_ms.min(latency_ms);
                // 平均值只统计收到响应的检测
                self.average_latency_ms = (self.average_latency_ms * previous
                    + latency_ms as f64)
                    / self.successful_checks as f64;
            }
            None => self.failed_checks += 1,
        }

        self.success_rate = (self.successful_checks as f64 / self.total_checks as f64) * 100.0;
    }
}

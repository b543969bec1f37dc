//! HTTP探测器实现
//!
//! 对一个目标使用一个请求配置发出一次GET请求，返回状态码和延迟。
//! 所有失败都作为 `Outcome::Failure` 返回，从不向调用方传播错误。

use crate::error::{ConfigError, Result};
use crate::monitor::profile::Profile;
use crate::monitor::result::{FailureKind, Outcome};
use crate::monitor::target::Target;
use async_trait::async_trait;
use reqwest::Client;
use std::error::Error as StdError;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// 默认请求超时时间
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// 探测器trait，定义探测接口
#[async_trait]
pub trait Prober: Send + Sync {
    /// 默认超时时间
    fn default_timeout(&self) -> Duration;

    /// 带超时的单次探测
    ///
    /// # 参数
    /// * `target` - 目标URL
    /// * `profile` - 请求配置
    /// * `timeout_duration` - 超时时间
    ///
    /// # 返回
    /// * `Outcome` - 探测结果
    async fn probe_with_timeout(
        &self,
        target: &Target,
        profile: &Profile,
        timeout_duration: Duration,
    ) -> Outcome;

    /// 使用默认超时的单次探测
    async fn probe(&self, target: &Target, profile: &Profile) -> Outcome {
        self.probe_with_timeout(target, profile, self.default_timeout())
            .await
    }
}

/// 基于reqwest的HTTP探测器
#[derive(Debug, Clone)]
pub struct HttpProber {
    /// HTTP客户端
    client: Client,
    /// 默认超时时间
    default_timeout: Duration,
}

impl HttpProber {
    /// 创建新的HTTP探测器
    ///
    /// # 参数
    /// * `timeout` - 默认超时时间
    ///
    /// # 返回
    /// * `Result<Self>` - 探测器实例
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
            .build()
            .map_err(|e| ConfigError::ValidationError(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            client,
            default_timeout: timeout,
        })
    }

    /// 将请求错误归类，并生成可读的描述
    fn classify_error(error: &reqwest::Error) -> (FailureKind, String) {
        let detail = error_chain(error);
        // 只在根因里匹配关键字，顶层信息包含URL本身
        let causes = error
            .source()
            .map(error_chain)
            .unwrap_or_default()
            .to_lowercase();

        if error.is_timeout() {
            (FailureKind::Timeout, "Request timeout".to_string())
        } else if error.is_builder() {
            (FailureKind::InvalidUrl, format!("Invalid URL: {detail}"))
        } else if causes.contains("dns") || causes.contains("failed to lookup") {
            (FailureKind::Dns, format!("DNS resolution failed: {detail}"))
        } else if causes.contains("certificate") || causes.contains("tls") {
            (FailureKind::Tls, format!("SSL/TLS error: {detail}"))
        } else if error.is_connect() {
            (FailureKind::Connect, format!("Connection failed: {detail}"))
        } else if error.is_request() || error.is_body() || error.is_decode() {
            (FailureKind::Protocol, format!("Protocol error: {detail}"))
        } else {
            (FailureKind::Other, format!("Request failed: {detail}"))
        }
    }
}

/// 拼接完整的错误链，reqwest 的顶层信息通常不包含根因
fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

#[async_trait]
impl Prober for HttpProber {
    fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    async fn probe_with_timeout(
        &self,
        target: &Target,
        profile: &Profile,
        timeout_duration: Duration,
    ) -> Outcome {
        let request = self
            .client
            .get(target.as_str())
            .headers(profile.headers.clone())
            .timeout(timeout_duration);

        let start_time = Instant::now();
        // send() 在收到响应头后返回，响应体不读取
        let response_result = timeout(timeout_duration, request.send()).await;
        let latency = start_time.elapsed();

        match response_result {
            Ok(Ok(response)) => Outcome::success(response.status().as_u16(), latency),
            Ok(Err(e)) => {
                let (kind, description) = Self::classify_error(&e);
                Outcome::failure(kind, description)
            }
            Err(_) => Outcome::failure(
                FailureKind::Timeout,
                format!("Request timeout after {}ms", timeout_duration.as_millis()),
            ),
        }
    }
}

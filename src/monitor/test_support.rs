//! 单元测试共用的假探测器

use crate::config::types::default_profiles;
use crate::monitor::profile::Profile;
use crate::monitor::prober::Prober;
use crate::monitor::result::{FailureKind, Outcome};
use crate::monitor::store::ResultStore;
use crate::monitor::target::Target;
use crate::monitor::target_monitor::ProbeContext;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 按固定延迟返回固定结果的探测器
pub struct FakeProber {
    pub delay: Duration,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl FakeProber {
    pub fn ok() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::ok()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for FakeProber {
    fn default_timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    async fn probe_with_timeout(
        &self,
        _target: &Target,
        _profile: &Profile,
        _timeout_duration: Duration,
    ) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            Outcome::failure(FailureKind::Connect, "Connection refused")
        } else {
            Outcome::success(200, self.delay)
        }
    }
}

/// 使用内置请求配置创建探测上下文
pub fn context_with(prober: Arc<FakeProber>) -> Arc<ProbeContext> {
    let profiles = Profile::from_configs(&default_profiles()).unwrap();
    Arc::new(ProbeContext::new(
        prober,
        Arc::new(ResultStore::default()),
        profiles,
    ))
}

pub fn target(url: &str) -> Target {
    Target::parse(url).unwrap()
}

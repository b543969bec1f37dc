//! 监控核心模块
//!
//! 提供HTTP探测、结果存储、单目标监控任务和监控注册表

pub mod prober;
pub mod profile;
pub mod registry;
pub mod result;
pub mod store;
pub mod target;
pub mod target_monitor;

#[cfg(test)]
pub(crate) mod test_support;

// 重新导出主要类型
pub use prober::{HttpProber, Prober, DEFAULT_PROBE_TIMEOUT};
pub use profile::Profile;
pub use registry::{MonitorRegistry, ReconcileReport, RegistryStatus};
pub use result::{CheckResult, FailureKind, LatencyPoint, LatestStatus, Outcome, SeriesStats};
pub use store::{ResultStore, StoreOptions};
pub use target::Target;
pub use target_monitor::{
    MonitorHandle, MonitorState, ProbeContext, TargetMonitor, DEFAULT_CHECK_INTERVAL,
};

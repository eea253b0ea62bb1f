//! 轮询端点描述符
//!
//! 外部调度器为每个轮询端点持有一个描述符，核心只读取配置并累加完成计数。

use std::sync::atomic::{AtomicU64, Ordering};

use crate::server::config::{PollServiceConfig, PollServiceType};

/// 轮询端点描述符
#[derive(Debug)]
pub struct PollServiceDescriptor {
    config: PollServiceConfig,
    /// 已处理请求数（正常完成路径累加，写失败也计入）
    requests_handled: AtomicU64,
}

impl PollServiceDescriptor {
    pub fn new(config: PollServiceConfig) -> Self {
        Self {
            config,
            requests_handled: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &PollServiceConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn service_type(&self) -> PollServiceType {
        self.config.service_type
    }

    /// 当前已处理请求数
    pub fn requests_handled(&self) -> u64 {
        self.requests_handled.load(Ordering::Relaxed)
    }

    /// 累加一次，返回累加后的值
    pub fn record_handled(&self) -> u64 {
        self.requests_handled.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Default for PollServiceDescriptor {
    fn default() -> Self {
        Self::new(PollServiceConfig::default())
    }
}

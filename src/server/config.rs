//! 轮询服务配置

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PollError, PollResult};

/// 轮询端点类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollServiceType {
    /// 事件队列长轮询
    #[default]
    LongPoll,
    LslHttp,
    Inventory,
    Texture,
    Mesh,
    Mesh2,
    Asset,
}

/// 单个轮询端点的配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollServiceConfig {
    /// 端点名称，用于日志
    pub name: String,
    pub service_type: PollServiceType,
    /// 挂起超时（毫秒），由外部调度器使用
    pub timeout_ms: u64,
    /// 读取远端地址的请求头名
    pub remote_addr_header: String,
    /// 读取远端端口的请求头名
    pub remote_port_header: String,
    /// 是否信任前置代理写入的地址/端口头；关闭时总是用 TCP 对端地址覆盖
    pub trust_proxy_headers: bool,
    /// 响应数据未指定 Content-Type 时使用
    pub default_content_type: String,
}

impl Default for PollServiceConfig {
    fn default() -> Self {
        Self {
            name: "poll".to_string(),
            service_type: PollServiceType::LongPoll,
            timeout_ms: 30_000,
            remote_addr_header: "remote_addr".to_string(),
            remote_port_header: "remote_port".to_string(),
            trust_proxy_headers: false,
            default_content_type: "text/html".to_string(),
        }
    }
}

impl PollServiceConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 TOML 文本解析
    pub fn from_toml_str(content: &str) -> PollResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| PollError::Config(format!("解析轮询配置失败: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载
    pub fn from_file<P: AsRef<Path>>(path: P) -> PollResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| PollError::Config(format!("读取配置文件 {} 失败: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// 校验配置
    pub fn validate(&self) -> PollResult<()> {
        if self.remote_addr_header.trim().is_empty() || self.remote_port_header.trim().is_empty() {
            return Err(PollError::Config("远端地址/端口头名不能为空".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(PollError::Config("timeout_ms 必须大于 0".to_string()));
        }
        Ok(())
    }

    /// 挂起超时
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn service_type(mut self, service_type: PollServiceType) -> Self {
        self.service_type = service_type;
        self
    }

    /// 不做修正，0 由 [`validate`](Self::validate) 拒绝
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// 设置读取指纹元数据的头名
    pub fn remote_headers(mut self, addr_header: impl Into<String>, port_header: impl Into<String>) -> Self {
        self.remote_addr_header = addr_header.into();
        self.remote_port_header = port_header.into();
        self
    }

    pub fn trust_proxy_headers(mut self, trusted: bool) -> Self {
        self.trust_proxy_headers = trusted;
        self
    }

    pub fn default_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.default_content_type = content_type.into();
        self
    }
}

/// 长轮询 HTTP 服务器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// HTTP/1.1 keep-alive，轮询完成后的响应仍会要求关闭连接
    pub keep_alive: bool,
    /// 同时服务的最大连接数，`None` 表示不限制
    pub max_connections: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 9000)),
            keep_alive: true,
            max_connections: None,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self { bind_addr, ..Self::default() }
    }

    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }

    pub fn max_connections(mut self, limit: usize) -> Self {
        self.max_connections = Some(limit.max(1));
        self
    }
}

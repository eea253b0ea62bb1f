//! RAT PollServe 服务器模块
//!
//! 长轮询端点配置、请求关联与完成协议、HTTP 传输以及挂起请求登记表

pub mod config;
pub mod http_server;
pub mod pending_registry;
pub mod poll_service;

pub use config::{PollServiceConfig, PollServiceType, ServerConfig};
pub use http_server::{PollHttpServer, PollRequestHandler, ShutdownHandle};
pub use pending_registry::PendingPollRegistry;

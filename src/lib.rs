//! RAT PollServe
//!
//! 长轮询 HTTP 请求的关联与完成协议核心：
//! - 根据连接元数据计算关联指纹，把同一物理连接上的轮询请求归组
//! - 数据就绪后把响应体写回原连接（尽力而为，只完成一次）
//! - 服务关闭时以 503 强制终止挂起的轮询请求
//!
//! 调度器（何时数据就绪、队列与线程池）不在本 crate 范围内，
//! 只通过 [`server::PollRequestHandler`] 与 [`server::PendingPollRegistry`] 对接。

pub mod error;
pub mod server;
pub mod utils;

pub use error::{PollError, PollResult};
pub use server::poll_service::{
    CompletionReport, ConnectionFingerprint, CorrelationKey, PendingPollRequest, PollConnection,
    PollHttpRequest, PollHttpResponse, PollResponseData, PollServiceDescriptor, RandomSource,
    RequestCorrelator, StopOutcome,
};
pub use server::{
    PendingPollRegistry, PollHttpServer, PollRequestHandler, PollServiceConfig, PollServiceType, ServerConfig,
    ShutdownHandle,
};

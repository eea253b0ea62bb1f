//! HTTP 长轮询服务器模块
//!
//! 基于 hyper 的 HTTP/1.1 传输适配与连接处理

pub mod poll_connection;
pub mod poll_transport;

pub use poll_connection::{PollHttpServer, PollRequestHandler, ShutdownHandle, serve_poll_connection};
pub use poll_transport::{HyperPollConnection, HyperPollRequest, HyperPollResponse, PollResponseBody, status_response};

//! 错误类型定义

use std::num::ParseIntError;
use thiserror::Error;

/// 轮询服务错误
#[derive(Debug, Error)]
pub enum PollError {
    /// 端口头无法解析为整数（构造期致命错误）
    #[error("无效的远端端口头: {value:?}")]
    InvalidPortHeader {
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// 对端或等待中的 HTTP 处理流程已经离开
    #[error("连接已关闭: {0}")]
    ConnectionClosed(String),

    #[error("响应已发送")]
    ResponseAlreadySent,

    #[error("无效的响应头: {0}")]
    InvalidHeader(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("HTTP错误: {0}")]
    Hyper(#[from] hyper::Error),
}

impl PollError {
    /// 是否属于客户端正常断开一类的错误
    pub fn is_disconnect(&self) -> bool {
        match self {
            PollError::ConnectionClosed(_) => true,
            PollError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            PollError::Hyper(e) => e.is_incomplete_message() || e.is_canceled() || e.is_closed(),
            _ => false,
        }
    }
}

/// 轮询服务结果类型
pub type PollResult<T> = Result<T, PollError>;

//! HTTP 传输层边界
//!
//! 轮询核心只依赖这里的三个 trait：连接、请求、响应。
//! hyper 上的具体实现见 `server::http_server::poll_transport`。

use std::borrow::Cow;

use async_trait::async_trait;
use hyper::StatusCode;

use crate::error::PollResult;

/// 响应体内容编码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentEncoding {
    #[default]
    Utf8,
}

impl ContentEncoding {
    /// Content-Type 中使用的 charset 名称
    pub fn charset(&self) -> &'static str {
        match self {
            ContentEncoding::Utf8 => "utf-8",
        }
    }
}

/// 底层网络连接
///
/// 连接由 HTTP 层持有，核心只借用（`Arc`），从不关闭它。
/// 同一连接上的多个请求共享同一个 `Arc`，关联判断依赖指针身份。
pub trait PollConnection: Send + Sync + 'static {
    type Request: PollHttpRequest;
    type Response: PollHttpResponse;

    /// 为该连接上的某个请求创建响应对象
    fn create_response(&self, request: &mut Self::Request) -> Self::Response;

    /// 用于日志的连接描述
    fn describe(&self) -> String {
        String::from("<connection>")
    }
}

/// 原始 HTTP 请求
pub trait PollHttpRequest: Send + Sync + 'static {
    /// 头部查找，不存在返回 `None`
    ///
    /// 存在但不是合法文本的值按有损方式解码返回，不能当作缺失。
    fn header(&self, name: &str) -> Option<Cow<'_, str>>;

    /// 请求体是否仍可读
    fn body_can_read(&self) -> bool;

    /// 关闭请求体（幂等）
    fn close_body(&mut self);

    /// 请求路径，仅用于日志
    fn path(&self) -> &str {
        "/"
    }
}

/// 发往客户端的响应
#[async_trait]
pub trait PollHttpResponse: Send {
    fn set_status(&mut self, status: StatusCode);
    fn set_content_type(&mut self, content_type: &str);
    fn set_content_length(&mut self, length: u64);
    fn set_content_encoding(&mut self, encoding: ContentEncoding);
    fn set_send_chunked(&mut self, chunked: bool);
    fn set_keep_alive(&mut self, keep_alive: bool);
    /// 完成后连接是否可以复用给下一个请求
    fn set_reuse_context(&mut self, reuse: bool);
    fn set_header(&mut self, name: &str, value: &str);

    async fn write(&mut self, buf: &[u8]) -> PollResult<()>;
    async fn flush(&mut self) -> PollResult<()>;
    async fn send(&mut self) -> PollResult<()>;
}

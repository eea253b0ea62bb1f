//! 响应完成协议
//!
//! 两条互斥的完成路径：
//! - [`PendingPollRequest::complete`]：写入计算好的响应体，失败记录警告但不外抛，总是计数
//! - [`PendingPollRequest::stop`]：关闭时回 503，失败静默
//!
//! 两个方法都按值消费请求，一个实例只能走其中一条路径一次。
//! 核心从不关闭连接本身，只负责请求体与响应流。

use hyper::StatusCode;

use crate::error::{PollError, PollResult};
use crate::utils::logger::{debug, warn};

use super::payload::PollResponseData;
use super::request::PendingPollRequest;
use super::transport::{ContentEncoding, PollConnection, PollHttpRequest, PollHttpResponse};

/// 正常完成路径的结果
///
/// 传输故障已经记录过日志，调用方不需要再处理。
#[derive(Debug)]
pub enum CompletionReport {
    Delivered { bytes: usize },
    TransportFault(PollError),
}

impl CompletionReport {
    pub fn is_delivered(&self) -> bool {
        matches!(self, CompletionReport::Delivered { .. })
    }
}

/// 强制停止路径的结果
///
/// 关闭流程中的失败属于预期，调用方可以直接丢弃。
#[derive(Debug)]
pub enum StopOutcome {
    Sent,
    Abandoned(PollError),
}

impl StopOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, StopOutcome::Sent)
    }

    /// 显式丢弃结果
    pub fn discard(self) {}
}

impl From<PollResult<()>> for StopOutcome {
    fn from(result: PollResult<()>) -> Self {
        match result {
            Ok(()) => StopOutcome::Sent,
            Err(e) => StopOutcome::Abandoned(e),
        }
    }
}

async fn write_body<R: PollHttpResponse + ?Sized>(response: &mut R, body: &[u8]) -> PollResult<()> {
    response.write(body).await?;
    response.flush().await?;
    response.send().await
}

async fn send_empty<R: PollHttpResponse + ?Sized>(response: &mut R) -> PollResult<()> {
    response.flush().await?;
    response.send().await
}

impl<C: PollConnection> PendingPollRequest<C> {
    /// 把计算好的响应写回原连接
    ///
    /// 无论写入成功与否，端点的已处理计数都会加一。
    pub async fn complete(self, data: &PollResponseData) -> CompletionReport {
        let request_id = self.request_id();
        let PendingPollRequest {
            descriptor,
            connection,
            mut request,
            ..
        } = self;

        let mut response = connection.create_response(&mut request);
        let body = data.apply(&mut response, descriptor.config());

        if request.body_can_read() {
            request.close_body();
        }

        response.set_send_chunked(false);
        response.set_content_length(body.len() as u64);
        response.set_content_encoding(ContentEncoding::Utf8);
        response.set_reuse_context(false);

        let report = match write_body(&mut response, &body).await {
            Ok(()) => {
                debug!(
                    "📤 [轮询服务] {} 请求 {} 已完成，{} 字节 -> {}",
                    descriptor.name(),
                    request_id,
                    body.len(),
                    connection.describe()
                );
                CompletionReport::Delivered { bytes: body.len() }
            }
            Err(e) => {
                warn!("⚠️ [轮询服务] 工作线程写回响应失败 {} ({}): {}", request_id, connection.describe(), e);
                CompletionReport::TransportFault(e)
            }
        };

        descriptor.record_handled();
        report
    }

    /// 以 503 强制终止请求，用于服务关闭
    ///
    /// 不计入已处理数，任何失败都不记录日志。
    pub async fn stop(self) -> StopOutcome {
        let PendingPollRequest {
            connection,
            mut request,
            ..
        } = self;

        let mut response = connection.create_response(&mut request);

        if request.body_can_read() {
            request.close_body();
        }

        response.set_send_chunked(false);
        response.set_content_length(0);
        response.set_content_encoding(ContentEncoding::Utf8);
        response.set_reuse_context(false);
        response.set_keep_alive(false);
        response.set_status(StatusCode::SERVICE_UNAVAILABLE);

        StopOutcome::from(send_empty(&mut response).await)
    }
}

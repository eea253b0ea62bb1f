//! hyper 上的长轮询传输实现
//!
//! 每个 TCP 连接对应一个 [`HyperPollConnection`]，每个请求携带一个 oneshot 发送端，
//! hyper 的 service future 持有接收端一直等待，直到完成流程调用 `send`。
//! 客户端断开时 hyper 丢弃 service future，接收端随之关闭，后续写入得到
//! [`PollError::ConnectionClosed`]。

use std::borrow::Cow;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::http::request::Parts;
use hyper::{Method, Request, Response, StatusCode, Uri};
use tokio::sync::oneshot;

use crate::error::{PollError, PollResult};
use crate::server::config::PollServiceConfig;
use crate::server::poll_service::transport::{ContentEncoding, PollConnection, PollHttpRequest, PollHttpResponse};
use crate::utils::logger::{debug, warn};

/// 长轮询响应体
pub type PollResponseBody = Full<Bytes>;
pub type PollResponseSender = oneshot::Sender<Response<PollResponseBody>>;
pub type PollResponseReceiver = oneshot::Receiver<Response<PollResponseBody>>;

/// 连接ID生成器
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// 只带状态码的空响应，要求关闭连接
pub fn status_response(status: StatusCode) -> Response<PollResponseBody> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

/// 一个已接受的 TCP 连接
pub struct HyperPollConnection<B = Incoming> {
    id: u64,
    remote_addr: SocketAddr,
    _body: PhantomData<fn() -> B>,
}

impl<B> HyperPollConnection<B> {
    pub fn new(remote_addr: SocketAddr) -> Arc<Self> {
        Arc::new(Self {
            id: CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            remote_addr,
            _body: PhantomData,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

impl<B: Send + Sync + 'static> PollConnection for HyperPollConnection<B> {
    type Request = HyperPollRequest<B>;
    type Response = HyperPollResponse;

    fn create_response(&self, request: &mut HyperPollRequest<B>) -> HyperPollResponse {
        HyperPollResponse::new(request.responder.take())
    }

    fn describe(&self) -> String {
        format!("#{}@{}", self.id, self.remote_addr)
    }
}

/// 挂起中的 hyper 请求
pub struct HyperPollRequest<B = Incoming> {
    parts: Parts,
    body: Option<B>,
    responder: Option<PollResponseSender>,
}

impl<B> HyperPollRequest<B> {
    /// 接管 hyper 请求
    ///
    /// 地址/端口头名取自端点配置。信任代理时只补上缺失的头，
    /// 否则总是用 TCP 对端地址覆盖客户端给出的值。
    pub fn from_hyper(
        request: Request<B>,
        remote_addr: SocketAddr,
        config: &PollServiceConfig,
    ) -> (Self, PollResponseReceiver) {
        let (mut parts, body) = request.into_parts();
        let overwrite = !config.trust_proxy_headers;
        set_peer_header(&mut parts.headers, &config.remote_addr_header, &remote_addr.ip().to_string(), overwrite);
        set_peer_header(&mut parts.headers, &config.remote_port_header, &remote_addr.port().to_string(), overwrite);

        let (tx, rx) = oneshot::channel();
        (
            Self {
                parts,
                body: Some(body),
                responder: Some(tx),
            },
            rx,
        )
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// 尚未关闭的请求体
    pub fn body_mut(&mut self) -> Option<&mut B> {
        self.body.as_mut()
    }
}

fn set_peer_header(headers: &mut HeaderMap, name: &str, value: &str, overwrite: bool) {
    let Ok(name) = HeaderName::try_from(name) else {
        warn!("⚠️ [长轮询传输] 无效的元数据头名: {}", name);
        return;
    };
    if !overwrite && headers.contains_key(&name) {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

impl<B: Send + Sync + 'static> PollHttpRequest for HyperPollRequest<B> {
    fn header(&self, name: &str) -> Option<Cow<'_, str>> {
        self.parts
            .headers
            .get(name)
            .map(|v| String::from_utf8_lossy(v.as_bytes()))
    }

    fn body_can_read(&self) -> bool {
        self.body.is_some()
    }

    fn close_body(&mut self) {
        // 丢弃 Incoming 即关闭请求体
        self.body.take();
    }

    fn path(&self) -> &str {
        self.parts.uri.path()
    }
}

/// 缓冲式响应，`send` 时一次性交给等待中的 hyper service
pub struct HyperPollResponse {
    status: StatusCode,
    headers: HeaderMap,
    content_type: Option<String>,
    content_length: Option<u64>,
    encoding: ContentEncoding,
    chunked: bool,
    keep_alive: bool,
    reuse: bool,
    buffer: BytesMut,
    responder: Option<PollResponseSender>,
    sent: bool,
}

impl HyperPollResponse {
    pub fn new(responder: Option<PollResponseSender>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            content_type: None,
            content_length: None,
            encoding: ContentEncoding::Utf8,
            chunked: true,
            keep_alive: true,
            reuse: true,
            buffer: BytesMut::new(),
            responder,
            sent: false,
        }
    }

    fn ensure_open(&self) -> PollResult<()> {
        if self.sent {
            return Err(PollError::ResponseAlreadySent);
        }
        match &self.responder {
            None => Err(PollError::ConnectionClosed("响应通道不可用".to_string())),
            Some(tx) if tx.is_closed() => Err(PollError::ConnectionClosed("客户端已断开".to_string())),
            Some(_) => Ok(()),
        }
    }

    fn build_response(&mut self) -> PollResult<Response<PollResponseBody>> {
        let body = self.buffer.split().freeze();
        let mut headers = std::mem::take(&mut self.headers);

        if let Some(content_type) = &self.content_type {
            let value = if content_type.contains("charset") {
                content_type.clone()
            } else {
                format!("{}; charset={}", content_type, self.encoding.charset())
            };
            let value = HeaderValue::from_str(&value).map_err(|_| PollError::InvalidHeader(value))?;
            headers.insert(header::CONTENT_TYPE, value);
        }

        if !self.chunked {
            let declared = self.content_length.unwrap_or(body.len() as u64);
            if declared != body.len() as u64 {
                return Err(PollError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("Content-Length {} 与响应体长度 {} 不一致", declared, body.len()),
                )));
            }
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(declared));
        }

        if !self.keep_alive || !self.reuse {
            headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        }

        let mut response = Response::new(Full::new(body));
        *response.status_mut() = self.status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

#[async_trait]
impl PollHttpResponse for HyperPollResponse {
    fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    fn set_content_type(&mut self, content_type: &str) {
        self.content_type = Some(content_type.to_string());
    }

    fn set_content_length(&mut self, length: u64) {
        self.content_length = Some(length);
    }

    fn set_content_encoding(&mut self, encoding: ContentEncoding) {
        self.encoding = encoding;
    }

    fn set_send_chunked(&mut self, chunked: bool) {
        self.chunked = chunked;
    }

    fn set_keep_alive(&mut self, keep_alive: bool) {
        self.keep_alive = keep_alive;
    }

    fn set_reuse_context(&mut self, reuse: bool) {
        self.reuse = reuse;
    }

    fn set_header(&mut self, name: &str, value: &str) {
        match (HeaderName::try_from(name), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => warn!("⚠️ [长轮询传输] 忽略无效响应头: {}: {}", name, value),
        }
    }

    async fn write(&mut self, buf: &[u8]) -> PollResult<()> {
        self.ensure_open()?;
        self.buffer.extend_from_slice(buf);
        Ok(())
    }

    async fn flush(&mut self) -> PollResult<()> {
        self.ensure_open()
    }

    async fn send(&mut self) -> PollResult<()> {
        self.ensure_open()?;
        let response = self.build_response()?;
        self.sent = true;
        let tx = self
            .responder
            .take()
            .ok_or_else(|| PollError::ConnectionClosed("响应通道不可用".to_string()))?;
        let status = response.status();
        tx.send(response)
            .map_err(|_| PollError::ConnectionClosed("客户端已断开".to_string()))?;
        debug!("📨 [长轮询传输] 响应已交付: {}", status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::poll_service::{
        CompletionReport, PendingPollRequest, PollResponseData, PollServiceDescriptor,
    };
    use http_body_util::BodyExt;

    type TestConnection = HyperPollConnection<Full<Bytes>>;

    fn peer() -> SocketAddr {
        "192.168.7.20:53111".parse().unwrap()
    }

    fn hyper_request(uri: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .uri(uri)
            .body(Full::new(Bytes::from_static(b"ignored")))
            .unwrap()
    }

    async fn body_of(response: Response<PollResponseBody>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[test]
    fn test_peer_metadata_is_injected() {
        let config = PollServiceConfig::default();
        let (request, _rx) = HyperPollRequest::from_hyper(hyper_request("/poll/1"), peer(), &config);
        assert_eq!(request.header("remote_addr").as_deref(), Some("192.168.7.20"));
        assert_eq!(request.header("remote_port").as_deref(), Some("53111"));
        assert_eq!(request.path(), "/poll/1");
        assert!(request.body_can_read());
    }

    fn with_metadata(addr: &str, port: HeaderValue) -> Request<Full<Bytes>> {
        Request::builder()
            .uri("/poll")
            .header("remote_addr", addr)
            .header("remote_port", port)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    #[test]
    fn test_trusted_proxy_metadata_wins() {
        let config = PollServiceConfig::default().trust_proxy_headers(true);
        let req = with_metadata("203.0.113.5", HeaderValue::from_static("40000, 443"));
        let (request, _rx) = HyperPollRequest::from_hyper(req, peer(), &config);
        assert_eq!(request.header("remote_addr").as_deref(), Some("203.0.113.5"));
        assert_eq!(request.header("remote_port").as_deref(), Some("40000, 443"));
    }

    #[test]
    fn test_untrusted_client_metadata_is_replaced() {
        let config = PollServiceConfig::default();
        let req = with_metadata("203.0.113.5", HeaderValue::from_static("not-a-port"));
        let (request, _rx) = HyperPollRequest::from_hyper(req, peer(), &config);
        assert_eq!(request.header("remote_addr").as_deref(), Some("192.168.7.20"));
        assert_eq!(request.header("remote_port").as_deref(), Some("53111"));

        let descriptor = Arc::new(PollServiceDescriptor::new(config));
        let pending = PendingPollRequest::new(descriptor, TestConnection::new(peer()), request).unwrap();
        assert_eq!(pending.fingerprint().value() & 0xffff, 53111);
    }

    #[test]
    fn test_non_text_port_header_rejects_request() {
        let config = PollServiceConfig::default().trust_proxy_headers(true);
        let port = HeaderValue::from_bytes(b"80\xff").unwrap();
        let (request, _rx) = HyperPollRequest::from_hyper(with_metadata("203.0.113.5", port), peer(), &config);
        // 非文本字节不能被当成缺失的头
        assert!(request.header("remote_port").is_some());

        let descriptor = Arc::new(PollServiceDescriptor::new(config));
        let err = PendingPollRequest::new(descriptor, TestConnection::new(peer()), request).unwrap_err();
        assert!(matches!(err, PollError::InvalidPortHeader { .. }));
    }

    #[test]
    fn test_non_text_address_header_is_hashed_not_randomized() {
        let config = PollServiceConfig::default().trust_proxy_headers(true);
        let descriptor = Arc::new(PollServiceDescriptor::new(config.clone()));
        let addr = HeaderValue::from_bytes(b"10.0.0.\xfe").unwrap();

        let fingerprints: Vec<i32> = (0..2)
            .map(|_| {
                let req = Request::builder()
                    .uri("/poll")
                    .header("remote_addr", addr.clone())
                    .header("remote_port", "4000")
                    .body(Full::new(Bytes::new()))
                    .unwrap();
                let (request, _rx) = HyperPollRequest::from_hyper(req, peer(), &config);
                PendingPollRequest::new(descriptor.clone(), TestConnection::new(peer()), request)
                    .unwrap()
                    .fingerprint()
                    .value()
            })
            .collect();
        assert_eq!(fingerprints[0], fingerprints[1]);
    }

    #[test]
    fn test_connections_get_distinct_ids() {
        let a = TestConnection::new(peer());
        let b = TestConnection::new(peer());
        assert_ne!(a.id(), b.id());
        assert!(a.describe().ends_with("@192.168.7.20:53111"));
    }

    #[tokio::test]
    async fn test_complete_delivers_hyper_response() {
        let descriptor = Arc::new(PollServiceDescriptor::default());
        let connection = TestConnection::new(peer());
        let (request, rx) = HyperPollRequest::from_hyper(hyper_request("/poll"), peer(), descriptor.config());
        let pending = PendingPollRequest::new(descriptor.clone(), connection, request).unwrap();

        let data = PollResponseData::text("{\"events\":[]}").with_content_type("application/json");
        let report = pending.complete(&data).await;
        assert!(report.is_delivered());

        let response = rx.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "application/json; charset=utf-8");
        assert_eq!(headers[header::CONTENT_LENGTH], "13");
        assert_eq!(headers[header::CONNECTION], "close");
        assert_eq!(body_of(response).await, Bytes::from_static(b"{\"events\":[]}"));
        assert_eq!(descriptor.requests_handled(), 1);
    }

    #[tokio::test]
    async fn test_stop_delivers_503() {
        let descriptor = Arc::new(PollServiceDescriptor::default());
        let connection = TestConnection::new(peer());
        let (request, rx) = HyperPollRequest::from_hyper(hyper_request("/poll"), peer(), descriptor.config());
        let pending = PendingPollRequest::new(descriptor.clone(), connection, request).unwrap();

        assert!(pending.stop().await.is_sent());

        let response = rx.await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "0");
        assert_eq!(response.headers()[header::CONNECTION], "close");
        assert!(body_of(response).await.is_empty());
        assert_eq!(descriptor.requests_handled(), 0);
    }

    #[tokio::test]
    async fn test_disconnected_client_is_transport_fault() {
        let descriptor = Arc::new(PollServiceDescriptor::default());
        let connection = TestConnection::new(peer());
        let (request, rx) = HyperPollRequest::from_hyper(hyper_request("/poll"), peer(), descriptor.config());
        let pending = PendingPollRequest::new(descriptor.clone(), connection, request).unwrap();
        drop(rx);

        let report = pending.complete(&PollResponseData::text("late")).await;
        assert!(matches!(report, CompletionReport::TransportFault(PollError::ConnectionClosed(_))));
        assert_eq!(descriptor.requests_handled(), 1);
    }

    #[tokio::test]
    async fn test_response_cannot_be_sent_twice() {
        let (tx, _rx) = oneshot::channel();
        let mut response = HyperPollResponse::new(Some(tx));
        response.write(b"once").await.unwrap();
        response.send().await.unwrap();
        assert!(matches!(response.send().await, Err(PollError::ResponseAlreadySent)));
        assert!(matches!(response.write(b"x").await, Err(PollError::ResponseAlreadySent)));
    }

    #[tokio::test]
    async fn test_declared_length_mismatch_is_rejected() {
        let (tx, _rx) = oneshot::channel();
        let mut response = HyperPollResponse::new(Some(tx));
        response.set_send_chunked(false);
        response.set_content_length(10);
        response.write(b"short").await.unwrap();
        assert!(matches!(response.send().await, Err(PollError::Io(_))));
    }

    #[test]
    fn test_status_response() {
        let response = status_response(StatusCode::BAD_REQUEST);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[header::CONNECTION], "close");
    }
}

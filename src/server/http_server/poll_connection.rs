//! 长轮询 HTTP/1.1 连接处理
//!
//! 接受 TCP 连接，为每个连接创建一个 [`HyperPollConnection`]，
//! 每个请求包装为 [`PendingPollRequest`] 交给外部调度器，然后挂起等待响应。

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, watch};

use crate::error::PollResult;
use crate::server::config::ServerConfig;
use crate::server::poll_service::{PendingPollRequest, PollServiceDescriptor};
use crate::utils::logger::{debug, error, info, warn};

use super::poll_transport::{HyperPollConnection, HyperPollRequest, PollResponseBody, status_response};

/// 外部调度器的接入点
///
/// `on_request` 只负责登记，不应阻塞；数据就绪后由调度器调用
/// `complete`，关闭时调用 `stop`。
pub trait PollRequestHandler: Send + Sync + 'static {
    fn descriptor(&self) -> Arc<PollServiceDescriptor>;

    fn on_request(&self, request: PendingPollRequest<HyperPollConnection>);
}

/// 关闭句柄，可跨任务克隆
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// 停止接受新连接，已有连接进入优雅关闭
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

/// 长轮询 HTTP 服务器
pub struct PollHttpServer<H: PollRequestHandler> {
    listener: TcpListener,
    config: ServerConfig,
    handler: Arc<H>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl<H: PollRequestHandler> PollHttpServer<H> {
    /// 校验端点配置并绑定监听地址
    pub async fn bind(config: ServerConfig, handler: Arc<H>) -> PollResult<Self> {
        handler.descriptor().config().validate()?;
        let listener = TcpListener::bind(config.bind_addr).await?;
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            listener,
            config,
            handler,
            shutdown_tx: Arc::new(shutdown_tx),
        })
    }

    /// 实际监听地址（端口为 0 时由系统分配）
    pub fn local_addr(&self) -> PollResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// 运行接受循环，直到收到关闭信号
    pub async fn run(self) -> PollResult<()> {
        let local_addr = self.local_addr()?;
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let limiter = self.config.max_connections.map(|limit| Arc::new(Semaphore::new(limit)));
        info!(
            "🚀 [长轮询服务器] {} ({:?}) 监听于 http://{}",
            self.handler.descriptor().name(),
            self.handler.descriptor().service_type(),
            local_addr
        );

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!("⚠️ [长轮询服务器] 接受连接失败: {}", e);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            continue;
                        }
                    };

                    let permit = match &limiter {
                        Some(limiter) => match limiter.clone().try_acquire_owned() {
                            Ok(permit) => Some(permit),
                            Err(_) => {
                                warn!("🚫 [长轮询服务器] 连接数已达上限，拒绝: {}", remote_addr);
                                drop(stream);
                                continue;
                            }
                        },
                        None => None,
                    };

                    let handler = self.handler.clone();
                    let keep_alive = self.config.keep_alive;
                    let shutdown = self.shutdown_tx.subscribe();
                    tokio::spawn(async move {
                        let _permit = permit;
                        if let Err(e) = serve_poll_connection(stream, remote_addr, handler, keep_alive, shutdown).await {
                            if e.is_disconnect() {
                                debug!("🔌 [长轮询服务器] 客户端断开连接: {} ({})", remote_addr, e);
                            } else {
                                error!("❌ [长轮询服务器] 连接处理失败: {} ({})", remote_addr, e);
                            }
                        }
                    });
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("🛑 [长轮询服务器] 停止接受新连接: {}", local_addr);
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

/// 处理单个 HTTP/1.1 连接
pub async fn serve_poll_connection<H: PollRequestHandler>(
    stream: TcpStream,
    remote_addr: SocketAddr,
    handler: Arc<H>,
    keep_alive: bool,
    mut shutdown: watch::Receiver<bool>,
) -> PollResult<()> {
    debug!("🔗 [长轮询服务器] 新连接: {}", remote_addr);

    let connection: Arc<HyperPollConnection> = HyperPollConnection::new(remote_addr);
    let io = TokioIo::new(stream);
    let service = service_fn(move |req: Request<Incoming>| {
        let handler = handler.clone();
        let connection = connection.clone();
        async move { Ok::<_, Infallible>(dispatch_poll_request(req, remote_addr, connection, handler).await) }
    });

    let conn = http1::Builder::new()
        .keep_alive(keep_alive)
        .serve_connection(io, service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => result?,
        _ = shutdown.changed() => {
            conn.as_mut().graceful_shutdown();
            conn.await?;
        }
    }

    debug!("🔌 [长轮询服务器] 连接关闭: {}", remote_addr);
    Ok(())
}

/// 登记请求并等待调度器给出响应
async fn dispatch_poll_request<H: PollRequestHandler>(
    req: Request<Incoming>,
    remote_addr: SocketAddr,
    connection: Arc<HyperPollConnection>,
    handler: Arc<H>,
) -> Response<PollResponseBody> {
    let descriptor = handler.descriptor();
    let (request, receiver) = HyperPollRequest::from_hyper(req, remote_addr, descriptor.config());

    let pending = match PendingPollRequest::new(descriptor, connection, request) {
        Ok(pending) => pending,
        Err(e) => {
            warn!("🚫 [长轮询服务器] 拒绝请求 {}: {}", remote_addr, e);
            return status_response(StatusCode::BAD_REQUEST);
        }
    };

    handler.on_request(pending);

    match receiver.await {
        Ok(response) => response,
        Err(_) => {
            // 调度器丢弃了请求而没有完成它
            debug!("🔍 [长轮询服务器] 请求未被完成即被丢弃: {}", remote_addr);
            status_response(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

//! 挂起的长轮询请求

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::error::PollResult;
use crate::utils::logger::debug;

use super::descriptor::PollServiceDescriptor;
use super::fingerprint::{ConnectionFingerprint, RandomSource};
use super::transport::{PollConnection, PollHttpRequest};

/// 一个尚未完成的长轮询请求
///
/// 创建于请求到达时，指纹在构造时一次性计算，此后不再改变。
/// 完成方法（[`complete`](Self::complete) / [`stop`](Self::stop)）按值消费 `self`，
/// 同一个实例只能完成一次，两条路径互斥。
pub struct PendingPollRequest<C: PollConnection> {
    pub(crate) descriptor: Arc<PollServiceDescriptor>,
    pub(crate) connection: Arc<C>,
    pub(crate) request: C::Request,
    arrival_time: Instant,
    request_id: Uuid,
    fingerprint: ConnectionFingerprint,
}

impl<C: PollConnection> PendingPollRequest<C> {
    /// 使用线程本地随机源构造
    ///
    /// 端口头无法解析时返回错误，请求不应进入挂起集合。
    pub fn new(
        descriptor: Arc<PollServiceDescriptor>,
        connection: Arc<C>,
        request: C::Request,
    ) -> PollResult<Self> {
        Self::with_random_source(descriptor, connection, request, &mut rand::thread_rng())
    }

    /// 使用指定随机源构造
    pub fn with_random_source<R: RandomSource + ?Sized>(
        descriptor: Arc<PollServiceDescriptor>,
        connection: Arc<C>,
        request: C::Request,
        rng: &mut R,
    ) -> PollResult<Self> {
        let config = descriptor.config();
        let fingerprint = {
            let remote_addr = request.header(&config.remote_addr_header);
            let remote_port = request.header(&config.remote_port_header);
            ConnectionFingerprint::compute(remote_addr.as_deref(), remote_port.as_deref(), rng)?
        };
        let request_id = Uuid::new_v4();

        debug!(
            "📥 [轮询服务] {} 新挂起请求 {} 指纹={} 连接={}",
            descriptor.name(),
            request_id,
            fingerprint,
            connection.describe()
        );

        Ok(Self {
            descriptor,
            connection,
            request,
            arrival_time: Instant::now(),
            request_id,
            fingerprint,
        })
    }

    pub fn fingerprint(&self) -> ConnectionFingerprint {
        self.fingerprint
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn arrival_time(&self) -> Instant {
        self.arrival_time
    }

    /// 已挂起时长
    pub fn elapsed(&self) -> Duration {
        self.arrival_time.elapsed()
    }

    /// 是否已超过给定超时，供调度器判断
    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.elapsed() >= timeout
    }

    pub fn connection(&self) -> &Arc<C> {
        &self.connection
    }

    pub fn request(&self) -> &C::Request {
        &self.request
    }

    pub fn descriptor(&self) -> &Arc<PollServiceDescriptor> {
        &self.descriptor
    }
}

impl<C: PollConnection> fmt::Debug for PendingPollRequest<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingPollRequest")
            .field("service", &self.descriptor.name())
            .field("request_id", &self.request_id)
            .field("fingerprint", &self.fingerprint)
            .field("connection", &self.connection.describe())
            .field("path", &self.request.path())
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

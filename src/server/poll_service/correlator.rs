//! 请求关联器
//!
//! 两级比较：指纹做快速分桶，连接身份（`Arc` 指针相等）做最终确认。
//! 指纹相同但连接不同的两个请求不相等。

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::fingerprint::ConnectionFingerprint;
use super::request::PendingPollRequest;
use super::transport::PollConnection;

/// 关联比较策略
pub struct RequestCorrelator;

impl RequestCorrelator {
    /// 分桶用哈希值，即指纹
    pub fn hash_code<C: PollConnection>(request: &PendingPollRequest<C>) -> i32 {
        request.fingerprint().value()
    }

    /// 两个请求是否来自同一物理连接
    pub fn equals<C: PollConnection>(a: &PendingPollRequest<C>, b: &PendingPollRequest<C>) -> bool {
        Self::matches(a.fingerprint(), a.connection(), b.fingerprint(), b.connection())
    }

    fn matches<C>(fa: ConnectionFingerprint, ca: &Arc<C>, fb: ConnectionFingerprint, cb: &Arc<C>) -> bool {
        if fa != fb {
            return false;
        }
        Arc::ptr_eq(ca, cb)
    }
}

impl<C: PollConnection> Hash for PendingPollRequest<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_i32(RequestCorrelator::hash_code(self));
    }
}

impl<C: PollConnection> PartialEq for PendingPollRequest<C> {
    fn eq(&self, other: &Self) -> bool {
        RequestCorrelator::equals(self, other)
    }
}

impl<C: PollConnection> Eq for PendingPollRequest<C> {}

/// 关联键：不持有请求本身，可作为 map 的键长期保存
pub struct CorrelationKey<C> {
    fingerprint: ConnectionFingerprint,
    connection: Arc<C>,
}

impl<C> CorrelationKey<C> {
    pub fn new(fingerprint: ConnectionFingerprint, connection: Arc<C>) -> Self {
        Self { fingerprint, connection }
    }

    pub fn fingerprint(&self) -> ConnectionFingerprint {
        self.fingerprint
    }

    pub fn connection(&self) -> &Arc<C> {
        &self.connection
    }
}

impl<C: PollConnection> PendingPollRequest<C> {
    /// 该请求的关联键
    pub fn correlation_key(&self) -> CorrelationKey<C> {
        CorrelationKey::new(self.fingerprint(), self.connection().clone())
    }
}

impl<C> Clone for CorrelationKey<C> {
    fn clone(&self) -> Self {
        Self {
            fingerprint: self.fingerprint,
            connection: self.connection.clone(),
        }
    }
}

impl<C> Hash for CorrelationKey<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_i32(self.fingerprint.value());
    }
}

impl<C> PartialEq for CorrelationKey<C> {
    fn eq(&self, other: &Self) -> bool {
        RequestCorrelator::matches(self.fingerprint, &self.connection, other.fingerprint, &other.connection)
    }
}

impl<C> Eq for CorrelationKey<C> {}

impl<C> fmt::Debug for CorrelationKey<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationKey")
            .field("fingerprint", &self.fingerprint)
            .field("connection", &Arc::as_ptr(&self.connection))
            .finish()
    }
}

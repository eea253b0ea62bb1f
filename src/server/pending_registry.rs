//! 挂起请求登记表
//!
//! 调度器一侧的挂起集合：按请求ID存放，按关联键分组。
//! `take` 是原子移除，保证同一请求最多被分发一次完成。

use std::time::Duration;

use dashmap::DashMap;
use uuid::Uuid;

use crate::server::poll_service::{CorrelationKey, PendingPollRequest, PollConnection};
use crate::utils::logger::{debug, info};

/// 挂起请求登记表
pub struct PendingPollRegistry<C: PollConnection> {
    /// 请求ID -> 挂起请求
    requests: DashMap<Uuid, PendingPollRequest<C>>,
    /// 关联键 -> 请求ID列表
    groups: DashMap<CorrelationKey<C>, Vec<Uuid>>,
}

impl<C: PollConnection> PendingPollRegistry<C> {
    pub fn new() -> Self {
        Self {
            requests: DashMap::new(),
            groups: DashMap::new(),
        }
    }

    /// 登记挂起请求，返回请求ID
    pub fn insert(&self, request: PendingPollRequest<C>) -> Uuid {
        let request_id = request.request_id();
        self.groups
            .entry(request.correlation_key())
            .or_default()
            .push(request_id);
        self.requests.insert(request_id, request);
        request_id
    }

    /// 取出请求用于完成；同一ID第二次取出返回 `None`
    pub fn take(&self, request_id: &Uuid) -> Option<PendingPollRequest<C>> {
        let (_, request) = self.requests.remove(request_id)?;
        let key = request.correlation_key();
        if let Some(mut ids) = self.groups.get_mut(&key) {
            ids.retain(|id| id != request_id);
        }
        self.groups.remove_if(&key, |_, ids| ids.is_empty());
        Some(request)
    }

    /// 与给定关联键同属一个物理连接的挂起请求ID
    pub fn group_of(&self, key: &CorrelationKey<C>) -> Vec<Uuid> {
        self.groups.get(key).map(|ids| ids.clone()).unwrap_or_default()
    }

    /// 取出同一物理连接上的全部挂起请求
    pub fn take_group(&self, key: &CorrelationKey<C>) -> Vec<PendingPollRequest<C>> {
        self.group_of(key).iter().filter_map(|id| self.take(id)).collect()
    }

    /// 取出已超时的请求，由调用方决定如何完成
    pub fn take_expired(&self, timeout: Duration) -> Vec<PendingPollRequest<C>> {
        let expired: Vec<Uuid> = self
            .requests
            .iter()
            .filter(|entry| entry.value().is_expired(timeout))
            .map(|entry| *entry.key())
            .collect();

        if !expired.is_empty() {
            debug!("⏰ [挂起登记表] {} 个请求超时", expired.len());
        }
        expired.iter().filter_map(|id| self.take(id)).collect()
    }

    /// 取出全部挂起请求
    pub fn drain(&self) -> Vec<PendingPollRequest<C>> {
        let ids: Vec<Uuid> = self.requests.iter().map(|entry| *entry.key()).collect();
        ids.iter().filter_map(|id| self.take(id)).collect()
    }

    /// 关闭时以 503 终止全部挂起请求，返回终止的数量
    pub async fn stop_all(&self) -> usize {
        let pending = self.drain();
        let count = pending.len();
        for request in pending {
            request.stop().await.discard();
        }
        if count > 0 {
            info!("🧹 [挂起登记表] 强制终止 {} 个挂起请求", count);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// 当前分组（物理连接）数量
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

impl<C: PollConnection> Default for PendingPollRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

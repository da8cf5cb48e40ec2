//! 端点状态注册表
//!
//! 每个端点任务通过 `watch` 通道发布状态快照，注册表持有所有接收端，
//! 查询时只读取最新快照，不会阻塞端点任务。

use crate::error::EngineError;
use crate::health::result::EndpointStatus;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

/// 单个端点的状态句柄
#[derive(Debug, Clone)]
pub struct StatusHandle {
    receiver: watch::Receiver<Arc<EndpointStatus>>,
}

impl StatusHandle {
    pub(crate) fn new(receiver: watch::Receiver<Arc<EndpointStatus>>) -> Self {
        Self { receiver }
    }

    /// 获取最新的状态快照
    pub fn snapshot(&self) -> Arc<EndpointStatus> {
        Arc::clone(&self.receiver.borrow())
    }

    /// 等待状态发生变化
    ///
    /// 端点任务结束后返回 `false`。
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }
}

/// 端点状态注册表，可在多个查询方之间克隆共享
#[derive(Debug, Clone, Default)]
pub struct StatusRegistry {
    handles: Arc<BTreeMap<String, StatusHandle>>,
}

impl StatusRegistry {
    /// 创建注册表
    pub fn new(handles: BTreeMap<String, StatusHandle>) -> Self {
        Self {
            handles: Arc::new(handles),
        }
    }

    /// 获取端点状态快照
    ///
    /// # 参数
    /// * `name` - 端点名称
    ///
    /// # 返回
    /// * `Result<Arc<EndpointStatus>, EngineError>` - 状态快照，端点不存在时返回 `NotFound`
    pub fn get_status(&self, name: &str) -> Result<Arc<EndpointStatus>, EngineError> {
        self.handles
            .get(name)
            .map(StatusHandle::snapshot)
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    /// 获取端点最近一次检测的输出
    ///
    /// 端点不存在时返回 `NotFound`，最近结果没有输出时返回 `NotAvailable`。
    pub fn get_latest_output(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        let status = self.get_status(name)?;
        status
            .latest_outcome
            .output
            .clone()
            .ok_or_else(|| EngineError::NotAvailable(name.to_string()))
    }

    /// 所有端点名称，按字典序排列
    pub fn list_endpoint_names(&self) -> Vec<String> {
        self.handles.keys().cloned().collect()
    }

    /// 获取端点的状态句柄
    pub fn handle(&self, name: &str) -> Option<StatusHandle> {
        self.handles.get(name).cloned()
    }

    /// 端点数量
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// 是否没有任何端点
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::result::{CheckOutcome, CheckStatus};
    use chrono::Utc;

    fn registry_with(
        names: &[&str],
    ) -> (StatusRegistry, Vec<watch::Sender<Arc<EndpointStatus>>>) {
        let mut handles = BTreeMap::new();
        let mut senders = Vec::new();
        for name in names {
            let (tx, rx) = watch::channel(Arc::new(EndpointStatus::new()));
            handles.insert(name.to_string(), StatusHandle::new(rx));
            senders.push(tx);
        }
        (StatusRegistry::new(handles), senders)
    }

    #[test]
    fn test_list_endpoint_names_sorted() {
        let (registry, _senders) = registry_with(&["zeta", "alpha", "mid"]);
        assert_eq!(registry.list_endpoint_names(), vec!["alpha", "mid", "zeta"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_get_status_unknown_endpoint() {
        let (registry, _senders) = registry_with(&["api"]);
        assert_eq!(
            registry.get_status("missing").unwrap_err(),
            EngineError::NotFound("missing".to_string())
        );
        assert_eq!(
            registry.get_latest_output("missing").unwrap_err(),
            EngineError::NotFound("missing".to_string())
        );
    }

    #[test]
    fn test_snapshot_follows_published_status() {
        let (registry, senders) = registry_with(&["api"]);
        let initial = registry.get_status("api").unwrap();
        assert_eq!(initial.status(), CheckStatus::Unknown);

        let mut status = EndpointStatus::new();
        status.record(CheckOutcome::ok().with_output(b"pong".to_vec()), Utc::now());
        senders[0].send_replace(Arc::new(status));

        let latest = registry.get_status("api").unwrap();
        assert_eq!(latest.status(), CheckStatus::Ok);
        assert_eq!(registry.get_latest_output("api").unwrap(), b"pong".to_vec());

        // 之前取得的快照不受影响
        assert_eq!(initial.status(), CheckStatus::Unknown);
    }

    #[test]
    fn test_output_not_available() {
        let (registry, senders) = registry_with(&["api"]);
        assert_eq!(
            registry.get_latest_output("api").unwrap_err(),
            EngineError::NotAvailable("api".to_string())
        );

        let mut status = EndpointStatus::new();
        status.record(CheckOutcome::nok("down"), Utc::now());
        senders[0].send_replace(Arc::new(status));
        assert!(matches!(
            registry.get_latest_output("api"),
            Err(EngineError::NotAvailable(_))
        ));
    }
}

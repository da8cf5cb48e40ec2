//! 告警发送器模块
//!
//! 定义告警记录、告警发送的trait和基础实现

use crate::error::AlertError;
use crate::health::EndpointStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

/// 告警记录，分发给每个告警发送器
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertRecord {
    /// 端点名称
    pub endpoint_name: String,
    /// 端点是否正常
    pub ok: bool,
    /// 错误信息，正常时为空字符串
    pub error: String,
    /// 查看最近输出的URL
    pub output_url: String,
    /// 连续相同状态的周期数
    pub consecutive: u32,
    /// 最近一次正常的时间
    pub latest_ok_at: Option<DateTime<Utc>>,
    /// 最近一次异常的时间
    pub latest_nok_at: Option<DateTime<Utc>>,
}

impl AlertRecord {
    /// 根据端点状态创建告警记录
    ///
    /// # 参数
    /// * `endpoint_name` - 端点名称
    /// * `status` - 端点状态快照
    /// * `output_url` - 输出查询URL
    pub fn from_status(
        endpoint_name: impl Into<String>,
        status: &EndpointStatus,
        output_url: impl Into<String>,
    ) -> Self {
        let ok = status.status().is_ok();
        let error = if ok {
            String::new()
        } else {
            status.latest_outcome.error.clone().unwrap_or_default()
        };

        Self {
            endpoint_name: endpoint_name.into(),
            ok,
            error,
            output_url: output_url.into(),
            consecutive: status.consecutive,
            latest_ok_at: status.latest_ok_at,
            latest_nok_at: status.latest_nok_at,
        }
    }

    /// 状态描述文本
    pub fn status_text(&self) -> &'static str {
        if self.ok {
            "OK"
        } else {
            "NOT OK"
        }
    }

    /// 告警标题
    pub fn title(&self) -> String {
        format!(
            "[{}] endpoint [{}] is {}",
            crate::APP_NAME,
            self.endpoint_name,
            self.status_text()
        )
    }
}

/// 告警发送器trait
///
/// 发送器之间互相独立，失败只影响自身。
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// 发送器名称，用于日志
    fn name(&self) -> &str;

    /// 发送告警
    ///
    /// # 参数
    /// * `record` - 告警记录
    ///
    /// # 返回
    /// * `Result<(), AlertError>` - 发送结果
    async fn send(&self, record: &AlertRecord) -> Result<(), AlertError>;
}

/// 只记录日志的告警发送器（未配置任何通道时使用）
#[derive(Debug, Default, Clone)]
pub struct NoOpSink;

#[async_trait]
impl AlertSink for NoOpSink {
    fn name(&self) -> &str {
        "noop"
    }

    async fn send(&self, record: &AlertRecord) -> Result<(), AlertError> {
        info!(
            endpoint = %record.endpoint_name,
            consecutive = record.consecutive,
            "{}",
            record.title()
        );
        Ok(())
    }
}

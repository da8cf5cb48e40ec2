//! 检测结果与端点状态数据结构
//!
//! 定义单次检测结果、端点状态机以及发送给告警分发器的状态事件

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 检测状态枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    /// 尚未检测
    #[default]
    Unknown,
    /// 端点正常
    Ok,
    /// 端点异常
    Nok,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckStatus::Unknown => write!(f, "UNKNOWN"),
            CheckStatus::Ok => write!(f, "OK"),
            CheckStatus::Nok => write!(f, "NOK"),
        }
    }
}

impl CheckStatus {
    /// 判断状态是否为正常
    pub fn is_ok(&self) -> bool {
        matches!(self, CheckStatus::Ok)
    }

    /// 判断状态是否已知（执行过至少一次检测）
    pub fn is_known(&self) -> bool {
        !matches!(self, CheckStatus::Unknown)
    }
}

/// 单次检测结果
///
/// 输出内容不参与JSON序列化，通过单独的输出查询接口获取。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    /// 检测状态
    pub status: CheckStatus,
    /// 错误信息（状态为NOK或UNKNOWN时）
    pub error: Option<String>,
    /// 检测产生的输出
    #[serde(skip)]
    pub output: Option<Vec<u8>>,
}

impl CheckOutcome {
    /// 创建正常结果
    pub fn ok() -> Self {
        Self {
            status: CheckStatus::Ok,
            error: None,
            output: None,
        }
    }

    /// 创建异常结果
    pub fn nok(error: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Nok,
            error: Some(error.into()),
            output: None,
        }
    }

    /// 创建未知结果
    pub fn unknown(reason: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Unknown,
            error: Some(reason.into()),
            output: None,
        }
    }

    /// 设置输出
    pub fn with_output(mut self, output: Vec<u8>) -> Self {
        self.output = Some(output);
        self
    }
}

impl std::fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error {
            Some(error) => write!(f, "{{status: {}, error: {}}}", self.status, error),
            None => write!(f, "{{status: {}}}", self.status),
        }
    }
}

/// 端点状态
///
/// 由所属的端点任务独占修改，外部只能拿到快照副本。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointStatus {
    /// 最近一次检测结果
    pub latest_outcome: CheckOutcome,
    /// 与最近结果状态相同的连续周期数，至少为1
    pub consecutive: u32,
    /// 最近一次正常的时间
    pub latest_ok_at: Option<DateTime<Utc>>,
    /// 最近一次异常的时间
    pub latest_nok_at: Option<DateTime<Utc>>,
}

impl Default for EndpointStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointStatus {
    /// 创建初始状态：UNKNOWN，连续次数为1，没有时间戳
    pub fn new() -> Self {
        Self {
            latest_outcome: CheckOutcome::unknown("no check performed yet"),
            consecutive: 1,
            latest_ok_at: None,
            latest_nok_at: None,
        }
    }

    /// 记录一个检测周期的结果
    ///
    /// 状态与上次不同时连续次数重置为1，否则加1；
    /// 只有OK更新最近正常时间，只有NOK更新最近异常时间。
    pub fn record(&mut self, outcome: CheckOutcome, now: DateTime<Utc>) {
        if outcome.status == self.latest_outcome.status {
            self.consecutive = self.consecutive.saturating_add(1);
        } else {
            self.consecutive = 1;
        }

        match outcome.status {
            CheckStatus::Ok => self.latest_ok_at = Some(now),
            CheckStatus::Nok => self.latest_nok_at = Some(now),
            CheckStatus::Unknown => {}
        }

        self.latest_outcome = outcome;
    }

    /// 最近一次检测的状态
    pub fn status(&self) -> CheckStatus {
        self.latest_outcome.status
    }

    /// 本周期是否发生了状态变化（初始UNKNOWN不算）
    pub fn is_transition(&self) -> bool {
        self.consecutive == 1 && self.latest_outcome.status.is_known()
    }
}

/// 状态事件，每个检测周期结束时发送一次
#[derive(Debug, Clone)]
pub struct StatusEvent {
    /// 端点名称
    pub endpoint_name: String,
    /// 本周期结束后的端点状态
    pub status: Arc<EndpointStatus>,
}

impl StatusEvent {
    /// 创建状态事件
    pub fn new(endpoint_name: impl Into<String>, status: Arc<EndpointStatus>) -> Self {
        Self {
            endpoint_name: endpoint_name.into(),
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_check_status_display() {
        assert_eq!(CheckStatus::Unknown.to_string(), "UNKNOWN");
        assert_eq!(CheckStatus::Ok.to_string(), "OK");
        assert_eq!(CheckStatus::Nok.to_string(), "NOK");
    }

    #[test]
    fn test_initial_status() {
        let status = EndpointStatus::new();
        assert_eq!(status.status(), CheckStatus::Unknown);
        assert_eq!(status.consecutive, 1);
        assert!(status.latest_ok_at.is_none());
        assert!(status.latest_nok_at.is_none());
        assert!(!status.is_transition());
    }

    #[test]
    fn test_consecutive_counting() {
        let mut status = EndpointStatus::new();
        let t0 = Utc::now();

        status.record(CheckOutcome::ok(), t0);
        assert_eq!(status.consecutive, 1);
        assert!(status.is_transition());

        status.record(CheckOutcome::ok(), t0 + Duration::seconds(1));
        assert_eq!(status.consecutive, 2);
        assert!(!status.is_transition());

        status.record(CheckOutcome::nok("boom"), t0 + Duration::seconds(2));
        assert_eq!(status.consecutive, 1);
        assert!(status.is_transition());

        status.record(CheckOutcome::nok("boom"), t0 + Duration::seconds(3));
        status.record(CheckOutcome::nok("boom"), t0 + Duration::seconds(4));
        assert_eq!(status.consecutive, 3);
    }

    #[test]
    fn test_timestamps_follow_status() {
        let mut status = EndpointStatus::new();
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(10);

        status.record(CheckOutcome::ok(), t0);
        assert_eq!(status.latest_ok_at, Some(t0));
        assert!(status.latest_nok_at.is_none());

        status.record(CheckOutcome::nok("down"), t1);
        assert_eq!(status.latest_ok_at, Some(t0));
        assert_eq!(status.latest_nok_at, Some(t1));

        // UNKNOWN 不更新任何时间戳
        status.record(CheckOutcome::unknown("skipped"), t1 + Duration::seconds(10));
        assert_eq!(status.latest_ok_at, Some(t0));
        assert_eq!(status.latest_nok_at, Some(t1));
        assert_eq!(status.consecutive, 1);
    }

    #[test]
    fn test_output_not_serialized() {
        let outcome = CheckOutcome::ok().with_output(b"hello".to_vec());
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "OK");
        assert!(json.get("output").is_none());
    }
}

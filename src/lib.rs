//! Endpoint Watcher - 端点健康监控工具
//!
//! 周期性检测一组远程端点，支持：
//! - 每个端点独立的检测任务与重试策略
//! - 端点状态跟踪与快照查询
//! - 状态变化告警与持续异常提醒
//! - 飞书兼容的webhook告警
//! - 结构化日志记录

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod logging;
pub mod notification;
pub mod signal;
pub mod web;

// 重新导出主要类型
pub use config::{Config, EndpointConfig};
pub use engine::{Engine, EndpointSpec, EngineOptions};
pub use error::WatcherError;
pub use health::{CheckOutcome, CheckStatus, Checker, EndpointStatus, Schedule};
pub use notification::{AlertRecord, AlertSink};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

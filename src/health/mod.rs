//! 健康检测模块
//!
//! 提供检测器、重试策略、端点检测任务和状态查询功能

pub mod checker;
pub mod registry;
pub mod result;
pub mod retry;
pub mod task;

// 重新导出主要类型
pub use checker::{build_checker, Checker, HttpCheck, HttpChecker};
pub use registry::{StatusHandle, StatusRegistry};
pub use result::{CheckOutcome, CheckStatus, EndpointStatus, StatusEvent};
pub use retry::{CycleResult, RetryPolicy, Schedule};
pub use task::EndpointTask;

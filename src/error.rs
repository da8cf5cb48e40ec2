//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use thiserror::Error;

/// Endpoint Watcher 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum WatcherError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 检测器相关错误
    #[error("检测器错误: {0}")]
    Check(#[from] CheckError),

    /// 告警相关错误
    #[error("告警错误: {0}")]
    Alert(#[from] AlertError),

    /// 引擎相关错误
    #[error("引擎错误: {0}")]
    Engine(#[from] EngineError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 检测器构建错误类型
///
/// 只在引擎构建阶段出现；运行期的单次检测失败不会产生错误，而是体现为 NOK 结果。
#[derive(Error, Debug)]
pub enum CheckError {
    /// 检测器构建失败
    #[error("端点 {endpoint} 的检测器构建失败: {reason}")]
    Build { endpoint: String, reason: String },

    /// 未知的检测类型
    #[error("未知的检测类型: {0}")]
    UnknownType(String),

    /// 检测参数无效
    #[error("检测参数无效: {0}")]
    InvalidPayload(String),

    /// HTTP客户端错误
    #[error("HTTP客户端错误: {0}")]
    Request(#[from] reqwest::Error),
}

/// 告警错误类型
#[derive(Error, Debug)]
pub enum AlertError {
    /// 发送失败
    #[error("告警发送失败: {0}")]
    SendError(String),

    /// 模板渲染错误
    #[error("模板渲染失败: {0}")]
    TemplateError(String),

    /// 配置错误
    #[error("告警配置错误: {0}")]
    ConfigError(String),

    /// 发送超时
    #[error("告警发送超时")]
    Timeout,
}

/// 引擎与状态查询错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// 引擎已经启动
    #[error("引擎已经启动")]
    AlreadyStarted,

    /// 端点不存在
    #[error("端点不存在: {0}")]
    NotFound(String),

    /// 端点尚无输出
    #[error("端点尚无输出: {0}")]
    NotAvailable(String),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, WatcherError>;

//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Endpoint Watcher - 端点健康监控工具
#[derive(Parser, Debug, Clone)]
#[command(
    name = "endpoint-watcher",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径",
        env = "ENDPOINT_WATCHER_CONFIG",
        global = true
    )]
    pub config: Option<PathBuf>,

    /// 日志级别
    #[arg(
        short,
        long,
        value_enum,
        default_value = "info",
        help = "日志级别",
        env = "ENDPOINT_WATCHER_LOG_LEVEL",
        global = true
    )]
    pub log_level: LogLevel,

    /// 以JSON格式输出日志
    #[arg(long, help = "以JSON格式输出日志", global = true)]
    pub json_logs: bool,

    /// 子命令
    #[command(subcommand)]
    pub command: Commands,
}

impl Args {
    /// 获取配置文件路径，未指定时使用默认路径
    pub fn get_config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::get_default_config_path)
    }
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    /// 跟踪级别
    Trace,
    /// 调试级别
    Debug,
    /// 信息级别
    Info,
    /// 警告级别
    Warn,
    /// 错误级别
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// 子命令定义
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// 启动端点监控，直到收到终止信号
    Run {
        /// 关闭超时时间（秒）
        #[arg(
            long,
            value_name = "SECONDS",
            default_value = "30",
            help = "等待任务退出的超时时间（秒）"
        )]
        shutdown_timeout: u64,
    },

    /// 验证配置文件并构建全部检测器
    Validate {
        /// 是否显示详细信息
        #[arg(short, long, help = "显示详细信息")]
        verbose: bool,
    },

    /// 对每个端点执行一个检测周期并输出结果
    Check {
        /// 端点名称（可选，不指定则检测所有端点）
        #[arg(value_name = "ENDPOINT", help = "端点名称")]
        endpoint: Option<String>,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 生成示例配置文件
    Init {
        /// 输出路径
        #[arg(value_name = "FILE", default_value = "watcher.toml", help = "配置文件路径")]
        path: PathBuf,

        /// 覆盖已有文件
        #[arg(short, long, help = "覆盖已存在的配置文件")]
        force: bool,
    },
}

/// 输出格式
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// 文本
    Text,
    /// JSON
    Json,
}

//! Endpoint Watcher 主程序入口

use anyhow::{Context, Result};
use clap::Parser;
use endpoint_watcher::cli::{execute_command, Args};
use endpoint_watcher::logging::{LogConfig, LoggingSystem};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    // 初始化日志系统
    let log_config = LogConfig {
        level: args.log_level.into(),
        console: true,
        json_format: args.json_logs,
        ..Default::default()
    };

    let _logging_system = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    info!("{} v{} 启动", endpoint_watcher::APP_NAME, endpoint_watcher::VERSION);

    if let Err(e) = execute_command(&args).await {
        error!("命令执行失败: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

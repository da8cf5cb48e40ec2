//! 信号处理模块
//!
//! 把 SIGINT/SIGTERM 转换为引擎的关闭信号，并为关闭流程提供超时保护

use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

#[cfg(unix)]
use signal_hook::consts::{SIGINT, SIGTERM};
#[cfg(unix)]
use signal_hook_tokio::Signals;

/// 设置信号处理器
///
/// 收到第一个终止信号后向 `shutdown_tx` 发送关闭信号。
pub async fn setup_signal_handlers(shutdown_tx: broadcast::Sender<()>) -> Result<()> {
    #[cfg(unix)]
    {
        setup_unix_signals(shutdown_tx).await
    }
    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("接收到 Ctrl+C，开始优雅关闭...");
                    if let Err(e) = shutdown_tx.send(()) {
                        error!("发送关闭信号失败: {e}");
                    }
                }
                Err(e) => error!("监听 Ctrl+C 失败: {e}"),
            }
        });
        Ok(())
    }
}

/// Unix/Linux系统信号处理
#[cfg(unix)]
async fn setup_unix_signals(shutdown_tx: broadcast::Sender<()>) -> Result<()> {
    use futures::stream::StreamExt;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let handle = signals.handle();

    tokio::spawn(async move {
        if let Some(signal) = signals.next().await {
            let name = match signal {
                SIGINT => "SIGINT",
                SIGTERM => "SIGTERM",
                _ => "未知信号",
            };
            info!("接收到 {} 信号，开始优雅关闭...", name);
            if let Err(e) = shutdown_tx.send(()) {
                error!("发送关闭信号失败: {e}");
            }
        }
        handle.close();
    });

    Ok(())
}

/// 等待关闭信号
pub async fn wait_for_shutdown(mut shutdown_rx: broadcast::Receiver<()>) {
    match shutdown_rx.recv().await {
        Ok(()) => {
            info!("接收到关闭信号，开始清理资源...");
        }
        Err(e) => {
            error!("等待关闭信号时发生错误: {e}");
        }
    }
}

/// 优雅关闭处理器
#[derive(Debug, Clone, Copy)]
pub struct GracefulShutdown {
    /// 关闭超时时间
    timeout: Duration,
}

impl GracefulShutdown {
    /// 创建新的优雅关闭处理器
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// 在超时时间内执行清理操作
    ///
    /// # 返回
    /// * `bool` - 清理操作是否在超时前完成
    pub async fn run<F>(&self, cleanup: F) -> bool
    where
        F: Future<Output = ()>,
    {
        info!("开始优雅关闭流程...");
        match tokio::time::timeout(self.timeout, cleanup).await {
            Ok(()) => {
                info!("优雅关闭完成");
                true
            }
            Err(_) => {
                warn!("优雅关闭超时 ({:?})，强制退出", self.timeout);
                false
            }
        }
    }
}

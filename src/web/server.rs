//! Web服务器实现
//!
//! 在独立任务中提供状态查询接口，随关闭信号优雅退出

use super::api::{self, ApiState};
use crate::config::WebConfig;
use crate::health::StatusRegistry;
use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Web服务器
#[derive(Debug)]
pub struct WebServer {
    /// 配置
    config: WebConfig,
    /// 查询接口共享状态
    state: ApiState,
}

impl WebServer {
    /// 创建新的Web服务器
    ///
    /// # 参数
    /// * `config` - Web配置
    /// * `registry` - 状态注册表
    /// * `base_url` - 端点列表中使用的对外地址
    pub fn new(config: WebConfig, registry: StatusRegistry, base_url: &str) -> Self {
        Self {
            config,
            state: ApiState::new(registry, base_url),
        }
    }

    /// 是否启用
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// 监听地址
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .with_context(|| {
                format!(
                    "无效的监听地址: {}:{}",
                    self.config.bind_address, self.config.port
                )
            })
    }

    /// 构建完整路由
    pub fn router(&self) -> Router {
        api::routes()
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// 绑定监听地址
    ///
    /// 与 `serve` 分开，调用方可以在启动其他任务之前发现端口冲突。
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.socket_addr()?;
        TcpListener::bind(addr)
            .await
            .with_context(|| format!("绑定监听地址失败: {addr}"))
    }

    /// 在已绑定的监听器上提供服务，直到收到关闭信号
    ///
    /// # 参数
    /// * `listener` - `bind` 返回的监听器
    /// * `shutdown_rx` - 关闭信号接收器
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!("启动Web服务器，监听地址: {}", addr);
        }

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Web服务器收到关闭信号");
            })
            .await
            .context("Web服务器运行失败")?;

        info!("Web服务器已停止");
        Ok(())
    }

    /// 绑定并运行Web服务器，未启用时直接返回
    pub async fn start(self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        if !self.config.enabled {
            info!("Web服务器已禁用");
            return Ok(());
        }

        let listener = self.bind().await?;
        self.serve(listener, shutdown_rx).await
    }
}

//! 端点检测任务
//!
//! 每个端点对应一个独立的异步任务：等待一个检测间隔，按重试策略执行检测，
//! 更新自身状态，发布快照，然后把状态事件发送给告警分发器。

use crate::health::checker::Checker;
use crate::health::registry::StatusHandle;
use crate::health::result::{EndpointStatus, StatusEvent};
use crate::health::retry::Schedule;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, info, info_span, warn, Instrument};

/// 端点检测任务
pub struct EndpointTask {
    /// 端点名称
    name: String,
    /// 调度计划
    schedule: Schedule,
    /// 检测器
    checker: Box<dyn Checker>,
    /// 当前状态，只由本任务修改
    status: EndpointStatus,
    /// 状态快照发布端
    status_tx: watch::Sender<Arc<EndpointStatus>>,
    /// 状态事件发送端
    events: mpsc::Sender<StatusEvent>,
}

impl std::fmt::Debug for EndpointTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointTask")
            .field("name", &self.name)
            .field("schedule", &self.schedule)
            .field("checker", &self.checker.kind())
            .field("status", &self.status)
            .finish()
    }
}

impl EndpointTask {
    /// 创建端点检测任务
    ///
    /// # 参数
    /// * `name` - 端点名称
    /// * `schedule` - 已解析的调度计划
    /// * `checker` - 绑定了检测参数的检测器
    /// * `events` - 状态事件发送端
    pub fn new(
        name: impl Into<String>,
        schedule: Schedule,
        checker: Box<dyn Checker>,
        events: mpsc::Sender<StatusEvent>,
    ) -> Self {
        let status = EndpointStatus::new();
        let (status_tx, _) = watch::channel(Arc::new(status.clone()));
        Self {
            name: name.into(),
            schedule,
            checker,
            status,
            status_tx,
            events,
        }
    }

    /// 端点名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 调度计划
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// 订阅状态快照
    pub fn subscribe(&self) -> StatusHandle {
        StatusHandle::new(self.status_tx.subscribe())
    }

    /// 执行一个检测周期并发布结果
    ///
    /// 不包含间隔等待，返回本周期产生的状态事件。
    pub async fn run_cycle(&mut self) -> StatusEvent {
        let policy = self.schedule.retry_policy();
        let cycle = policy.execute(self.checker.as_ref()).await;

        if cycle.outcome.status.is_ok() {
            debug!("检测正常 (尝试 {} 次)", cycle.attempts_made);
        } else {
            warn!(
                "检测失败 (尝试 {} 次): {}",
                cycle.attempts_made,
                cycle.outcome.error.as_deref().unwrap_or("N/A")
            );
        }

        self.status.record(cycle.outcome, Utc::now());
        let snapshot = Arc::new(self.status.clone());
        self.status_tx.send_replace(Arc::clone(&snapshot));

        StatusEvent::new(self.name.clone(), snapshot)
    }

    /// 运行检测循环直到收到关闭信号
    ///
    /// 关闭信号只在等待检测间隔时生效，进行中的检测周期会执行完毕。
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let span = info_span!("endpoint", name = %self.name);
        async move {
            info!(
                "启动端点检测任务，间隔 {:?}，最多尝试 {} 次",
                self.schedule.interval, self.schedule.attempts
            );

            loop {
                tokio::select! {
                    _ = sleep(self.schedule.interval) => {}
                    _ = shutdown.recv() => {
                        info!("收到关闭信号，停止端点检测任务");
                        break;
                    }
                }

                let event = self.run_cycle().await;
                if self.events.send(event).await.is_err() {
                    warn!("状态事件通道已关闭，停止端点检测任务");
                    break;
                }
            }
        }
        .instrument(span)
        .await
    }
}

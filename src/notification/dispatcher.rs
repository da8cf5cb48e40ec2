//! 告警分发器模块
//!
//! 状态事件通道的唯一消费者。逐个处理事件，根据状态变化和提醒间隔决定是否告警，
//! 并把告警记录投递到每个发送器各自的有界队列中。每个发送器由一个独立的工作任务
//! 串行发送，慢的或失败的发送器不会影响其他发送器，也不会阻塞事件处理。

use crate::config::AlerterConfig;
use crate::error::AlertError;
use crate::health::{CheckStatus, StatusEvent};
use crate::notification::sender::{AlertRecord, AlertSink, NoOpSink};
use crate::notification::email::EmailSink;
use crate::notification::webhook::WebhookSink;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// 单个发送器的投递队列
struct SinkQueue {
    name: String,
    sender: mpsc::Sender<Arc<AlertRecord>>,
}

/// 告警分发器
pub struct Dispatcher {
    /// 对外可访问的基础URL，用于生成输出链接
    advertised_base_url: String,
    /// 持续异常时的提醒间隔
    reminder_delay: Duration,
    /// 每个发送器的队列容量
    queue_capacity: usize,
    /// 单次发送超时
    sink_timeout: Duration,
    /// 告警发送器
    sinks: Vec<Arc<dyn AlertSink>>,
    /// 状态事件接收端
    events: mpsc::Receiver<StatusEvent>,
    /// 每个端点最近一次尝试告警的时间
    history: HashMap<String, Instant>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("advertised_base_url", &self.advertised_base_url)
            .field("reminder_delay", &self.reminder_delay)
            .field("queue_capacity", &self.queue_capacity)
            .field("sink_timeout", &self.sink_timeout)
            .field(
                "sinks",
                &self.sinks.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("history", &self.history)
            .finish()
    }
}

impl Dispatcher {
    /// 创建告警分发器
    ///
    /// # 参数
    /// * `config` - 告警配置
    /// * `sinks` - 告警发送器列表
    /// * `events` - 状态事件接收端
    pub fn new(
        config: &AlerterConfig,
        sinks: Vec<Arc<dyn AlertSink>>,
        events: mpsc::Receiver<StatusEvent>,
    ) -> Self {
        Self {
            advertised_base_url: config.advertised_base_url.trim_end_matches('/').to_string(),
            reminder_delay: config.reminder_delay,
            queue_capacity: config.alert_queue_capacity.max(1),
            sink_timeout: config.sink_timeout,
            sinks,
            events,
            history: HashMap::new(),
        }
    }

    /// 判断事件是否需要告警
    ///
    /// 状态发生变化时总是告警；持续异常时，距离上次告警超过提醒间隔才再次告警。
    pub fn should_alert(&self, event: &StatusEvent, now: Instant) -> bool {
        if event.status.is_transition() {
            return true;
        }

        if event.status.status() == CheckStatus::Nok {
            return match self.history.get(&event.endpoint_name) {
                None => true,
                Some(last) => now.saturating_duration_since(*last) >= self.reminder_delay,
            };
        }

        false
    }

    /// 处理一个事件
    ///
    /// 需要告警时记录告警时间并返回告警记录。告警时间在决定告警时就记录，
    /// 与发送结果无关。
    pub fn process_event(&mut self, event: &StatusEvent, now: Instant) -> Option<AlertRecord> {
        if !self.should_alert(event, now) {
            debug!(
                "抑制告警: {} (状态 {}, 连续 {} 次)",
                event.endpoint_name,
                event.status.status(),
                event.status.consecutive
            );
            return None;
        }

        self.history.insert(event.endpoint_name.clone(), now);
        Some(self.alert_record(event))
    }

    /// 根据事件构建告警记录
    pub fn alert_record(&self, event: &StatusEvent) -> AlertRecord {
        AlertRecord::from_status(
            event.endpoint_name.clone(),
            &event.status,
            self.output_url(&event.endpoint_name),
        )
    }

    /// 端点最近输出的访问地址
    pub fn output_url(&self, endpoint_name: &str) -> String {
        format!(
            "{}/endpoints/{}/output",
            self.advertised_base_url, endpoint_name
        )
    }

    /// 为每个发送器启动工作任务
    fn spawn_sink_workers(&self) -> (Vec<SinkQueue>, Vec<JoinHandle<()>>) {
        let mut queues = Vec::with_capacity(self.sinks.len());
        let mut workers = Vec::with_capacity(self.sinks.len());

        for sink in &self.sinks {
            let (sender, receiver) = mpsc::channel(self.queue_capacity);
            let name = sink.name().to_string();
            let span = info_span!("sink", name = %name);
            workers.push(tokio::spawn(
                sink_worker(Arc::clone(sink), receiver, self.sink_timeout).instrument(span),
            ));
            queues.push(SinkQueue { name, sender });
        }

        (queues, workers)
    }

    /// 运行分发循环，直到所有事件发送端关闭
    ///
    /// 退出前关闭发送器队列并等待队列中已有的告警发送完毕。
    pub async fn run(mut self) {
        let span = info_span!("dispatcher");
        async move {
            let (queues, workers) = self.spawn_sink_workers();
            info!("告警分发器已启动，共 {} 个发送器", queues.len());

            while let Some(event) = self.events.recv().await {
                let Some(record) = self.process_event(&event, Instant::now()) else {
                    continue;
                };

                info!("{}", record.title());
                let record = Arc::new(record);
                for queue in &queues {
                    match queue.sender.try_send(Arc::clone(&record)) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            warn!(
                                "发送器 {} 队列已满，丢弃端点 {} 的告警",
                                queue.name, record.endpoint_name
                            );
                        }
                        Err(TrySendError::Closed(_)) => {
                            warn!("发送器 {} 已停止，丢弃告警", queue.name);
                        }
                    }
                }
            }

            info!("状态事件通道已关闭，等待发送器完成");
            drop(queues);
            for worker in workers {
                if let Err(e) = worker.await {
                    error!("发送器任务异常退出: {}", e);
                }
            }
            info!("告警分发器已停止");
        }
        .instrument(span)
        .await
    }
}

/// 发送器工作任务：串行发送队列中的告警
async fn sink_worker(
    sink: Arc<dyn AlertSink>,
    mut receiver: mpsc::Receiver<Arc<AlertRecord>>,
    sink_timeout: Duration,
) {
    while let Some(record) = receiver.recv().await {
        let result = match timeout(sink_timeout, sink.send(&record)).await {
            Ok(result) => result,
            Err(_) => Err(AlertError::Timeout),
        };

        match result {
            Ok(()) => debug!("端点 {} 的告警已发送", record.endpoint_name),
            Err(e) => error!("端点 {} 的告警发送失败: {}", record.endpoint_name, e),
        }
    }
}

/// 根据告警配置构建发送器列表
///
/// 未配置任何通道时使用只记录日志的发送器。
pub fn build_sinks(config: &AlerterConfig) -> Result<Vec<Arc<dyn AlertSink>>, AlertError> {
    let mut sinks: Vec<Arc<dyn AlertSink>> = Vec::new();

    if let Some(ref webhook) = config.webhook {
        sinks.push(Arc::new(WebhookSink::new(webhook, config.sink_timeout)?));
    }

    if let Some(ref email) = config.email {
        sinks.push(Arc::new(EmailSink::new(email, config.sink_timeout)?));
    }

    if sinks.is_empty() {
        debug!("未配置告警通道，告警只记录到日志");
        sinks.push(Arc::new(NoOpSink));
    }

    Ok(sinks)
}

//! 检测引擎
//!
//! 负责根据配置构建全部端点任务和告警分发器，启动它们并在关闭时等待退出。
//! 端点任务之间不共享任何状态，只通过同一个有界事件通道与分发器通信。

use crate::config::{AlerterConfig, Config};
use crate::error::{ConfigError, EngineError, Result};
use crate::health::{
    build_checker, Checker, EndpointStatus, EndpointTask, Schedule, StatusRegistry,
};
use crate::notification::{build_sinks, AlertSink, Dispatcher};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// 事件通道的默认容量
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 100;

/// 已绑定检测器的端点定义
pub struct EndpointSpec {
    /// 端点名称
    pub name: String,
    /// 检测器
    pub checker: Box<dyn Checker>,
    /// 调度计划，为空时使用引擎默认值
    pub schedule: Option<Schedule>,
}

impl EndpointSpec {
    /// 创建端点定义
    pub fn new(name: impl Into<String>, checker: Box<dyn Checker>) -> Self {
        Self {
            name: name.into(),
            checker,
            schedule: None,
        }
    }

    /// 指定端点自己的调度计划
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }
}

/// 引擎选项
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// 默认调度计划
    pub default_schedule: Schedule,
    /// 事件通道容量
    pub event_channel_capacity: usize,
    /// 告警配置
    pub alerter: AlerterConfig,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            default_schedule: Schedule::default(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            alerter: AlerterConfig::default(),
        }
    }
}

impl EngineOptions {
    /// 从配置中提取引擎选项
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_schedule: config
                .engine
                .default_schedule
                .as_ref()
                .map(Schedule::from)
                .unwrap_or_default(),
            event_channel_capacity: config.engine.event_channel_capacity,
            alerter: config.alerter.clone().unwrap_or_default(),
        }
    }
}

/// 检测引擎
pub struct Engine {
    /// 尚未启动的端点任务
    tasks: Vec<EndpointTask>,
    /// 尚未启动的告警分发器
    dispatcher: Option<Dispatcher>,
    /// 状态注册表
    registry: StatusRegistry,
    /// 关闭信号发送端
    shutdown_tx: broadcast::Sender<()>,
    /// 端点任务句柄
    task_handles: Vec<JoinHandle<()>>,
    /// 分发器任务句柄
    dispatcher_handle: Option<JoinHandle<()>>,
    /// 是否已经启动
    started: bool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("endpoints", &self.registry.list_endpoint_names())
            .field("started", &self.started)
            .finish()
    }
}

impl Engine {
    /// 根据配置构建引擎
    ///
    /// 任何一个端点的检测器构建失败时整体失败，不会产生缺少端点的引擎。
    ///
    /// # 参数
    /// * `config` - 已验证的配置
    ///
    /// # 返回
    /// * `Result<Engine>` - 构建好但尚未启动的引擎
    pub fn build(config: &Config) -> Result<Self> {
        let options = EngineOptions::from_config(config);

        let mut endpoints = Vec::with_capacity(config.endpoints.len());
        for endpoint in &config.endpoints {
            let checker = build_checker(endpoint)?;
            let mut spec = EndpointSpec::new(endpoint.name.clone(), checker);
            if let Some(ref schedule) = endpoint.schedule {
                spec = spec.with_schedule(Schedule::from(schedule));
            }
            endpoints.push(spec);
        }

        let sinks = build_sinks(&options.alerter)?;
        Ok(Self::from_parts(endpoints, options, sinks)?)
    }

    /// 由已构建的端点和发送器组装引擎
    ///
    /// # 参数
    /// * `endpoints` - 端点定义
    /// * `options` - 引擎选项
    /// * `sinks` - 告警发送器
    ///
    /// # 返回
    /// * `Result<Self, ConfigError>` - 端点名称重复时返回验证错误
    pub fn from_parts(
        endpoints: Vec<EndpointSpec>,
        options: EngineOptions,
        sinks: Vec<Arc<dyn AlertSink>>,
    ) -> std::result::Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for endpoint in &endpoints {
            if !seen.insert(endpoint.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "端点名称重复: {}",
                    endpoint.name
                )));
            }
        }

        let capacity = options.event_channel_capacity.max(1);
        let (events_tx, events_rx) = mpsc::channel(capacity);

        let mut handles = BTreeMap::new();
        let mut tasks = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let schedule = endpoint.schedule.unwrap_or(options.default_schedule);
            let task = EndpointTask::new(
                endpoint.name.clone(),
                schedule,
                endpoint.checker,
                events_tx.clone(),
            );
            handles.insert(endpoint.name, task.subscribe());
            tasks.push(task);
        }
        // 只有端点任务持有发送端，全部任务退出后分发器才能结束
        drop(events_tx);

        let dispatcher = Dispatcher::new(&options.alerter, sinks, events_rx);
        let (shutdown_tx, _) = broadcast::channel(1);

        info!("引擎构建完成，共 {} 个端点", tasks.len());

        Ok(Self {
            tasks,
            dispatcher: Some(dispatcher),
            registry: StatusRegistry::new(handles),
            shutdown_tx,
            task_handles: Vec::new(),
            dispatcher_handle: None,
            started: false,
        })
    }

    /// 启动所有端点任务和告警分发器，立即返回
    pub fn start(&mut self) -> std::result::Result<(), EngineError> {
        if self.started {
            return Err(EngineError::AlreadyStarted);
        }
        self.started = true;

        if let Some(dispatcher) = self.dispatcher.take() {
            self.dispatcher_handle = Some(tokio::spawn(dispatcher.run()));
        }

        for task in self.tasks.drain(..) {
            let shutdown_rx = self.shutdown_tx.subscribe();
            self.task_handles.push(tokio::spawn(task.run(shutdown_rx)));
        }

        info!("引擎已启动，运行 {} 个端点任务", self.task_handles.len());
        Ok(())
    }

    /// 是否已经启动
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// 发送关闭信号
    ///
    /// 端点任务在下一次等待检测间隔时退出。
    pub fn shutdown(&self) {
        info!("发送关闭信号");
        let _ = self.shutdown_tx.send(());
    }

    /// 关闭信号发送端，供信号处理器使用
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// 等待所有端点任务和分发器退出
    ///
    /// 分发器在所有端点任务退出后处理完剩余事件并等待发送器队列清空。
    pub async fn await_shutdown(&mut self) {
        for handle in self.task_handles.drain(..) {
            if let Err(e) = handle.await {
                error!("端点任务异常退出: {}", e);
            }
        }
        // 未启动时丢弃任务，关闭事件通道
        self.tasks.clear();
        self.dispatcher = None;

        if let Some(handle) = self.dispatcher_handle.take() {
            if let Err(e) = handle.await {
                error!("告警分发器异常退出: {}", e);
            }
        }
        info!("引擎已停止");
    }

    /// 状态注册表，可克隆给查询接口使用
    pub fn registry(&self) -> StatusRegistry {
        self.registry.clone()
    }

    /// 获取端点状态快照
    pub fn get_status(&self, name: &str) -> std::result::Result<Arc<EndpointStatus>, EngineError> {
        self.registry.get_status(name)
    }

    /// 获取端点最近一次检测的输出
    pub fn get_latest_output(&self, name: &str) -> std::result::Result<Vec<u8>, EngineError> {
        self.registry.get_latest_output(name)
    }

    /// 所有端点名称，按字典序排列
    pub fn list_endpoint_names(&self) -> Vec<String> {
        self.registry.list_endpoint_names()
    }
}

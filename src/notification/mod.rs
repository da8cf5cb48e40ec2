//! 告警模块
//!
//! 提供告警抑制与分发、webhook与邮件告警和消息模板功能

pub mod dispatcher;
pub mod email;
pub mod sender;
pub mod template;
pub mod webhook;

// 重新导出主要类型
pub use dispatcher::{build_sinks, Dispatcher};
pub use email::EmailSink;
pub use sender::{AlertRecord, AlertSink, NoOpSink};
pub use template::AlertTemplate;
pub use webhook::WebhookSink;

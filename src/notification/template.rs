//! 消息模板模块
//!
//! 使用Handlebars渲染告警消息正文

use crate::error::AlertError;
use crate::notification::sender::AlertRecord;
use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use serde_json::{json, Value};

const TEMPLATE_NAME: &str = "alert";

/// 默认的告警消息模板
pub fn default_alert_template() -> &'static str {
    r#"{{#if ok}}✅{{else}}🚨{{/if}} **端点状态: {{status}}**
- **端点名称**: {{endpoint_name}}
- **连续次数**: {{consecutive}}
- **最近正常**: {{latest_ok_at}}
- **最近异常**: {{latest_nok_at}}
{{#if error}}
- **错误信息**: {{error}}
{{/if}}
- **最近输出**: {{output_url}}"#
}

/// 告警消息模板
pub struct AlertTemplate {
    registry: Handlebars<'static>,
}

impl std::fmt::Debug for AlertTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertTemplate").finish_non_exhaustive()
    }
}

impl AlertTemplate {
    /// 创建模板
    ///
    /// # 参数
    /// * `template` - 模板字符串，为空时使用默认模板
    ///
    /// # 返回
    /// * `Result<Self, AlertError>` - 模板实例或语法错误
    pub fn new(template: Option<&str>) -> Result<Self, AlertError> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry
            .register_template_string(TEMPLATE_NAME, template.unwrap_or(default_alert_template()))
            .map_err(|e| AlertError::TemplateError(e.to_string()))?;

        Ok(Self { registry })
    }

    /// 渲染告警记录
    pub fn render(&self, record: &AlertRecord) -> Result<String, AlertError> {
        self.registry
            .render(TEMPLATE_NAME, &Self::context(record))
            .map_err(|e| AlertError::TemplateError(e.to_string()))
    }

    /// 构建模板上下文
    fn context(record: &AlertRecord) -> Value {
        json!({
            "endpoint_name": record.endpoint_name,
            "ok": record.ok,
            "status": record.status_text(),
            "error": record.error,
            "output_url": record.output_url,
            "consecutive": record.consecutive,
            "latest_ok_at": format_time(record.latest_ok_at),
            "latest_nok_at": format_time(record.latest_nok_at),
        })
    }
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

//! Webhook告警发送器模块
//!
//! 以飞书机器人兼容的卡片消息格式发送告警，支持签名校验

use crate::config::WebhookConfig;
use crate::error::AlertError;
use crate::notification::sender::{AlertRecord, AlertSink};
use crate::notification::template::AlertTemplate;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::{json, Value};
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, error, info};

/// Webhook告警发送器
#[derive(Debug)]
pub struct WebhookSink {
    /// HTTP客户端
    client: Client,
    /// webhook URL
    url: String,
    /// 签名密钥
    secret: Option<String>,
    /// 消息模板
    template: AlertTemplate,
}

impl WebhookSink {
    /// 创建新的webhook发送器
    ///
    /// # 参数
    /// * `config` - webhook配置
    /// * `request_timeout` - 单次请求超时
    ///
    /// # 返回
    /// * `Result<Self, AlertError>` - 发送器实例
    pub fn new(config: &WebhookConfig, request_timeout: Duration) -> Result<Self, AlertError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AlertError::ConfigError(format!("创建HTTP客户端失败: {e}")))?;
        let template = AlertTemplate::new(config.message_template.as_deref())?;

        Ok(Self {
            client,
            url: config.url.clone(),
            secret: config.secret.clone(),
            template,
        })
    }

    /// 构建卡片消息体
    fn build_message_body(&self, record: &AlertRecord) -> Result<Value, AlertError> {
        let color = if record.ok { "green" } else { "red" };
        let content = self.template.render(record)?;

        let mut body = json!({
            "msg_type": "interactive",
            "card": {
                "elements": [
                    {
                        "tag": "div",
                        "text": {
                            "content": content,
                            "tag": "lark_md"
                        }
                    }
                ],
                "header": {
                    "title": {
                        "content": record.title(),
                        "tag": "plain_text"
                    },
                    "template": color
                }
            }
        });

        if let Some(ref secret) = self.secret {
            let timestamp = chrono::Utc::now().timestamp();
            let sign = gen_sign(timestamp, secret)?;
            body["timestamp"] = json!(timestamp.to_string());
            body["sign"] = json!(sign);
        }

        Ok(body)
    }

    /// 发送消息到webhook
    async fn send_to_webhook(&self, body: &Value) -> Result<(), AlertError> {
        debug!("发送消息到webhook: {}", self.url);

        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| AlertError::SendError(format!("发送webhook消息失败: {e}")))?;

        if response.status().is_success() {
            info!("webhook消息发送成功");
            Ok(())
        } else {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!("webhook消息发送失败: {} - {}", status, text);
            Err(AlertError::SendError(format!("webhook返回状态码 {status}")))
        }
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, record: &AlertRecord) -> Result<(), AlertError> {
        let body = self.build_message_body(record)?;
        self.send_to_webhook(&body).await
    }
}

/// 计算webhook签名
///
/// 以 `"{timestamp}\n{secret}"` 作为HMAC-SHA256密钥，对空消息求值后做base64编码。
pub fn gen_sign(timestamp: i64, secret: &str) -> Result<String, AlertError> {
    let key = format!("{timestamp}\n{secret}");
    let mac = Hmac::<Sha256>::new_from_slice(key.as_bytes())
        .map_err(|e| AlertError::ConfigError(format!("签名密钥无效: {e}")))?;
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

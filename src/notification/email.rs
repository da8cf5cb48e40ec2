//! 邮件告警发送器模块
//!
//! 通过SMTP向一组收件人发送告警，正文为告警记录的JSON

use crate::config::EmailConfig;
use crate::error::AlertError;
use crate::notification::sender::{AlertRecord, AlertSink};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::debug;

/// 邮件告警发送器
pub struct EmailSink {
    /// SMTP传输
    transport: AsyncSmtpTransport<Tokio1Executor>,
    /// 服务器地址，用于日志和错误信息
    server: String,
    /// 发件人
    from: Mailbox,
    /// 收件人
    to: Vec<Mailbox>,
}

impl std::fmt::Debug for EmailSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailSink")
            .field("server", &self.server)
            .field("from", &self.from)
            .field("to", &self.to)
            .finish_non_exhaustive()
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, AlertError> {
    address
        .parse()
        .map_err(|e| AlertError::ConfigError(format!("无效的邮件地址 '{address}': {e}")))
}

impl EmailSink {
    /// 创建邮件发送器
    ///
    /// # 参数
    /// * `config` - 邮件配置
    /// * `request_timeout` - SMTP会话超时
    ///
    /// # 返回
    /// * `Result<Self, AlertError>` - 地址无效时返回配置错误
    pub fn new(config: &EmailConfig, request_timeout: Duration) -> Result<Self, AlertError> {
        let from = parse_mailbox(&config.from)?;
        let to = config
            .to
            .iter()
            .map(|address| parse_mailbox(address))
            .collect::<Result<Vec<_>, _>>()?;

        let mut builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                .map_err(|e| AlertError::ConfigError(format!("SMTP STARTTLS配置失败: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(config.smtp_host.as_str())
        };
        builder = builder
            .port(config.smtp_port)
            .timeout(Some(request_timeout));
        if let Some(ref auth) = config.auth {
            builder = builder.credentials(Credentials::new(
                auth.username.clone(),
                auth.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            server: format!("{}:{}", config.smtp_host, config.smtp_port),
            from,
            to,
        })
    }

    /// 构建告警邮件，主题与告警标题一致
    fn build_message(&self, record: &AlertRecord) -> Result<Message, AlertError> {
        let body = serde_json::to_string_pretty(record)
            .map_err(|e| AlertError::TemplateError(format!("生成邮件正文失败: {e}")))?;

        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(record.title())
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }

        builder
            .body(body)
            .map_err(|e| AlertError::SendError(format!("构建邮件失败: {e}")))
    }
}

#[async_trait]
impl AlertSink for EmailSink {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, record: &AlertRecord) -> Result<(), AlertError> {
        let message = self.build_message(record)?;

        debug!("发送告警邮件到 {} ...", self.server);
        self.transport
            .send(message)
            .await
            .map_err(|e| AlertError::SendError(format!("发送邮件到 {} 失败: {e}", self.server)))?;
        debug!("告警邮件已发送到 {}", self.server);

        Ok(())
    }
}

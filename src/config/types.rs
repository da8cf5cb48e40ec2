//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use crate::config::duration::{self, cached_regex};
use crate::health::Schedule;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

/// 主配置结构，包含引擎配置、告警配置、Web配置和端点列表
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// 引擎全局配置
    #[serde(default)]
    pub engine: EngineSettings,
    /// 告警配置
    pub alerter: Option<AlerterConfig>,
    /// 状态查询服务配置
    pub web: Option<WebConfig>,
    /// 端点配置列表
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

/// 引擎全局配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSettings {
    /// 默认调度计划，端点未配置时使用
    pub default_schedule: Option<ScheduleConfig>,
    /// 状态事件通道容量
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_schedule: None,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// 调度计划配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleConfig {
    /// 检测间隔
    #[serde(with = "duration")]
    pub interval: Duration,
    /// 重试配置
    #[serde(default)]
    pub retries: RetriesConfig,
}

/// 重试配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetriesConfig {
    /// 每个检测周期的总尝试次数
    #[serde(default = "default_attempts")]
    pub attempts: i64,
    /// 两次尝试之间的等待时间
    #[serde(default = "default_retry_delay", with = "duration")]
    pub delay: Duration,
    /// 是否每次重试后将等待时间翻倍
    #[serde(default)]
    pub exponential_backoff: bool,
}

impl Default for RetriesConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay: default_retry_delay(),
            exponential_backoff: false,
        }
    }
}

impl From<&ScheduleConfig> for Schedule {
    fn from(config: &ScheduleConfig) -> Self {
        Schedule::new(
            config.interval,
            config.retries.attempts,
            config.retries.delay,
            config.retries.exponential_backoff,
        )
    }
}

/// 端点配置
///
/// `check` 字段的内容取决于 `type`，由对应的检测器在构建时解析和验证。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointConfig {
    /// 端点名称，需唯一且可以作为URL路径段
    pub name: String,
    /// 检测类型，例如 "http"
    #[serde(rename = "type")]
    pub kind: String,
    /// 检测参数
    pub check: Option<toml::Value>,
    /// 端点特定的调度计划
    pub schedule: Option<ScheduleConfig>,
}

/// 告警配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlerterConfig {
    /// 告警中引用的外部可访问地址，例如 `https://watcher.example.com:8443`
    #[serde(default = "default_advertised_base_url")]
    pub advertised_base_url: String,
    /// 持续失败时重复告警的最小间隔
    #[serde(default = "default_reminder_delay", with = "duration")]
    pub reminder_delay: Duration,
    /// 每个告警接收器的待发送队列容量
    #[serde(default = "default_alert_queue_capacity")]
    pub alert_queue_capacity: usize,
    /// 单次告警发送的超时时间
    #[serde(default = "default_sink_timeout", with = "duration")]
    pub sink_timeout: Duration,
    /// Webhook 告警接收器
    pub webhook: Option<WebhookConfig>,
    /// 邮件告警接收器
    pub email: Option<EmailConfig>,
}

impl Default for AlerterConfig {
    fn default() -> Self {
        Self {
            advertised_base_url: default_advertised_base_url(),
            reminder_delay: default_reminder_delay(),
            alert_queue_capacity: default_alert_queue_capacity(),
            sink_timeout: default_sink_timeout(),
            webhook: None,
            email: None,
        }
    }
}

/// Webhook 告警接收器配置（兼容飞书机器人）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookConfig {
    /// Webhook URL
    pub url: String,
    /// 签名密钥（可选）
    pub secret: Option<String>,
    /// 自定义消息模板（Handlebars语法）
    pub message_template: Option<String>,
}

/// 邮件告警接收器配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailConfig {
    /// SMTP服务器地址
    pub smtp_host: String,
    /// SMTP服务器端口
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// 是否使用 STARTTLS
    #[serde(default)]
    pub starttls: bool,
    /// SMTP认证（可选）
    pub auth: Option<SmtpAuth>,
    /// 发件人
    pub from: String,
    /// 收件人列表
    pub to: Vec<String>,
}

/// SMTP认证信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SmtpAuth {
    /// 用户名
    pub username: String,
    /// 密码
    pub password: String,
}


/// 状态查询服务配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebConfig {
    /// 是否启用
    #[serde(default = "default_web_enabled")]
    pub enabled: bool,
    /// 绑定地址
    #[serde(default = "default_web_bind_address")]
    pub bind_address: String,
    /// 监听端口
    #[serde(default = "default_web_port")]
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: default_web_enabled(),
            bind_address: default_web_bind_address(),
            port: default_web_port(),
        }
    }
}

// 默认值函数
fn default_event_channel_capacity() -> usize {
    100
}
fn default_attempts() -> i64 {
    3
}
fn default_retry_delay() -> Duration {
    Duration::from_secs(3)
}
fn default_advertised_base_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_reminder_delay() -> Duration {
    Duration::from_secs(300) // 5分钟
}
fn default_alert_queue_capacity() -> usize {
    64
}
fn default_sink_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_smtp_port() -> u16 {
    25
}
fn default_web_enabled() -> bool {
    false
}
fn default_web_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_web_port() -> u16 {
    8080
}

static ENDPOINT_NAME: OnceLock<Result<Regex, String>> = OnceLock::new();

/// 判断端点名称是否可以作为URL路径段使用
///
/// # 返回
/// * `Result<bool, String>` - 名称是否合法，内置正则表达式无效时返回错误信息
pub fn valid_endpoint_name(name: &str) -> Result<bool, String> {
    Ok(cached_regex(&ENDPOINT_NAME, r"^[a-zA-Z0-9_\-.]+$")?.is_match(name))
}

fn validate_schedule(schedule: &ScheduleConfig) -> Result<(), String> {
    if schedule.interval.is_zero() {
        return Err("调度计划的检测间隔不能为0".to_string());
    }
    // 0 按1次处理
    if schedule.retries.attempts < 0 {
        return Err(format!(
            "重试次数不能为负数，当前值: {}",
            schedule.retries.attempts
        ));
    }
    Ok(())
}

/// 配置验证函数
///
/// 只验证通用部分，检测参数由对应的检测器在构建时验证。
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    if let Some(ref schedule) = config.engine.default_schedule {
        validate_schedule(schedule).map_err(|e| format!("默认调度计划无效: {e}"))?;
    }

    if config.engine.event_channel_capacity == 0 {
        return Err("状态事件通道容量不能为0".to_string());
    }

    let mut taken_names = HashSet::new();
    for endpoint in &config.endpoints {
        if endpoint.name.trim().is_empty() {
            return Err("端点名称不能为空".to_string());
        }
        if !valid_endpoint_name(&endpoint.name)? {
            return Err(format!(
                "端点名称 '{}' 无效，只允许字母、数字、'_'、'-' 和 '.'",
                endpoint.name
            ));
        }
        if !taken_names.insert(endpoint.name.as_str()) {
            return Err(format!("端点名称 '{}' 重复，端点名称必须唯一", endpoint.name));
        }
        if endpoint.kind.trim().is_empty() {
            return Err(format!("端点 {} 缺少检测类型", endpoint.name));
        }
        if endpoint.check.is_none() {
            return Err(format!("端点 {} 缺少检测参数", endpoint.name));
        }
        if let Some(ref schedule) = endpoint.schedule {
            validate_schedule(schedule).map_err(|e| format!("端点 {}: {e}", endpoint.name))?;
        }
    }

    if let Some(ref alerter) = config.alerter {
        if !alerter.advertised_base_url.starts_with("http://")
            && !alerter.advertised_base_url.starts_with("https://")
        {
            return Err(format!(
                "告警外部地址格式无效: {}",
                alerter.advertised_base_url
            ));
        }
        if alerter.reminder_delay.is_zero() {
            return Err("重复告警间隔不能为0".to_string());
        }
        if alerter.alert_queue_capacity == 0 {
            return Err("告警队列容量不能为0".to_string());
        }
        if let Some(ref webhook) = alerter.webhook {
            if !webhook.url.starts_with("http://") && !webhook.url.starts_with("https://") {
                return Err(format!("Webhook URL格式无效: {}", webhook.url));
            }
        }
        if let Some(ref email) = alerter.email {
            if email.smtp_host.trim().is_empty() {
                return Err("邮件告警缺少SMTP服务器地址".to_string());
            }
            if email.smtp_port == 0 {
                return Err("SMTP端口不能为0".to_string());
            }
            if email.from.trim().is_empty() {
                return Err("邮件告警缺少发件人".to_string());
            }
            if email.to.is_empty() {
                return Err("邮件告警至少需要一个收件人".to_string());
            }
        }
    }

    if let Some(ref web) = config.web {
        if web.enabled {
            if web.port == 0 {
                return Err("无效的Web服务器端口: 0，端口不能为0".to_string());
            }
            if web.bind_address.is_empty() {
                return Err("Web服务器绑定地址不能为空".to_string());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_endpoint(name: &str) -> EndpointConfig {
        let check: toml::Value = toml::from_str(r#"url = "https://example.com/health""#)
            .expect("解析检测参数失败");
        EndpointConfig {
            name: name.to_string(),
            kind: "http".to_string(),
            check: Some(check),
            schedule: None,
        }
    }

    fn create_test_config() -> Config {
        Config {
            engine: EngineSettings::default(),
            alerter: Some(AlerterConfig::default()),
            web: None,
            endpoints: vec![create_test_endpoint("api"), create_test_endpoint("db.primary")],
        }
    }

    #[test]
    fn test_config_validation() {
        let config = create_test_config();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_duplicate_endpoint_names() {
        let mut config = create_test_config();
        config.endpoints.push(create_test_endpoint("api"));

        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("重复"));
    }

    #[test]
    fn test_invalid_endpoint_name() {
        let mut config = create_test_config();
        assert_eq!(valid_endpoint_name("db.primary-1_a"), Ok(true));
        assert_eq!(valid_endpoint_name("has space"), Ok(false));
        config.endpoints[0].name = "has/slash".to_string();

        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("无效"));
    }

    #[test]
    fn test_missing_check_payload() {
        let mut config = create_test_config();
        config.endpoints[0].check = None;

        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("缺少检测参数"));
    }

    #[test]
    fn test_attempts_bounds() {
        let mut config = create_test_config();
        config.endpoints[0].schedule = Some(ScheduleConfig {
            interval: Duration::from_secs(30),
            retries: RetriesConfig {
                attempts: 0,
                ..RetriesConfig::default()
            },
        });
        assert!(validate_config(&config).is_ok());

        config.endpoints[0].schedule = Some(ScheduleConfig {
            interval: Duration::from_secs(30),
            retries: RetriesConfig {
                attempts: -1,
                ..RetriesConfig::default()
            },
        });
        assert!(validate_config(&config).unwrap_err().contains("重试次数"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = create_test_config();
        config.engine.default_schedule = Some(ScheduleConfig {
            interval: Duration::ZERO,
            retries: RetriesConfig::default(),
        });

        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("默认调度计划无效"));
    }

    #[test]
    fn test_invalid_advertised_base_url() {
        let mut config = create_test_config();
        config.alerter = Some(AlerterConfig {
            advertised_base_url: "watcher.example.com".to_string(),
            ..AlerterConfig::default()
        });

        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("告警外部地址"));
    }

    #[test]
    fn test_email_config_validation() {
        let email = EmailConfig {
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
            starttls: true,
            auth: None,
            from: "watcher@example.com".to_string(),
            to: vec!["ops@example.com".to_string()],
        };

        let mut config = create_test_config();
        config.alerter = Some(AlerterConfig {
            email: Some(email.clone()),
            ..AlerterConfig::default()
        });
        assert!(validate_config(&config).is_ok());

        config.alerter = Some(AlerterConfig {
            email: Some(EmailConfig {
                to: Vec::new(),
                ..email
            }),
            ..AlerterConfig::default()
        });
        assert!(validate_config(&config).unwrap_err().contains("收件人"));
    }

    #[test]
    fn test_web_config_invalid_port() {
        let mut config = create_test_config();
        config.web = Some(WebConfig {
            enabled: true,
            port: 0,
            ..WebConfig::default()
        });

        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("端口不能为0"));
    }

    #[test]
    fn test_default_values() {
        let retries = RetriesConfig::default();
        assert_eq!(retries.attempts, 3);
        assert_eq!(retries.delay, Duration::from_secs(3));
        assert!(!retries.exponential_backoff);

        let alerter = AlerterConfig::default();
        assert_eq!(alerter.reminder_delay, Duration::from_secs(300));
        assert_eq!(alerter.alert_queue_capacity, 64);

        assert_eq!(EngineSettings::default().event_channel_capacity, 100);
    }

    #[test]
    fn test_schedule_conversion() {
        let config = ScheduleConfig {
            interval: Duration::from_secs(30),
            retries: RetriesConfig {
                attempts: 2,
                delay: Duration::from_secs(1),
                exponential_backoff: true,
            },
        };

        let schedule = Schedule::from(&config);
        assert_eq!(schedule.interval, Duration::from_secs(30));
        assert_eq!(schedule.attempts, 2);
        assert_eq!(schedule.retry_delay, Duration::from_secs(1));
        assert!(schedule.exponential_backoff);
    }
}

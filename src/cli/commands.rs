//! 命令处理模块
//!
//! 实现各个CLI子命令的具体逻辑

use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{Config, ConfigLoader, TomlConfigLoader};
use crate::engine::{Engine, EngineOptions};
use crate::health::{build_checker, CheckOutcome, Schedule};
use crate::signal::{setup_signal_handlers, wait_for_shutdown, GracefulShutdown};
use crate::web::WebServer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

/// 示例配置文件内容
const SAMPLE_CONFIG: &str = include_str!("../../demos/watcher.toml");

/// 命令trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 加载并验证配置文件
async fn load_config(path: &Path) -> Result<Config> {
    info!("加载配置文件: {}", path.display());
    let loader = TomlConfigLoader::new(true);
    let config = loader
        .load_from_file(path)
        .await
        .context("加载配置文件失败")?;
    info!("配置加载成功，共 {} 个端点", config.endpoints.len());
    Ok(config)
}

/// 运行命令
pub struct RunCommand;

#[async_trait]
impl Command for RunCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let shutdown_timeout = match &args.command {
            Commands::Run { shutdown_timeout } => *shutdown_timeout,
            _ => return Ok(()),
        };

        let config = load_config(&args.get_config_path()).await?;
        let options = EngineOptions::from_config(&config);
        let mut engine = Engine::build(&config).context("构建检测引擎失败")?;
        let shutdown_tx = engine.shutdown_sender();

        // 端口冲突等问题在启动任何任务之前暴露
        let web = match config.web {
            Some(ref web_config) if web_config.enabled => {
                let server = WebServer::new(
                    web_config.clone(),
                    engine.registry(),
                    &options.alerter.advertised_base_url,
                );
                let listener = server.bind().await.context("启动状态查询服务失败")?;
                Some((server, listener))
            }
            _ => None,
        };

        setup_signal_handlers(shutdown_tx.clone())
            .await
            .context("设置信号处理器失败")?;

        let shutdown_rx = shutdown_tx.subscribe();
        let web_handle = web.map(|(server, listener)| {
            let web_shutdown = shutdown_tx.subscribe();
            let stop_all = shutdown_tx.clone();
            tokio::spawn(async move {
                let result = server.serve(listener, web_shutdown).await;
                if let Err(ref e) = result {
                    error!("Web服务器异常退出: {:#}", e);
                    let _ = stop_all.send(());
                }
                result
            })
        });

        engine.start()?;
        info!("{} v{} 已启动", crate::APP_NAME, crate::VERSION);

        wait_for_shutdown(shutdown_rx).await;

        let mut web_result: Result<()> = Ok(());
        let graceful = GracefulShutdown::new(Duration::from_secs(shutdown_timeout));
        let completed = graceful
            .run(async {
                engine.await_shutdown().await;
                if let Some(handle) = web_handle {
                    web_result = handle
                        .await
                        .unwrap_or_else(|e| Err(anyhow::anyhow!("Web服务器任务异常: {e}")));
                }
            })
            .await;

        if !completed {
            anyhow::bail!("等待任务退出超时 ({} 秒)", shutdown_timeout);
        }
        web_result.context("状态查询服务异常退出")
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate { verbose } = &args.command {
            self.validate_config_file(&args.get_config_path(), *verbose)
                .await
        } else {
            Ok(())
        }
    }
}

impl ValidateCommand {
    /// 验证配置文件并尝试构建全部检测器
    async fn validate_config_file(&self, config_path: &Path, verbose: bool) -> Result<()> {
        println!("验证配置文件: {}", config_path.display());

        let config = load_config(config_path).await?;
        for endpoint in &config.endpoints {
            build_checker(endpoint)?;
        }

        if verbose {
            let options = EngineOptions::from_config(&config);
            println!("配置验证通过！");
            println!("默认调度计划:");
            print_schedule(&options.default_schedule, "  ");
            println!("告警:");
            println!("  提醒间隔: {:?}", options.alerter.reminder_delay);
            println!("  输出地址: {}", options.alerter.advertised_base_url);
            println!(
                "  webhook: {}",
                if options.alerter.webhook.is_some() {
                    "已配置"
                } else {
                    "未配置"
                }
            );
            match options.alerter.email {
                Some(ref email) => println!(
                    "  邮件: {}:{} -> {}",
                    email.smtp_host,
                    email.smtp_port,
                    email.to.join(", ")
                ),
                None => println!("  邮件: 未配置"),
            }

            println!("端点配置:");
            for (i, endpoint) in config.endpoints.iter().enumerate() {
                println!("  {}. {} ({})", i + 1, endpoint.name, endpoint.kind);
                let schedule = endpoint
                    .schedule
                    .as_ref()
                    .map(Schedule::from)
                    .unwrap_or(options.default_schedule);
                print_schedule(&schedule, "     ");
            }
        } else {
            println!("✓ 配置文件验证通过");
            println!("✓ 找到 {} 个端点配置", config.endpoints.len());
        }

        Ok(())
    }
}

fn print_schedule(schedule: &Schedule, indent: &str) {
    println!("{indent}检测间隔: {:?}", schedule.interval);
    println!("{indent}尝试次数: {}", schedule.attempts);
    println!("{indent}重试等待: {:?}", schedule.retry_delay);
    println!(
        "{indent}指数退避: {}",
        if schedule.exponential_backoff { "是" } else { "否" }
    );
}

/// 单个端点的一次性检测结果
#[derive(Debug, Serialize)]
struct CheckReport {
    endpoint: String,
    attempts: u32,
    #[serde(flatten)]
    outcome: CheckOutcome,
}

/// 检测命令
pub struct CheckCommand;

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Check { endpoint, format } = &args.command {
            self.perform_check(args, endpoint.as_deref(), *format).await
        } else {
            Ok(())
        }
    }
}

impl CheckCommand {
    /// 对选中的端点各执行一个检测周期
    async fn perform_check(
        &self,
        args: &Args,
        endpoint_name: Option<&str>,
        format: OutputFormat,
    ) -> Result<()> {
        let config = load_config(&args.get_config_path()).await?;
        let options = EngineOptions::from_config(&config);

        let selected: Vec<_> = config
            .endpoints
            .iter()
            .filter(|e| endpoint_name.map_or(true, |name| e.name == name))
            .collect();

        if selected.is_empty() {
            if let Some(name) = endpoint_name {
                anyhow::bail!("未找到名为 '{name}' 的端点");
            }
            println!("未找到任何端点");
            return Ok(());
        }

        let mut checks = Vec::with_capacity(selected.len());
        for endpoint in &selected {
            let schedule = endpoint
                .schedule
                .as_ref()
                .map(Schedule::from)
                .unwrap_or(options.default_schedule);
            checks.push((endpoint.name.clone(), schedule, build_checker(endpoint)?));
        }

        let reports = futures::future::join_all(checks.into_iter().map(
            |(name, schedule, checker)| async move {
                let cycle = schedule.retry_policy().execute(checker.as_ref()).await;
                CheckReport {
                    endpoint: name,
                    attempts: cycle.attempts_made,
                    outcome: cycle.outcome,
                }
            },
        ))
        .await;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
            OutputFormat::Text => {
                for report in &reports {
                    match report.outcome.error {
                        Some(ref error) => println!(
                            "✗ {} [{}] ({} 次尝试): {}",
                            report.endpoint, report.outcome.status, report.attempts, error
                        ),
                        None => println!(
                            "✓ {} [{}] ({} 次尝试)",
                            report.endpoint, report.outcome.status, report.attempts
                        ),
                    }
                }
            }
        }

        if reports.iter().any(|r| !r.outcome.status.is_ok()) {
            anyhow::bail!("存在异常端点");
        }
        Ok(())
    }
}

/// 初始化命令
pub struct InitCommand;

#[async_trait]
impl Command for InitCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Init { path, force } = &args.command {
            self.create_config_file(path, *force).await
        } else {
            Ok(())
        }
    }
}

impl InitCommand {
    /// 写入示例配置文件
    async fn create_config_file(&self, config_path: &Path, force: bool) -> Result<()> {
        if config_path.exists() && !force {
            anyhow::bail!(
                "配置文件已存在: {}，使用 --force 参数覆盖",
                config_path.display()
            );
        }

        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        tokio::fs::write(config_path, SAMPLE_CONFIG).await?;
        println!("配置文件已创建: {}", config_path.display());
        println!("请编辑配置文件以添加需要监控的端点");
        Ok(())
    }
}

/// 根据子命令分发执行
pub async fn execute_command(args: &Args) -> Result<()> {
    match &args.command {
        Commands::Run { .. } => RunCommand.execute(args).await,
        Commands::Validate { .. } => ValidateCommand.execute(args).await,
        Commands::Check { .. } => CheckCommand.execute(args).await,
        Commands::Init { .. } => InitCommand.execute(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[tokio::test]
    async fn test_sample_config_is_valid() {
        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_string(SAMPLE_CONFIG).await.unwrap();
        assert!(!config.endpoints.is_empty());
        for endpoint in &config.endpoints {
            assert!(build_checker(endpoint).is_ok());
        }
    }

    #[tokio::test]
    async fn test_init_then_validate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("watcher.toml");
        let path_str = path.to_string_lossy().to_string();

        let init = Args::try_parse_from(["endpoint-watcher", "init", &path_str]).unwrap();
        execute_command(&init).await.unwrap();
        assert!(path.exists());

        // 不带 --force 时不覆盖
        assert!(execute_command(&init).await.is_err());

        let validate = Args::try_parse_from([
            "endpoint-watcher",
            "--config",
            &path_str,
            "validate",
            "--verbose",
        ])
        .unwrap();
        execute_command(&validate).await.unwrap();
    }

    #[tokio::test]
    async fn test_run_fails_when_query_port_taken() {
        let occupied = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = occupied.local_addr().unwrap().port();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watcher.toml");
        std::fs::write(
            &path,
            format!(
                r#"
[web]
enabled = true
bind_address = "127.0.0.1"
port = {port}
"#
            ),
        )
        .unwrap();
        let path_str = path.to_string_lossy().to_string();

        let args =
            Args::try_parse_from(["endpoint-watcher", "--config", &path_str, "run"]).unwrap();
        let err = tokio::time::timeout(Duration::from_secs(5), execute_command(&args))
            .await
            .unwrap()
            .unwrap_err();
        assert!(format!("{err:#}").contains("启动状态查询服务失败"));
    }

    #[tokio::test]
    async fn test_check_unknown_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watcher.toml");
        std::fs::write(&path, SAMPLE_CONFIG).unwrap();
        let path_str = path.to_string_lossy().to_string();

        let args = Args::try_parse_from([
            "endpoint-watcher",
            "--config",
            &path_str,
            "check",
            "does-not-exist",
        ])
        .unwrap();
        let err = execute_command(&args).await.unwrap_err();
        assert!(err.to_string().contains("does-not-exist"));
    }

    #[tokio::test]
    async fn test_check_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/health")
            .with_status(200)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watcher.toml");
        std::fs::write(
            &path,
            format!(
                r#"
[[endpoints]]
name = "api"
type = "http"

[endpoints.check]
url = "{}/health"
"#,
                server.url()
            ),
        )
        .unwrap();
        let path_str = path.to_string_lossy().to_string();

        let args = Args::try_parse_from([
            "endpoint-watcher",
            "--config",
            &path_str,
            "check",
            "--format",
            "json",
        ])
        .unwrap();
        execute_command(&args).await.unwrap();
    }
}

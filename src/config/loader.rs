//! 配置加载器
//!
//! 读取TOML配置文件，展开 `${VAR}` 形式的环境变量引用后反序列化并验证。
//! 注释行不做展开，示例配置中可以直接描述这种写法。

use crate::config::duration::cached_regex;
use crate::config::types::{validate_config, Config};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use regex::{Captures, Regex};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static ENV_REFERENCE: OnceLock<std::result::Result<Regex, String>> = OnceLock::new();

/// 配置加载接口
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    /// 读取并解析配置文件
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config>;

    /// 解析配置内容
    async fn load_from_string(&self, content: &str) -> Result<Config>;

    /// 验证已解析的配置
    fn validate(&self, config: &Config) -> Result<()> {
        validate_config(config).map_err(|e| ConfigError::ValidationError(e).into())
    }
}

/// TOML配置加载器
#[derive(Debug, Clone, Copy, Default)]
pub struct TomlConfigLoader {
    expand_env: bool,
}

impl TomlConfigLoader {
    /// 创建加载器
    ///
    /// # 参数
    /// * `expand_env` - 是否展开 `${VAR}` 环境变量引用
    pub fn new(expand_env: bool) -> Self {
        Self { expand_env }
    }

    /// 逐行展开环境变量引用，`#` 开头的注释行保持原样
    ///
    /// 引用了未设置的变量时返回第一个缺失的变量名。
    fn expand(&self, content: &str) -> Result<String> {
        if !self.expand_env {
            return Ok(content.to_string());
        }

        let pattern = cached_regex(&ENV_REFERENCE, r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(ConfigError::ParseError)?;

        let mut missing: Option<String> = None;
        let expanded: Vec<String> = content
            .lines()
            .map(|line| {
                if line.trim_start().starts_with('#') {
                    return line.to_string();
                }
                pattern
                    .replace_all(line, |caps: &Captures| {
                        std::env::var(&caps[1]).unwrap_or_else(|_| {
                            missing.get_or_insert_with(|| caps[1].to_string());
                            String::new()
                        })
                    })
                    .into_owned()
            })
            .collect();

        match missing {
            Some(var) => Err(ConfigError::EnvVarError { var }.into()),
            None => Ok(expanded.join("\n")),
        }
    }

    fn parse(&self, content: &str) -> Result<Config> {
        let expanded = self.expand(content)?;
        let config: Config = toml::from_str(&expanded)
            .map_err(|e| ConfigError::ParseError(format!("TOML解析失败: {e}")))?;
        self.validate(&config)?;
        Ok(config)
    }
}

#[async_trait]
impl ConfigLoader for TomlConfigLoader {
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => ConfigError::FileNotFound {
                path: path.display().to_string(),
            },
            _ => ConfigError::ParseError(format!("读取 {} 失败: {e}", path.display())),
        })?;

        let config = self.parse(&content)?;
        tracing::debug!(
            path = %path.display(),
            endpoints = config.endpoints.len(),
            "配置文件解析完成"
        );
        Ok(config)
    }

    async fn load_from_string(&self, content: &str) -> Result<Config> {
        self.parse(content)
    }
}

/// 默认配置文件路径
///
/// 当前目录下存在 `watcher.toml` 时使用它，否则使用用户配置目录下的
/// `endpoint-watcher/watcher.toml`。
pub fn get_default_config_path() -> PathBuf {
    let local = PathBuf::from("watcher.toml");
    if local.exists() {
        return local;
    }
    dirs::config_dir()
        .map(|dir| dir.join("endpoint-watcher").join("watcher.toml"))
        .unwrap_or(local)
}

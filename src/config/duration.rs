//! 时间长度解析
//!
//! 配置文件中的时间长度使用字符串表示，例如 `500ms`、`3s`、`10m`、`1h30m`。

use regex::Regex;
use serde::{Deserialize, Deserializer, Serializer};
use std::sync::OnceLock;
use std::time::Duration;

static SEGMENT: OnceLock<Result<Regex, String>> = OnceLock::new();
static FULL: OnceLock<Result<Regex, String>> = OnceLock::new();

/// 编译并缓存正则表达式，编译失败时返回错误信息
pub(crate) fn cached_regex(
    cell: &'static OnceLock<Result<Regex, String>>,
    pattern: &str,
) -> Result<&'static Regex, String> {
    cell.get_or_init(|| Regex::new(pattern).map_err(|e| format!("正则表达式错误: {e}")))
        .as_ref()
        .map_err(Clone::clone)
}

/// 解析时间长度字符串
///
/// # 参数
/// * `input` - 形如 `1m30s` 的字符串
///
/// # 返回
/// * `Result<Duration, String>` - 解析结果，失败时返回错误信息
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let trimmed = input.trim();
    if !cached_regex(&FULL, r"^(\d+(ms|s|m|h|d))+$")?.is_match(trimmed) {
        return Err(format!("无效的时间长度: '{input}'（示例: 500ms, 3s, 10m, 1h30m）"));
    }

    let mut total = Duration::ZERO;
    for captures in cached_regex(&SEGMENT, r"(\d+)(ms|s|m|h|d)")?.captures_iter(trimmed) {
        let value: u64 = captures[1]
            .parse()
            .map_err(|e| format!("无效的时间长度: '{input}': {e}"))?;
        let segment = match &captures[2] {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.saturating_mul(60)),
            "h" => Duration::from_secs(value.saturating_mul(3600)),
            _ => Duration::from_secs(value.saturating_mul(86_400)),
        };
        total = total.saturating_add(segment);
    }

    Ok(total)
}

/// 将时间长度格式化为配置文件使用的字符串
pub fn format_duration(duration: Duration) -> String {
    if duration.is_zero() {
        return "0s".to_string();
    }

    let mut millis = duration.as_millis();
    let mut out = String::new();
    for (unit, size) in [("d", 86_400_000u128), ("h", 3_600_000), ("m", 60_000), ("s", 1_000)] {
        if millis >= size {
            out.push_str(&format!("{}{}", millis / size, unit));
            millis %= size;
        }
    }
    if millis > 0 {
        out.push_str(&format!("{millis}ms"));
    }
    out
}

/// serde 序列化
pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(*duration))
}

/// serde 反序列化
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

/// 可选时间长度的 serde 支持
pub mod option {
    use super::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&format_duration(*d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| parse_duration(&raw).map_err(serde::de::Error::custom))
            .transpose()
    }
}

//! 调度计划与重试策略
//!
//! 一个检测周期内最多尝试 `attempts` 次，第一次成功即返回；
//! 全部失败时返回最后一次尝试的结果，之前的结果被丢弃。

use crate::health::checker::Checker;
use crate::health::result::CheckOutcome;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// 端点调度计划，任务启动后不可变
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// 两个检测周期之间的间隔
    pub interval: Duration,
    /// 每个周期的总尝试次数，至少为1
    pub attempts: u32,
    /// 重试前的等待时间
    pub retry_delay: Duration,
    /// 是否使用指数退避
    pub exponential_backoff: bool,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(600),
            attempts: 3,
            retry_delay: Duration::from_secs(3),
            exponential_backoff: false,
        }
    }
}

impl Schedule {
    /// 创建调度计划
    ///
    /// `attempts` 小于1时按1处理。
    pub fn new(
        interval: Duration,
        attempts: i64,
        retry_delay: Duration,
        exponential_backoff: bool,
    ) -> Self {
        let attempts = u32::try_from(attempts.max(1)).unwrap_or(u32::MAX);
        Self {
            interval,
            attempts,
            retry_delay,
            exponential_backoff,
        }
    }

    /// 本计划对应的重试策略
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.attempts.max(1),
            retry_delay: self.retry_delay,
            exponential_backoff: self.exponential_backoff,
        }
    }
}

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 总尝试次数
    pub attempts: u32,
    /// 初始重试等待时间
    pub retry_delay: Duration,
    /// 是否使用指数退避
    pub exponential_backoff: bool,
}

/// 一个检测周期的执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleResult {
    /// 最后一次尝试的结果
    pub outcome: CheckOutcome,
    /// 实际尝试次数
    pub attempts_made: u32,
}

impl RetryPolicy {
    /// 第 `attempt` 次尝试（从1开始）之前需要等待的时间
    ///
    /// 第一次尝试之前以及超出尝试次数时返回 `None`。
    /// 指数退避时第k次尝试前等待 `retry_delay × 2^(k-2)`。
    pub fn delay_before(&self, attempt: u32) -> Option<Duration> {
        if attempt < 2 || attempt > self.attempts {
            return None;
        }
        if !self.exponential_backoff {
            return Some(self.retry_delay);
        }

        let factor = 1u32.checked_shl(attempt - 2);
        Some(
            factor
                .and_then(|f| self.retry_delay.checked_mul(f))
                .unwrap_or(Duration::MAX),
        )
    }

    /// 所有尝试都失败时依次经历的等待时间
    pub fn delays(&self) -> Vec<Duration> {
        (2..=self.attempts)
            .filter_map(|attempt| self.delay_before(attempt))
            .collect()
    }

    /// 对检测器执行一个完整的检测周期
    pub async fn execute(&self, checker: &dyn Checker) -> CycleResult {
        let mut attempt = 1;
        loop {
            debug!("第 {} 次尝试 ...", attempt);
            let outcome = checker.check().await;
            debug!("第 {} 次尝试结果: {}", attempt, outcome);

            if outcome.status.is_ok() {
                return CycleResult {
                    outcome,
                    attempts_made: attempt,
                };
            }

            match self.delay_before(attempt.saturating_add(1)) {
                Some(delay) => {
                    debug!("等待 {:?} 后重试", delay);
                    sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    return CycleResult {
                        outcome,
                        attempts_made: attempt,
                    }
                }
            }
        }
    }
}

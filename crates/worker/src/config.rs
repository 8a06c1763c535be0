// config.rs
// 工作进程配置结构体及其默认实现，包含计算服务地址、请求超时、重试策略和嵌入参数。
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// 指数退避重试策略
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// 首次重试前的等待时间（毫秒）
    pub base_delay_ms: u64,
    /// 每次重试后等待时间的倍数
    pub multiplier: f64,
    /// 单次等待的上限（毫秒），None 表示不设上限
    pub max_delay_ms: Option<u64>,
    /// 总耗时预算（毫秒），超出后不再尝试
    pub max_elapsed_ms: u64,
    /// 是否在 [0, delay] 范围内随机抖动
    pub jitter: bool,
}

impl Default for RetryPolicy {
    /// 默认策略：1秒起步，每次翻倍，总预算30秒，无抖动
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            multiplier: 2.0,
            max_delay_ms: None,
            max_elapsed_ms: 30_000,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// 第 `attempt` 次失败后（从1开始）应等待的时长，不含抖动
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let mut delay_ms = self.base_delay_ms as f64 * self.multiplier.powi(exponent);
        if let Some(cap) = self.max_delay_ms {
            delay_ms = delay_ms.min(cap as f64);
        }
        Duration::from_millis(delay_ms.min(u64::MAX as f64) as u64)
    }

    pub fn max_elapsed(&self) -> Duration {
        Duration::from_millis(self.max_elapsed_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.multiplier < 1.0 || !self.multiplier.is_finite() {
            return Err(Error::Config(format!(
                "重试倍数 {} 必须是不小于1的有限值",
                self.multiplier
            )));
        }
        Ok(())
    }
}

/// 工作进程全局配置，启动时构造一次，再传入各组件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// 外部数值计算服务的基础地址
    pub compute_service_url: String,
    /// 单次HTTP请求超时（毫秒）
    ///
    /// 重试预算只约束两次尝试之间的等待，不会中断进行中的请求；
    /// 最后一次尝试可能在预算将尽时发出，总耗时上限见 [`WorkerConfig::worst_case_duration`]。
    pub request_timeout_ms: u64,
    /// 调用计算服务时的重试策略
    pub retry: RetryPolicy,
    /// 嵌入（PCA）保留的维度数
    pub embedding_components: usize,
    /// 特征缩放后的截断上限
    pub scale_max_value: f64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            compute_service_url: "http://localhost:4000".to_string(),
            request_timeout_ms: 60_000,
            retry: RetryPolicy::default(),
            embedding_components: 2,
            scale_max_value: 10.0,
        }
    }
}

impl WorkerConfig {
    /// 从 JSON 配置文件读取，缺失的字段使用默认值
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("读取配置文件 {} 失败: {}", path.display(), e)))?;
        let config: WorkerConfig = serde_json::from_str(&contents)
            .map_err(|e| Error::Config(format!("解析配置文件 {} 失败: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 以默认配置为基础，用环境变量覆盖
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// 用给定的查找函数覆盖字段，便于测试时不依赖进程环境
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("WORKER_COMPUTE_URL") {
            self.compute_service_url = url;
        }
        if let Some(value) = lookup("WORKER_REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = parse_env_u64("WORKER_REQUEST_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("WORKER_RETRY_MAX_ELAPSED_MS") {
            self.retry.max_elapsed_ms = parse_env_u64("WORKER_RETRY_MAX_ELAPSED_MS", &value)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// 一次计算服务调用的最长耗时：重试预算加上最后一次尝试的请求超时
    pub fn worst_case_duration(&self) -> Duration {
        self.retry.max_elapsed() + self.request_timeout()
    }

    fn validate(&self) -> Result<()> {
        if self.request_timeout() > self.retry.max_elapsed() {
            warn!(
                request_timeout_ms = self.request_timeout_ms,
                max_elapsed_ms = self.retry.max_elapsed_ms,
                worst_case = ?self.worst_case_duration(),
                "单次请求超时大于重试预算，一次挂起的请求会独占整个预算"
            );
        }
        if self.compute_service_url.trim().is_empty() {
            return Err(Error::Config("计算服务地址不能为空".to_string()));
        }
        if self.embedding_components == 0 {
            return Err(Error::Config("嵌入维度必须大于0".to_string()));
        }
        self.retry.validate()
    }
}

fn parse_env_u64(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("环境变量 {} 的值 '{}' 无效: {}", key, value, e)))
}

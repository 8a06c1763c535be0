// compute_client.rs
// 计算服务客户端，负责把重计算委托给外部数值服务，并在指数退避策略下有限次重试。
use crate::config::{RetryPolicy, WorkerConfig};
use crate::error::{Error, Result};
use rand::Rng;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// 一次HTTP调用收到的响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 未收到响应时的失败类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    /// 连接失败、超时等，可以重试
    Transient(String),
    /// 请求本身无法构造或发送，不重试
    Fatal(String),
}

/// 外部计算服务的传输层
pub trait ComputeTransport: Send + Sync {
    fn post_json(&self, url: &str, body: &Value) -> std::result::Result<TransportResponse, TransportFailure>;
}

/// 基于 reqwest 阻塞客户端的HTTP传输
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("无法创建HTTP客户端: {}", e)))?;
        Ok(Self { client })
    }
}

fn classify_reqwest_error(e: &reqwest::Error) -> TransportFailure {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        TransportFailure::Transient(e.to_string())
    } else {
        TransportFailure::Fatal(e.to_string())
    }
}

impl ComputeTransport for HttpTransport {
    fn post_json(&self, url: &str, body: &Value) -> std::result::Result<TransportResponse, TransportFailure> {
        let response = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .map_err(|e| classify_reqwest_error(&e))?;
        let status = response.status().as_u16();
        finish_response(status, response.text(), classify_reqwest_error)
    }
}

/// 收到状态行之后读取响应体
///
/// 非成功状态即使响应体读取失败也按收到的状态返回，不会被当作可重试的传输错误。
fn finish_response<E: std::fmt::Display>(
    status: u16,
    body: std::result::Result<String, E>,
    classify: impl FnOnce(&E) -> TransportFailure,
) -> std::result::Result<TransportResponse, TransportFailure> {
    if (200..300).contains(&status) {
        let body = body.map_err(|e| classify(&e))?;
        return Ok(TransportResponse { status, body });
    }
    let body = body.unwrap_or_else(|e| format!("读取响应体失败: {}", e));
    Ok(TransportResponse { status, body })
}

/// 时钟抽象，使退避等待可以被替换
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// 真实时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// 手动推进的时钟：`sleep` 只累加时间，不会阻塞
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// 到目前为止所有等待的记录
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let elapsed = self.elapsed.lock().map(|e| *e).unwrap_or_default();
        self.start + elapsed
    }

    fn sleep(&self, duration: Duration) {
        if let Ok(mut elapsed) = self.elapsed.lock() {
            *elapsed += duration;
        }
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
    }
}

/// 带有限重试的计算服务客户端
pub struct RetryingComputeClient {
    base_url: String,
    policy: RetryPolicy,
    transport: Arc<dyn ComputeTransport>,
    clock: Arc<dyn Clock>,
}

impl RetryingComputeClient {
    pub fn new(
        base_url: impl Into<String>,
        policy: RetryPolicy,
        transport: Arc<dyn ComputeTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            policy,
            transport,
            clock,
        }
    }

    /// 使用HTTP传输和真实时钟，根据配置创建客户端
    pub fn from_config(config: &WorkerConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.request_timeout())?;
        Ok(Self::new(
            config.compute_service_url.clone(),
            config.retry.clone(),
            Arc::new(transport),
            Arc::new(SystemClock),
        ))
    }

    pub fn endpoint(&self, route: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            route.trim_start_matches('/')
        )
    }

    /// 调用计算服务，成功时返回未解析的响应体
    ///
    /// 只有连接失败和超时会重试；收到非成功状态码立即失败。
    /// 总耗时超出预算后返回 `TransientTransport`，不再发起新的尝试。
    pub fn invoke(&self, route: &str, body: &Value) -> Result<String> {
        let url = self.endpoint(route);
        let budget = self.policy.max_elapsed();
        let start = self.clock.now();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            debug!(%url, attempt, "调用计算服务");
            match self.transport.post_json(&url, body) {
                Ok(response) if response.is_success() => return Ok(response.body),
                Ok(response) => {
                    warn!(%url, status = response.status, "计算服务返回错误状态");
                    return Err(Error::PersistentCompute {
                        status: Some(response.status),
                        body: response.body,
                    });
                }
                Err(TransportFailure::Fatal(message)) => {
                    return Err(Error::PersistentCompute {
                        status: None,
                        body: message,
                    });
                }
                Err(TransportFailure::Transient(message)) => {
                    let elapsed = self.clock.now().saturating_duration_since(start);
                    if elapsed >= budget {
                        warn!(%url, attempt, ?elapsed, "重试预算耗尽");
                        return Err(Error::TransientTransport(format!(
                            "{} 次尝试后仍无法连接计算服务 (耗时 {:?}): {}",
                            attempt, elapsed, message
                        )));
                    }
                    let delay = self.next_delay(attempt).min(budget - elapsed);
                    warn!(%url, attempt, ?delay, error = %message, "计算服务暂时不可用，稍后重试");
                    self.clock.sleep(delay);
                }
            }
        }
    }

    fn next_delay(&self, attempt: u32) -> Duration {
        let delay = self.policy.delay_for(attempt);
        if self.policy.jitter && !delay.is_zero() {
            let millis = rand::thread_rng().gen_range(0..=delay.as_millis() as u64);
            Duration::from_millis(millis)
        } else {
            delay
        }
    }
}

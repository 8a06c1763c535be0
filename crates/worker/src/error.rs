// error.rs
// 定义工作进程通用的错误类型（校验、未找到、传输、计算服务等）和Result类型。
use thiserror::Error;

/// 工作进程通用错误类型
///
/// 前四种是任务级错误，会在任务边界被转换为 `Result.error`；
/// 其余错误不会被吞掉，而是继续向调用方传播。
#[derive(Debug, Error)]
pub enum Error {
    /// 请求字段格式错误或不受支持（未知列、未知嵌入类型等）
    #[error("校验错误: {0}")]
    Validation(String),
    /// 请求引用的细胞集或基因不存在
    #[error("未找到: {0}")]
    NotFound(String),
    /// 调用外部计算服务时的网络/超时错误，重试预算耗尽后才会出现
    #[error("传输错误: {0}")]
    TransientTransport(String),
    /// 外部计算服务返回非成功状态，或在成功响应中携带了业务错误
    #[error("计算服务错误 (status={status:?}): {body}")]
    PersistentCompute { status: Option<u16>, body: String },
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),
    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
    /// JSON 序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),
    /// 其他类型错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 通用结果类型
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// 业务层错误：响应状态码为成功，但响应体中带有错误字段
    pub fn domain(body: impl Into<String>) -> Self {
        Self::PersistentCompute {
            status: None,
            body: body.into(),
        }
    }

    /// 是否为任务级错误（会被格式化进 `Result.error`）
    pub fn is_task_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::NotFound(_)
                | Error::TransientTransport(_)
                | Error::PersistentCompute { .. }
        )
    }
}

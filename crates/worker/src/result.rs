// result.rs
// 结果格式化器，负责把任务的输出或任务级错误包装成对外的 `{data, error}` 结构。
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 对外的任务结果，`data` 和 `error` 只有一个有意义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub data: Option<Value>,
    pub error: Option<String>,
}

impl TaskResult {
    pub fn success(data: Value) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// 结果格式化器
pub struct ResultFormatter;

impl ResultFormatter {
    /// 任务级错误写入 `error` 且不带部分结果；其他错误原样返回给调用方
    pub fn format(outcome: Result<Value>) -> Result<TaskResult> {
        match outcome {
            Ok(data) => Ok(TaskResult::success(data)),
            Err(e) if e.is_task_error() => Ok(TaskResult::failure(e.to_string())),
            Err(e) => Err(e),
        }
    }
}

// observer.rs
// 任务观察者：调度器在每次状态转换和任务结束时通知观察者，与具体日志后端解耦。
use crate::task::TaskState;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 任务生命周期中的一次通知
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    StateChanged {
        task_id: String,
        task_name: &'static str,
        state: TaskState,
    },
    Finished {
        task_id: String,
        task_name: &'static str,
        succeeded: bool,
        elapsed: Duration,
    },
}

/// 任务观察者
pub trait TaskObserver: Send + Sync {
    /// 状态转换
    fn on_state(&self, task_id: &str, task_name: &'static str, state: &TaskState);

    /// 任务结束，`succeeded` 为 false 表示结果中带有任务级错误
    fn on_finish(&self, task_id: &str, task_name: &'static str, succeeded: bool, elapsed: Duration) {
        let _ = (task_id, task_name, succeeded, elapsed);
    }
}

/// 把状态转换写入 tracing 日志
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TaskObserver for TracingObserver {
    fn on_state(&self, task_id: &str, task_name: &'static str, state: &TaskState) {
        match state {
            TaskState::Failed(reason) => warn!(task_id, task = task_name, %reason, "任务失败"),
            other => debug!(task_id, task = task_name, state = ?other, "任务状态变更"),
        }
    }

    fn on_finish(&self, task_id: &str, task_name: &'static str, succeeded: bool, elapsed: Duration) {
        info!(task_id, task = task_name, succeeded, ?elapsed, "任务结束");
    }
}

/// 按顺序记录所有通知
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<TaskEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TaskEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// 只取状态序列
    pub fn states(&self) -> Vec<TaskState> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                TaskEvent::StateChanged { state, .. } => Some(state),
                TaskEvent::Finished { .. } => None,
            })
            .collect()
    }

    fn push(&self, event: TaskEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl TaskObserver for RecordingObserver {
    fn on_state(&self, task_id: &str, task_name: &'static str, state: &TaskState) {
        self.push(TaskEvent::StateChanged {
            task_id: task_id.to_string(),
            task_name,
            state: state.clone(),
        });
    }

    fn on_finish(&self, task_id: &str, task_name: &'static str, succeeded: bool, elapsed: Duration) {
        self.push(TaskEvent::Finished {
            task_id: task_id.to_string(),
            task_name,
            succeeded,
            elapsed,
        });
    }
}

// dispatcher.rs
// 任务调度器：按请求体类型选择任务实现，驱动任务状态机并生成结果。
use crate::context::WorkerContext;
use crate::error::Result;
use crate::observer::{TaskObserver, TracingObserver};
use crate::result::{ResultFormatter, TaskResult};
use crate::task::{Task, TaskBody, TaskRequest, TaskState};
use crate::tasks::{EmbeddingTask, GeneExpressionTask, ListGenesTask, MarkerHeatmapTask};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::info_span;
use uuid::Uuid;

/// 任务调度器，每个请求在调用方线程上同步执行
#[derive(Clone)]
pub struct TaskDispatcher {
    ctx: WorkerContext,
    observer: Arc<dyn TaskObserver>,
}

impl TaskDispatcher {
    pub fn new(ctx: WorkerContext, observer: Arc<dyn TaskObserver>) -> Self {
        Self { ctx, observer }
    }

    /// 使用 tracing 日志作为观察者
    pub fn with_tracing(ctx: WorkerContext) -> Self {
        Self::new(ctx, Arc::new(TracingObserver))
    }

    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    /// 执行一个请求；任务级错误写入结果，其他错误返回 `Err`
    pub fn dispatch(&self, request: TaskRequest) -> Result<TaskResult> {
        let task_id = request
            .task_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let span = info_span!(
            "task",
            name = request.body.task_name(),
            experiment_id = %request.experiment_id,
            task_id = %task_id
        );
        let _enter = span.enter();
        let experiment_id = request.experiment_id;
        match request.body {
            TaskBody::MarkerHeatmap(params) => {
                self.run(&task_id, MarkerHeatmapTask::new(experiment_id, params))
            }
            TaskBody::GeneExpression(params) => {
                self.run(&task_id, GeneExpressionTask::new(experiment_id, params))
            }
            TaskBody::ListGenes(params) => {
                self.run(&task_id, ListGenesTask::new(experiment_id, params))
            }
            TaskBody::Embedding(params) => {
                self.run(&task_id, EmbeddingTask::new(experiment_id, params))
            }
        }
    }

    /// 解析并执行 JSON 请求；请求格式错误同样作为任务级错误返回
    pub fn dispatch_json(&self, json: &str) -> Result<TaskResult> {
        match TaskRequest::from_json(json) {
            Ok(request) => self.dispatch(request),
            Err(e) => ResultFormatter::format(Err(e)),
        }
    }

    pub fn dispatch_value(&self, value: Value) -> Result<TaskResult> {
        match TaskRequest::from_value(value) {
            Ok(request) => self.dispatch(request),
            Err(e) => ResultFormatter::format(Err(e)),
        }
    }

    fn run<T: Task>(&self, task_id: &str, task: T) -> Result<TaskResult> {
        let name = task.name();
        let started = Instant::now();

        self.observer.on_state(task_id, name, &TaskState::Created);
        let outcome = self.execute(task_id, &task);
        let formatted = ResultFormatter::format(outcome);

        let succeeded = match &formatted {
            Ok(result) if result.is_success() => {
                self.observer.on_state(task_id, name, &TaskState::Completed);
                true
            }
            Ok(result) => {
                let reason = result.error.clone().unwrap_or_default();
                self.observer.on_state(task_id, name, &TaskState::Failed(reason));
                false
            }
            Err(e) => {
                self.observer.on_state(task_id, name, &TaskState::Failed(e.to_string()));
                false
            }
        };
        self.observer.on_finish(task_id, name, succeeded, started.elapsed());
        formatted
    }

    fn execute<T: Task>(&self, task_id: &str, task: &T) -> Result<Value> {
        let name = task.name();
        self.observer.on_state(task_id, name, &TaskState::ResolvingInputs);
        let inputs = task.resolve_inputs(&self.ctx)?;
        self.observer.on_state(task_id, name, &TaskState::Computing);
        let output = task.compute(&self.ctx, inputs)?;
        self.observer.on_state(task_id, name, &TaskState::Formatting);
        Ok(output)
    }
}

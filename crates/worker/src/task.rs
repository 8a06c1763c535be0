// task.rs
// 任务请求、任务状态和任务执行约定。
use crate::context::WorkerContext;
use crate::error::{Error, Result};
use crate::types::CellSelection;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 任务状态枚举，描述单个任务实例的生命周期
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    /// 已创建，尚未开始
    Created,
    /// 正在解析输入（细胞集、基因、查询参数）
    ResolvingInputs,
    /// 正在计算（本地统计、委托计算或表查询）
    Computing,
    /// 正在生成结果
    Formatting,
    /// 成功完成
    Completed,
    /// 以任务级错误结束，包含错误描述
    Failed(String),
}

/// MarkerHeatmap 请求体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerHeatmapParams {
    pub n_genes: usize,
    pub cell_set_key: String,
}

/// GeneExpression 请求体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneExpressionParams {
    pub genes: Vec<String>,
    #[serde(default)]
    pub cell_sets: CellSelection,
    /// 是否做特征缩放，默认不做
    #[serde(default)]
    pub scale: bool,
}

/// ListGenes 请求体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListGenesParams {
    pub select_fields: Vec<String>,
    #[serde(default)]
    pub gene_names_filter: Option<String>,
    pub order_by: String,
    pub order_direction: String,
    pub offset: usize,
    pub limit: usize,
}

/// Embedding 请求体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingParams {
    #[serde(rename = "type")]
    pub kind: String,
}

/// 任务请求体，按 `name` 字段区分任务类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum TaskBody {
    MarkerHeatmap(MarkerHeatmapParams),
    GeneExpression(GeneExpressionParams),
    ListGenes(ListGenesParams),
    #[serde(rename = "GetEmbedding", alias = "Embedding")]
    Embedding(EmbeddingParams),
}

impl TaskBody {
    pub fn task_name(&self) -> &'static str {
        match self {
            TaskBody::MarkerHeatmap(_) => "MarkerHeatmap",
            TaskBody::GeneExpression(_) => "GeneExpression",
            TaskBody::ListGenes(_) => "ListGenes",
            TaskBody::Embedding(_) => "GetEmbedding",
        }
    }
}

/// 任务请求：`{experimentId, body}`，派发后不可修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    /// 任务唯一ID，缺省时由调度器生成
    #[serde(default)]
    pub task_id: Option<String>,
    pub experiment_id: String,
    pub body: TaskBody,
}

impl TaskRequest {
    /// 解析请求，格式错误视为校验错误
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::validation(format!("无效的任务请求: {}", e)))
    }

    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::validation(format!("无效的任务请求: {}", e)))
    }
}

/// 各任务类型的执行约定
///
/// 调度器先调用 `resolve_inputs`，再把结果交给 `compute`；
/// 两步都只读共享数据（嵌入任务写入自己的槽位除外）。
pub trait Task {
    type Inputs;

    fn name(&self) -> &'static str;

    fn resolve_inputs(&self, ctx: &WorkerContext) -> Result<Self::Inputs>;

    fn compute(&self, ctx: &WorkerContext, inputs: Self::Inputs) -> Result<Value>;
}

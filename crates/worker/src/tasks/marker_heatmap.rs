// marker_heatmap.rs
// 标记基因热图任务：解析细胞集，委托外部计算服务，再对返回的表达量逐基因汇总。
use crate::context::WorkerContext;
use crate::error::{Error, Result};
use crate::statistics::ExpressionStatisticsEngine;
use crate::task::{MarkerHeatmapParams, Task};
use crate::types::{ExpressionVector, MARKER_HEATMAP_ROUTE};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::{debug, info};

pub struct MarkerHeatmapTask {
    pub experiment_id: String,
    pub params: MarkerHeatmapParams,
}

impl MarkerHeatmapTask {
    pub fn new(experiment_id: impl Into<String>, params: MarkerHeatmapParams) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            params,
        }
    }
}

impl Task for MarkerHeatmapTask {
    /// 发给计算服务的请求体
    type Inputs = Value;

    fn name(&self) -> &'static str {
        "MarkerHeatmap"
    }

    fn resolve_inputs(&self, ctx: &WorkerContext) -> Result<Value> {
        let (cell_set, membership) = ctx
            .resolver
            .locate(&self.experiment_id, &self.params.cell_set_key)?;
        debug!(
            cell_set = %self.params.cell_set_key,
            cells = membership.len(),
            "标记基因热图的细胞集已解析"
        );
        Ok(json!({
            "nGenes": self.params.n_genes,
            "cellSets": cell_set,
        }))
    }

    fn compute(&self, ctx: &WorkerContext, request: Value) -> Result<Value> {
        let body = ctx.compute.invoke(MARKER_HEATMAP_ROUTE, &request)?;
        let response: Value = serde_json::from_str(&body)
            .map_err(|e| Error::domain(format!("计算服务返回了无效的JSON: {}", e)))?;

        // 状态码为200的响应仍可能携带业务错误
        if let Some(error) = embedded_error(&response) {
            return Err(Error::domain(error));
        }

        let raw = ordered_expression(&response, "rawExpression")?;
        let truncated: HashMap<String, ExpressionVector> =
            ordered_expression(&response, "truncatedExpression")?
                .into_iter()
                .collect();
        let summaries = ExpressionStatisticsEngine::summarize_markers(raw, truncated)?;
        info!(genes = summaries.order.len(), "标记基因热图计算完成");
        Ok(serde_json::to_value(summaries)?)
    }
}

/// 响应中的 `error` 字段；null、false 和空字符串视为没有错误
fn embedded_error(response: &Value) -> Option<String> {
    match response.get("error")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// 按响应中的键顺序读取 `{gene: [values]}`
fn ordered_expression(response: &Value, field: &str) -> Result<Vec<(String, ExpressionVector)>> {
    let map: &Map<String, Value> = response
        .get(field)
        .and_then(Value::as_object)
        .ok_or_else(|| Error::domain(format!("计算服务响应缺少 {} 字段", field)))?;
    map.iter()
        .map(|(gene, values)| {
            let vector: ExpressionVector = serde_json::from_value(values.clone()).map_err(|e| {
                Error::domain(format!("{} 中基因 {} 的表达量格式错误: {}", field, gene, e))
            })?;
            Ok((gene.clone(), vector))
        })
        .collect()
}

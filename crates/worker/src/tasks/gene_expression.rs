// gene_expression.rs
// 基因表达任务：按细胞集（或全部细胞）和基因列表取出表达矩阵，可选特征缩放，并给出全局最小/最大值。
use crate::cell_sets::ResolvedCells;
use crate::context::WorkerContext;
use crate::error::{Error, Result};
use crate::statistics::ExpressionStatisticsEngine;
use crate::task::{GeneExpressionParams, Task};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

pub struct GeneExpressionTask {
    pub experiment_id: String,
    pub params: GeneExpressionParams,
}

/// 解析后的行列下标
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionSelection {
    /// 数据集中被选中细胞的位置，已按输出顺序排列
    pub cells: Vec<usize>,
    /// 请求基因在数据集中的位置，顺序与请求一致
    pub genes: Vec<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeneExpressionRow {
    gene_name: String,
    expression: Vec<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeneExpressionResult {
    cells: Vec<crate::types::CellId>,
    data: Vec<GeneExpressionRow>,
    min_expression: f64,
    max_expression: f64,
}

impl GeneExpressionTask {
    pub fn new(experiment_id: impl Into<String>, params: GeneExpressionParams) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            params,
        }
    }
}

impl Task for GeneExpressionTask {
    type Inputs = ExpressionSelection;

    fn name(&self) -> &'static str {
        "GeneExpression"
    }

    fn resolve_inputs(&self, ctx: &WorkerContext) -> Result<ExpressionSelection> {
        let dataset = &ctx.dataset;
        let genes = self
            .params
            .genes
            .iter()
            .map(|gene| {
                dataset
                    .gene_position(gene)
                    .ok_or_else(|| Error::not_found(format!("基因 {} 不在数据集中", gene)))
            })
            .collect::<Result<Vec<_>>>()?;

        let cells: Vec<usize> = match ctx
            .resolver
            .resolve_selection(&self.experiment_id, &self.params.cell_sets)?
        {
            ResolvedCells::All => (0..dataset.cell_ids().len()).collect(),
            ResolvedCells::Members(membership) => {
                // 目录中存在但数据集中没有的细胞被丢弃；其余按 (细胞集key, 细胞ID) 排序
                let mut present: Vec<(&str, u64, usize)> = membership
                    .iter()
                    .filter_map(|(cell, key)| {
                        dataset
                            .cell_position(*cell)
                            .map(|pos| (key.as_str(), *cell, pos))
                    })
                    .collect();
                present.sort();
                present.into_iter().map(|(_, _, pos)| pos).collect()
            }
        };
        debug!(cells = cells.len(), genes = genes.len(), "基因表达的输入已解析");
        Ok(ExpressionSelection { cells, genes })
    }

    fn compute(&self, ctx: &WorkerContext, selection: ExpressionSelection) -> Result<Value> {
        let matrix = ctx.dataset.expression();
        let mut rows: Vec<GeneExpressionRow> = selection
            .genes
            .iter()
            .zip(&self.params.genes)
            .map(|(&gene, name)| GeneExpressionRow {
                gene_name: name.clone(),
                expression: selection.cells.iter().map(|&cell| matrix[(cell, gene)]).collect(),
            })
            .collect();

        if self.params.scale {
            for row in &mut rows {
                scale_in_place(&mut row.expression, ctx.config.scale_max_value);
            }
        }

        let (min_expression, max_expression) = ExpressionStatisticsEngine::min_max(
            rows.iter().flat_map(|row| row.expression.iter().copied()),
        )
        .unwrap_or((0.0, 0.0));

        let result = GeneExpressionResult {
            cells: selection
                .cells
                .iter()
                .map(|&pos| ctx.dataset.cell_ids()[pos])
                .collect(),
            data: rows,
            min_expression,
            max_expression,
        };
        Ok(serde_json::to_value(result)?)
    }
}

/// 特征缩放：中心化到均值0，除以样本标准差（n-1），再把超过 `max_value` 的值截断
///
/// 标准差为0或样本不足两个时按1处理。
pub fn scale_in_place(values: &mut [f64], max_value: f64) {
    let n = values.len();
    if n == 0 {
        return;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let std = if n > 1 {
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        variance.sqrt()
    } else {
        0.0
    };
    let std = if std == 0.0 { 1.0 } else { std };
    for v in values.iter_mut() {
        *v = ((*v - mean) / std).min(max_value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, EXPERIMENT_ID};
    use crate::types::CellSelection;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn task(genes: &[&str], cell_sets: CellSelection, scale: bool) -> GeneExpressionTask {
        GeneExpressionTask::new(
            EXPERIMENT_ID,
            GeneExpressionParams {
                genes: genes.iter().map(|g| g.to_string()).collect(),
                cell_sets,
                scale,
            },
        )
    }

    fn run(t: &GeneExpressionTask) -> Result<Value> {
        let ctx = context();
        let inputs = t.resolve_inputs(&ctx)?;
        t.compute(&ctx, inputs)
    }

    #[test]
    fn test_all_cells_in_dataset_order() {
        let result = run(&task(&["Cd8", "Cd3"], CellSelection::Keyword("all".into()), false)).unwrap();
        assert_eq!(result["cells"], json!([1, 2, 3, 4, 5, 6]));
        assert_eq!(result["data"][0]["geneName"], "Cd8");
        assert_eq!(result["data"][0]["expression"], json!([0.0, 1.0, 3.0, 0.0, 0.0, 2.0]));
        assert_eq!(result["minExpression"], 0.0);
        assert_eq!(result["maxExpression"], 3.0);
    }

    #[test]
    fn test_cell_sets_sorted_by_key_then_cell() {
        // B 包含 5、4；C 包含 6 和一个不在数据集中的 99
        let selection = CellSelection::Sets(vec!["C".into(), "B".into()]);
        let result = run(&task(&["Cd19"], selection, false)).unwrap();
        assert_eq!(result["cells"], json!([4, 5, 6]));
        assert_eq!(result["data"][0]["expression"], json!([4.0, 2.0, 0.0]));
    }

    #[test]
    fn test_selection_positions_follow_dataset_order() {
        let ctx = context();
        let t = task(&["Actb", "Cd3"], CellSelection::Sets(vec!["B".into()]), false);
        let selection = t.resolve_inputs(&ctx).unwrap();
        assert_eq!(
            selection,
            ExpressionSelection {
                cells: vec![3, 4],
                genes: vec![3, 0],
            }
        );
    }

    #[test]
    fn test_hierarchical_set_expands_children() {
        let selection = CellSelection::Sets(vec!["A".into()]);
        let result = run(&task(&["Actb"], selection, false)).unwrap();
        assert_eq!(result["cells"], json!([1, 2, 3]));
        assert_eq!(result["minExpression"], 5.0);
        assert_eq!(result["maxExpression"], 6.0);
    }

    #[test]
    fn test_empty_selection_defaults_to_zero() {
        let result = run(&task(&["Cd3"], CellSelection::Sets(vec![]), false)).unwrap();
        assert_eq!(result["cells"], json!([]));
        assert_eq!(result["minExpression"], 0.0);
        assert_eq!(result["maxExpression"], 0.0);

        let result = run(&task(&[], CellSelection::Keyword("all".into()), false)).unwrap();
        assert_eq!(result["data"], json!([]));
        assert_eq!(result["maxExpression"], 0.0);
    }

    #[test]
    fn test_missing_gene_is_not_found() {
        let err = run(&task(&["Cd3", "Xist"], CellSelection::Keyword("all".into()), false)).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_scaled_statistics_use_scaled_values() {
        let result = run(&task(&["Cd3"], CellSelection::Keyword("all".into()), true)).unwrap();
        let values: Vec<f64> = result["data"][0]["expression"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_f64().unwrap())
            .collect();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        assert_relative_eq!(mean, 0.0, epsilon = 1e-12);
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        assert_relative_eq!(result["minExpression"].as_f64().unwrap(), min);
    }

    #[test]
    fn test_scale_clips_upper_tail_and_handles_constant_genes() {
        let mut constant = vec![5.0, 5.0, 5.0];
        scale_in_place(&mut constant, 10.0);
        assert_eq!(constant, vec![0.0, 0.0, 0.0]);

        let mut spiky = vec![0.0; 200];
        spiky[0] = 1000.0;
        scale_in_place(&mut spiky, 10.0);
        assert_eq!(spiky[0], 10.0);
        assert!(spiky[1] < 0.0);
    }
}

// list_genes.rs
// 基因列表任务：对数据集的基因元数据表做过滤、排序和分页。
use crate::context::WorkerContext;
use crate::error::Result;
use crate::gene_table::{GeneQuery, OrderDirection};
use crate::task::{ListGenesParams, Task};
use serde_json::Value;
use tracing::debug;

pub struct ListGenesTask {
    pub experiment_id: String,
    pub params: ListGenesParams,
}

impl ListGenesTask {
    pub fn new(experiment_id: impl Into<String>, params: ListGenesParams) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            params,
        }
    }
}

impl Task for ListGenesTask {
    type Inputs = GeneQuery;

    fn name(&self) -> &'static str {
        "ListGenes"
    }

    fn resolve_inputs(&self, _ctx: &WorkerContext) -> Result<GeneQuery> {
        let direction: OrderDirection = self.params.order_direction.parse()?;
        Ok(GeneQuery {
            select: self.params.select_fields.clone(),
            filter: self.params.gene_names_filter.clone(),
            order_by: self.params.order_by.clone(),
            direction,
            offset: self.params.offset,
            limit: self.params.limit,
        })
    }

    fn compute(&self, ctx: &WorkerContext, query: GeneQuery) -> Result<Value> {
        let page = ctx.dataset.gene_table().query(&query)?;
        debug!(
            experiment_id = %self.experiment_id,
            total = page.total,
            returned = page.rows.len(),
            "基因列表查询完成"
        );
        Ok(serde_json::to_value(page)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::test_support::{context, EXPERIMENT_ID};
    use serde_json::json;

    fn params(filter: Option<&str>, direction: &str, offset: usize, limit: usize) -> ListGenesParams {
        ListGenesParams {
            select_fields: vec!["gene_names".into(), "gene_ids".into()],
            gene_names_filter: filter.map(str::to_string),
            order_by: "gene_names".into(),
            order_direction: direction.into(),
            offset,
            limit,
        }
    }

    fn run(p: ListGenesParams) -> Result<Value> {
        let ctx = context();
        let t = ListGenesTask::new(EXPERIMENT_ID, p);
        let query = t.resolve_inputs(&ctx)?;
        t.compute(&ctx, query)
    }

    #[test]
    fn test_filtered_page_with_total() {
        let result = run(params(Some("Cd%"), "asc", 0, 2)).unwrap();
        assert_eq!(result["total"], 3);
        assert_eq!(
            result["rows"],
            json!([
                {"gene_names": "Cd19", "gene_ids": "ENSMUSG00000030724"},
                {"gene_names": "Cd3", "gene_ids": "ENSMUSG00000002033"}
            ])
        );
    }

    #[test]
    fn test_descending_without_filter() {
        let result = run(params(None, "DESC", 1, 10)).unwrap();
        assert_eq!(result["total"], 4);
        let names: Vec<&str> = result["rows"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["gene_names"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Cd3", "Cd19", "Actb"]);
    }

    #[test]
    fn test_invalid_direction_is_validation_error() {
        assert!(matches!(
            run(params(None, "random", 0, 10)),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_zero_limit_returns_only_total() {
        let result = run(params(Some("%"), "asc", 0, 0)).unwrap();
        assert_eq!(result["total"], 4);
        assert_eq!(result["rows"], json!([]));
    }
}

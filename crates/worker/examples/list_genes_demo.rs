//! list_genes_demo.rs
//!
//! 演示基因列表查询：构造一个小数据集，分页浏览以 "Cd" 开头的基因，并以表格形式打印。

use serde_json::json;
use std::sync::Arc;
use worker::gene_table::{GeneQuery, GeneTable, OrderDirection, QueryPage};
use worker::{Dataset, InMemoryCatalog, Result, TaskDispatcher, WorkerConfig, WorkerContext};

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    println!("=== 基因列表查询示例 ===");

    let genes = ["Cd19", "Cd3", "Cd8", "Abc1", "Cd4", "Actb"];
    let table = GeneTable::new(
        vec!["gene_names".into(), "gene_ids".into(), "dispersions".into()],
        genes
            .iter()
            .enumerate()
            .map(|(i, g)| vec![json!(g), json!(format!("ENSMUSG{:08}", i)), json!(i as f64 * 0.3)])
            .collect(),
    )?;
    let rows = vec![vec![1.0; genes.len()]; 3];
    let dataset = Dataset::new(vec![1, 2, 3], genes.iter().map(|g| g.to_string()).collect(), rows)?
        .with_gene_table(table);

    let ctx = WorkerContext::from_config(
        WorkerConfig::default(),
        Arc::new(dataset),
        Arc::new(InMemoryCatalog::new()),
    )?;
    let dispatcher = TaskDispatcher::with_tracing(ctx);
    let columns = vec!["gene_names".to_string(), "gene_ids".to_string()];

    let page_size = 2;
    let mut offset = 0;
    loop {
        let result = dispatcher.dispatch_value(json!({
            "experimentId": "demo",
            "body": {
                "name": "ListGenes",
                "selectFields": columns,
                "geneNamesFilter": "Cd%",
                "orderBy": "gene_names",
                "orderDirection": "asc",
                "offset": offset,
                "limit": page_size
            }
        }))?;
        let Some(data) = result.data else {
            println!("查询失败: {:?}", result.error);
            break;
        };
        let page = QueryPage {
            total: data["total"].as_u64().unwrap_or(0) as usize,
            rows: data["rows"]
                .as_array()
                .map(|rows| rows.iter().filter_map(|r| r.as_object().cloned()).collect())
                .unwrap_or_default(),
        };
        println!("\n第 {} 页（共 {} 个匹配基因）", offset / page_size + 1, page.total);
        page.to_table(&columns).printstd();
        offset += page_size;
        if offset >= page.total {
            break;
        }
    }

    // 直接使用查询引擎：按离散度降序
    let query = GeneQuery {
        select: vec!["gene_names".into(), "dispersions".into()],
        filter: None,
        order_by: "dispersions".into(),
        direction: "DESC".parse::<OrderDirection>()?,
        offset: 0,
        limit: 3,
    };
    let top = dispatcher.context().dataset.gene_table().query(&query)?;
    println!("\n离散度最高的 {} 个基因：", top.rows.len());
    top.to_table(&query.select).printstd();
    Ok(())
}

//! marker_heatmap_demo.rs
//!
//! 演示标记基因热图任务的完整流程，不依赖真实的计算服务：
//! 1. 用进程内的模拟计算服务代替 HTTP 传输，前两次调用模拟连接超时。
//! 2. 用手动时钟代替真实等待，观察退避间隔。
//! 3. 打印按基因汇总后的结果。

use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use worker::{
    CellSet, ComputeTransport, Dataset, InMemoryCatalog, ManualClock, RecordingObserver, Result,
    RetryingComputeClient, TaskDispatcher, TransportFailure, TransportResponse, WorkerConfig,
    WorkerContext,
};

/// 模拟的计算服务：按请求中的细胞集返回每个基因在这些细胞上的表达量
struct FakeComputeService {
    dataset: Arc<Dataset>,
    calls: AtomicUsize,
    failures_before_success: usize,
}

impl FakeComputeService {
    fn cells_of(node: &Value, out: &mut Vec<u64>) {
        if let Some(ids) = node["cellIds"].as_array() {
            out.extend(ids.iter().filter_map(Value::as_u64));
        }
        if let Some(children) = node["childSets"].as_array() {
            for child in children {
                Self::cells_of(child, out);
            }
        }
    }
}

impl ComputeTransport for FakeComputeService {
    fn post_json(
        &self,
        url: &str,
        body: &Value,
    ) -> std::result::Result<TransportResponse, TransportFailure> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        println!("  -> 第 {} 次调用 {}", call, url);
        if call <= self.failures_before_success {
            return Err(TransportFailure::Transient("模拟的连接超时".into()));
        }

        let mut cells = Vec::new();
        Self::cells_of(&body["cellSets"], &mut cells);
        let n_genes = body["nGenes"].as_u64().unwrap_or(0) as usize;
        let matrix = self.dataset.expression();

        let mut raw = serde_json::Map::new();
        let mut truncated = serde_json::Map::new();
        for (gene_pos, gene) in self.dataset.gene_names().iter().enumerate().take(n_genes) {
            let values: Vec<Value> = cells
                .iter()
                .map(|cell| match self.dataset.cell_position(*cell) {
                    Some(pos) => json!(matrix[(pos, gene_pos)]),
                    None => Value::Null,
                })
                .collect();
            let clipped: Vec<Value> = values
                .iter()
                .map(|v| v.as_f64().map_or(Value::Null, |x| json!(x.min(2.0))))
                .collect();
            raw.insert(gene.clone(), Value::Array(values));
            truncated.insert(gene.clone(), Value::Array(clipped));
        }
        Ok(TransportResponse {
            status: 200,
            body: json!({"rawExpression": raw, "truncatedExpression": truncated}).to_string(),
        })
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    println!("=== 标记基因热图示例 ===");

    let dataset = Arc::new(Dataset::new(
        vec![1, 2, 3, 4],
        vec!["Cd3".into(), "Cd8".into(), "Ms4a1".into()],
        vec![
            vec![1.0, 0.0, 0.0],
            vec![2.0, 1.0, 0.0],
            vec![0.0, 3.0, 1.0],
            vec![0.0, 0.0, 4.0],
        ],
    )?);

    let mut catalog = InMemoryCatalog::new();
    catalog.insert(
        "demo",
        vec![CellSet::new("louvain", "Louvain clusters")
            .with_child(
                CellSet::new("T", "T cells")
                    .with_cells([1, 2])
                    .with_child(CellSet::new("T8", "CD8 T cells").with_cells([3])),
            )
            .with_child(CellSet::new("B", "B cells").with_cells([4]))],
    );

    let config = WorkerConfig::default();
    let transport = Arc::new(FakeComputeService {
        dataset: dataset.clone(),
        calls: AtomicUsize::new(0),
        failures_before_success: 2,
    });
    let clock = Arc::new(ManualClock::new());
    let compute = RetryingComputeClient::new(
        config.compute_service_url.clone(),
        config.retry.clone(),
        transport,
        clock.clone(),
    );
    let ctx = WorkerContext::new(config, dataset, Arc::new(catalog), Arc::new(compute));
    let observer = Arc::new(RecordingObserver::new());
    let dispatcher = TaskDispatcher::new(ctx, observer.clone());

    let result = dispatcher.dispatch_value(json!({
        "experimentId": "demo",
        "body": {"name": "MarkerHeatmap", "nGenes": 3, "cellSetKey": "T"}
    }))?;

    println!("\n退避等待: {:?}", clock.sleeps());
    println!("状态序列: {:?}", observer.states());
    println!("\n结果:\n{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

// test_support.rs
// 单元测试共用的数据集、细胞集目录和可编排的传输层。
use crate::cell_sets::{CellSet, InMemoryCatalog};
use crate::compute_client::{
    ComputeTransport, ManualClock, RetryingComputeClient, TransportFailure, TransportResponse,
};
use crate::config::{RetryPolicy, WorkerConfig};
use crate::context::WorkerContext;
use crate::dataset::Dataset;
use crate::gene_table::GeneTable;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub const EXPERIMENT_ID: &str = "e52b39624588791a7889e39c617f669e";

type Outcome = std::result::Result<TransportResponse, TransportFailure>;

/// 按预设顺序返回结果的传输层，记录每次调用
pub struct ScriptedTransport {
    outcomes: Mutex<VecDeque<Outcome>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedTransport {
    pub fn new(outcomes: Vec<Outcome>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

impl ComputeTransport for ScriptedTransport {
    fn post_json(&self, url: &str, body: &Value) -> Outcome {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), body.clone()));
        // 脚本用完后一直返回连接失败
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportFailure::Transient("connection refused".into())))
    }
}

pub fn ok(body: impl Into<String>) -> Outcome {
    Ok(TransportResponse {
        status: 200,
        body: body.into(),
    })
}

pub fn transient() -> Outcome {
    Err(TransportFailure::Transient("timed out".into()))
}

pub fn test_policy() -> RetryPolicy {
    RetryPolicy {
        base_delay_ms: 1000,
        multiplier: 2.0,
        max_delay_ms: None,
        max_elapsed_ms: 30_000,
        jitter: false,
    }
}

pub fn sample_forest() -> Vec<CellSet> {
    vec![
        CellSet::new("louvain", "Louvain clusters")
            .with_child(
                CellSet::new("A", "Cluster A")
                    .with_cells([1, 2])
                    .with_child(CellSet::new("A1", "Sub A1").with_cells([3])),
            )
            .with_child(CellSet::new("B", "Cluster B").with_cells([5, 4])),
        CellSet::new("C", "Custom").with_cells([6, 99]),
    ]
}

/// 6个细胞 × 4个基因
pub fn sample_dataset() -> Dataset {
    let genes = vec!["Cd3".into(), "Cd8".into(), "Cd19".into(), "Actb".into()];
    let rows = vec![
        vec![1.0, 0.0, 0.0, 5.0],
        vec![2.0, 1.0, 0.0, 5.0],
        vec![0.0, 3.0, 1.0, 6.0],
        vec![0.0, 0.0, 4.0, 4.0],
        vec![1.0, 0.0, 2.0, 5.0],
        vec![3.0, 2.0, 0.0, 7.0],
    ];
    let table = GeneTable::new(
        vec!["gene_names".into(), "gene_ids".into()],
        vec![
            vec![json!("Cd3"), json!("ENSMUSG00000002033")],
            vec![json!("Cd8"), json!("ENSMUSG00000053977")],
            vec![json!("Cd19"), json!("ENSMUSG00000030724")],
            vec![json!("Actb"), json!("ENSMUSG00000029580")],
        ],
    )
    .unwrap();
    Dataset::new(vec![1, 2, 3, 4, 5, 6], genes, rows)
        .unwrap()
        .with_gene_table(table)
}

pub fn context_with(transport: Arc<ScriptedTransport>) -> WorkerContext {
    let mut catalog = InMemoryCatalog::new();
    catalog.insert(EXPERIMENT_ID, sample_forest());
    let config = WorkerConfig {
        retry: test_policy(),
        ..Default::default()
    };
    let compute = RetryingComputeClient::new(
        config.compute_service_url.clone(),
        config.retry.clone(),
        transport,
        Arc::new(ManualClock::new()),
    );
    WorkerContext::new(
        config,
        Arc::new(sample_dataset()),
        Arc::new(catalog),
        Arc::new(compute),
    )
}

pub fn context() -> WorkerContext {
    context_with(ScriptedTransport::new(vec![]))
}

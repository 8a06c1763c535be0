//! 端到端调度测试：从 JSON 文件加载数据集和细胞集，经调度器执行各类任务。

use serde_json::{json, Value};
use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use worker::{
    ComputeTransport, Dataset, JsonFileCatalog, ManualClock, RecordingObserver,
    RetryingComputeClient, TaskDispatcher, TaskResult, TaskState, TransportFailure,
    TransportResponse, WorkerConfig, WorkerContext,
};

const EXPERIMENT: &str = "e52b39624588791a7889e39c617f669e";

type Outcome = std::result::Result<TransportResponse, TransportFailure>;

struct Script {
    outcomes: Mutex<VecDeque<Outcome>>,
    bodies: Mutex<Vec<Value>>,
}

impl Script {
    fn new(outcomes: Vec<Outcome>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            bodies: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.bodies.lock().unwrap().len()
    }
}

impl ComputeTransport for Script {
    fn post_json(&self, _url: &str, body: &Value) -> Outcome {
        self.bodies.lock().unwrap().push(body.clone());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportFailure::Transient("connection refused".into())))
    }
}

fn write_json(value: Value) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(value.to_string().as_bytes()).unwrap();
    file
}

struct Harness {
    dispatcher: TaskDispatcher,
    observer: Arc<RecordingObserver>,
    clock: Arc<ManualClock>,
    script: Arc<Script>,
    _files: (tempfile::NamedTempFile, tempfile::NamedTempFile),
}

fn harness(outcomes: Vec<Outcome>) -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let dataset_file = write_json(json!({
        "cells": [1, 2, 3, 4, 5],
        "genes": ["Cd19", "Cd3", "Cd8", "Abc1"],
        "expression": [
            [0.0, 1.0, 0.0, 2.0],
            [0.0, 2.0, 1.0, 2.0],
            [1.0, 0.0, 3.0, 2.0],
            [4.0, 0.0, 0.0, 2.0],
            [2.0, 1.0, 0.0, 2.0]
        ],
        "geneTable": {
            "columns": ["gene_names", "gene_ids"],
            "rows": [["Cd19", "G1"], ["Cd3", "G2"], ["Cd8", "G3"], ["Abc1", "G4"]]
        }
    }));
    let cell_sets_file = write_json(json!({
        "experimentId": EXPERIMENT,
        "cellSets": [
            {"key": "louvain", "name": "Louvain", "cellIds": [], "childSets": [
                {"key": "A", "name": "A", "cellIds": [1, 2],
                 "childSets": [{"key": "A1", "name": "A1", "cellIds": [3], "childSets": []}]},
                {"key": "B", "name": "B", "cellIds": [4, 5], "childSets": []}
            ]}
        ]
    }));

    let dataset = Dataset::from_json_file(dataset_file.path()).unwrap();
    let catalog = JsonFileCatalog::new(cell_sets_file.path());
    let config = WorkerConfig::default();
    let script = Script::new(outcomes);
    let clock = Arc::new(ManualClock::new());
    let compute = RetryingComputeClient::new(
        config.compute_service_url.clone(),
        config.retry.clone(),
        script.clone(),
        clock.clone(),
    );
    let ctx = WorkerContext::new(config, Arc::new(dataset), Arc::new(catalog), Arc::new(compute));
    let observer = Arc::new(RecordingObserver::new());
    Harness {
        dispatcher: TaskDispatcher::new(ctx, observer.clone()),
        observer,
        clock,
        script,
        _files: (dataset_file, cell_sets_file),
    }
}

fn dispatch(h: &Harness, body: Value) -> TaskResult {
    h.dispatcher
        .dispatch_value(json!({"experimentId": EXPERIMENT, "body": body}))
        .unwrap()
}

fn timeout() -> Outcome {
    Err(TransportFailure::Transient("operation timed out".into()))
}

#[test]
fn test_gene_expression_for_hierarchical_set() {
    let h = harness(vec![]);
    let result = dispatch(
        &h,
        json!({"name": "GeneExpression", "genes": ["Cd8"], "cellSets": ["A"]}),
    );
    let data = result.data.expect("data");
    assert_eq!(data["cells"], json!([1, 2, 3]));
    assert_eq!(data["data"][0]["expression"], json!([0.0, 1.0, 3.0]));
    assert_eq!(data["maxExpression"], 3.0);
    assert_eq!(h.script.calls(), 0);
}

#[test]
fn test_list_genes_first_page() {
    let h = harness(vec![]);
    let result = dispatch(
        &h,
        json!({"name": "ListGenes", "selectFields": ["gene_names"], "geneNamesFilter": "Cd%",
               "orderBy": "gene_names", "orderDirection": "asc", "offset": 0, "limit": 2}),
    );
    assert_eq!(
        result.data.unwrap(),
        json!({"total": 3, "rows": [{"gene_names": "Cd19"}, {"gene_names": "Cd3"}]})
    );
}

#[test]
fn test_marker_heatmap_recovers_after_timeouts() {
    let response = json!({
        "rawExpression": {"Cd8": [0, 1, 3], "Cd19": [null, null, null]},
        "truncatedExpression": {"Cd8": [0, 1, 2], "Cd19": [null, null, null]}
    })
    .to_string();
    let h = harness(vec![
        timeout(),
        timeout(),
        Ok(TransportResponse {
            status: 200,
            body: response,
        }),
    ]);
    let result = dispatch(&h, json!({"name": "MarkerHeatmap", "nGenes": 2, "cellSetKey": "A"}));
    let data = result.data.expect("data");
    assert_eq!(data["order"], json!(["Cd8", "Cd19"]));
    assert_eq!(data["data"]["Cd8"]["truncatedExpression"]["max"], 2.0);
    assert!(data["data"]["Cd19"]["rawExpression"]["stdev"].is_null());
    assert_eq!(h.script.calls(), 3);
    assert_eq!(
        h.clock.sleeps(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
}

#[test]
fn test_marker_heatmap_budget_exhaustion_is_task_error() {
    let h = harness(vec![]);
    let result = dispatch(&h, json!({"name": "MarkerHeatmap", "nGenes": 2, "cellSetKey": "B"}));
    assert!(result.data.is_none());
    assert!(result.error.unwrap().contains("传输错误"));
    let waited: Duration = h.clock.sleeps().iter().sum();
    assert_eq!(waited, Duration::from_secs(30));
    let calls = h.script.calls();
    assert_eq!(calls, h.clock.sleeps().len() + 1);
    assert!(matches!(h.observer.states().last(), Some(TaskState::Failed(_))));
}

#[test]
fn test_marker_heatmap_server_error_is_not_retried() {
    let h = harness(vec![Ok(TransportResponse {
        status: 503,
        body: "overloaded".into(),
    })]);
    let result = dispatch(&h, json!({"name": "MarkerHeatmap", "nGenes": 2, "cellSetKey": "B"}));
    let error = result.error.unwrap();
    assert!(error.contains("503"));
    assert!(error.contains("overloaded"));
    assert_eq!(h.script.calls(), 1);
}

#[test]
fn test_embedding_then_unknown_type() {
    let h = harness(vec![]);
    let first = dispatch(&h, json!({"name": "GetEmbedding", "type": "pca"}));
    assert_eq!(first.data.unwrap()["cells"], json!([1, 2, 3, 4, 5]));
    let bad = dispatch(&h, json!({"name": "GetEmbedding", "type": "definitelynotavalidembedding"}));
    assert!(bad.error.is_some());
}

#[test]
fn test_unknown_cell_set_for_another_experiment() {
    let h = harness(vec![]);
    let result = h
        .dispatcher
        .dispatch_value(json!({
            "experimentId": "someone-else",
            "body": {"name": "GeneExpression", "genes": ["Cd3"], "cellSets": ["A"]}
        }))
        .unwrap();
    assert!(result.error.unwrap().contains("someone-else"));
}

#[test]
fn test_missing_cell_sets_file_propagates() {
    let h = harness(vec![]);
    let ctx = h.dispatcher.context().clone();
    let broken = WorkerContext::new(
        ctx.config.clone(),
        ctx.dataset.clone(),
        Arc::new(JsonFileCatalog::new("/nonexistent/cell_sets.json")),
        ctx.compute.clone(),
    );
    let dispatcher = TaskDispatcher::with_tracing(broken);
    let outcome = dispatcher.dispatch_value(json!({
        "experimentId": EXPERIMENT,
        "body": {"name": "GeneExpression", "genes": ["Cd3"], "cellSets": ["A"]}
    }));
    assert!(matches!(outcome, Err(worker::Error::Io(_))));
}

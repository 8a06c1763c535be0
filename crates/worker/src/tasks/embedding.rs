// embedding.rs
// 嵌入任务：重新计算降维嵌入并无条件覆盖数据集上已有的结果。
use crate::context::WorkerContext;
use crate::embedding::{compute_pca, EmbeddingKind};
use crate::error::Result;
use crate::task::{EmbeddingParams, Task};
use serde_json::{json, Value};
use tracing::info;

pub struct EmbeddingTask {
    pub experiment_id: String,
    pub params: EmbeddingParams,
}

impl EmbeddingTask {
    pub fn new(experiment_id: impl Into<String>, params: EmbeddingParams) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            params,
        }
    }
}

impl Task for EmbeddingTask {
    type Inputs = EmbeddingKind;

    fn name(&self) -> &'static str {
        "GetEmbedding"
    }

    fn resolve_inputs(&self, _ctx: &WorkerContext) -> Result<EmbeddingKind> {
        self.params.kind.parse()
    }

    fn compute(&self, ctx: &WorkerContext, kind: EmbeddingKind) -> Result<Value> {
        let embedding = match kind {
            EmbeddingKind::Pca => {
                compute_pca(ctx.dataset.expression(), ctx.config.embedding_components)?
            }
        };
        let coordinates = embedding.coordinates.clone();
        let replaced = ctx.dataset.store_embedding(embedding)?;
        info!(
            experiment_id = %self.experiment_id,
            %kind,
            replaced = replaced.is_some(),
            "嵌入已写入数据集"
        );
        Ok(json!({
            "cells": ctx.dataset.cell_ids(),
            "embedding": coordinates,
        }))
    }
}

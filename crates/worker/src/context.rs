// context.rs
// 任务执行上下文：启动时根据配置组装一次，之后在各任务之间只读共享。
use crate::cell_sets::{CellSetCatalog, CellSetResolver};
use crate::compute_client::RetryingComputeClient;
use crate::config::WorkerConfig;
use crate::dataset::Dataset;
use crate::error::Result;
use std::sync::Arc;

/// 任务执行所需的全部协作者
#[derive(Clone)]
pub struct WorkerContext {
    pub config: WorkerConfig,
    pub dataset: Arc<Dataset>,
    pub resolver: CellSetResolver,
    pub compute: Arc<RetryingComputeClient>,
}

impl WorkerContext {
    pub fn new(
        config: WorkerConfig,
        dataset: Arc<Dataset>,
        catalog: Arc<dyn CellSetCatalog>,
        compute: Arc<RetryingComputeClient>,
    ) -> Self {
        Self {
            config,
            dataset,
            resolver: CellSetResolver::new(catalog),
            compute,
        }
    }

    /// 使用真实HTTP传输创建上下文
    pub fn from_config(
        config: WorkerConfig,
        dataset: Arc<Dataset>,
        catalog: Arc<dyn CellSetCatalog>,
    ) -> Result<Self> {
        let compute = Arc::new(RetryingComputeClient::from_config(&config)?);
        Ok(Self::new(config, dataset, catalog, compute))
    }
}

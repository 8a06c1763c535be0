// lib.rs
// 表达量工作进程库入口，声明并导出各子模块。
pub mod cell_sets;      // 细胞集目录与解析
pub mod compute_client; // 外部计算服务客户端
pub mod config;         // 配置模块
pub mod context;        // 任务执行上下文
pub mod dataset;        // 数据集
pub mod dispatcher;     // 任务调度器
pub mod embedding;      // 降维嵌入
pub mod error;          // 错误类型模块
pub mod gene_table;     // 基因元数据表查询
pub mod observer;       // 任务观察者
pub mod result;         // 结果格式化
pub mod statistics;     // 表达量统计
pub mod task;           // 任务请求与状态
pub mod tasks;          // 各任务实现
pub mod types;          // 通用类型

#[cfg(test)]
mod test_support;

pub use cell_sets::{CellSet, CellSetCatalog, CellSetResolver, InMemoryCatalog, JsonFileCatalog};
pub use compute_client::{
    Clock, ComputeTransport, HttpTransport, ManualClock, RetryingComputeClient, SystemClock,
    TransportFailure, TransportResponse,
};
pub use config::{RetryPolicy, WorkerConfig};
pub use context::WorkerContext;
pub use dataset::Dataset;
pub use dispatcher::TaskDispatcher;
pub use error::{Error, Result};
pub use observer::{RecordingObserver, TaskObserver, TracingObserver};
pub use result::{ResultFormatter, TaskResult};
pub use task::{TaskBody, TaskRequest, TaskState};

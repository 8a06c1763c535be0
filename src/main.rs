// main.rs
// 命令行入口：加载数据集和细胞集目录，执行一个任务请求并把结果 JSON 写到标准输出。
use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use worker::{Dataset, JsonFileCatalog, TaskDispatcher, WorkerConfig, WorkerContext};

#[derive(Debug, Parser)]
#[command(name = "expression-worker", version, about = "单细胞表达量任务工作进程")]
struct Args {
    /// 数据集 JSON 文件：{"cells", "genes", "expression", "geneTable"?}
    #[arg(long, env = "WORKER_DATASET")]
    dataset: PathBuf,

    /// 细胞集目录 JSON 文件：{"experimentId"?, "cellSets": [...]}
    #[arg(long, env = "WORKER_CELL_SETS")]
    cell_sets: PathBuf,

    /// 任务请求 JSON 文件，"-" 表示从标准输入读取
    #[arg(long)]
    request: PathBuf,

    /// 配置文件；环境变量会覆盖其中的值
    #[arg(long)]
    config: Option<PathBuf>,
}

fn read_request(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut buffer = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut buffer)
            .context("读取标准输入失败")?;
        Ok(buffer)
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("读取请求文件 {} 失败", path.display()))
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => WorkerConfig::from_file(path)?,
        None => WorkerConfig::default(),
    }
    .with_overrides(|key| std::env::var(key).ok())?;

    let dataset = Dataset::from_json_file(&args.dataset)
        .with_context(|| format!("加载数据集 {} 失败", args.dataset.display()))?;
    info!(
        cells = dataset.cell_ids().len(),
        genes = dataset.gene_names().len(),
        "数据集已加载"
    );

    let catalog = JsonFileCatalog::new(&args.cell_sets);
    let ctx = WorkerContext::from_config(config, Arc::new(dataset), Arc::new(catalog))?;
    let dispatcher = TaskDispatcher::with_tracing(ctx);

    let request = read_request(&args.request)?;
    let result = dispatcher.dispatch_json(&request)?;
    println!("{}", result.to_json()?);
    Ok(())
}

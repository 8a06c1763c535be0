// tasks/mod.rs
// 各任务类型的实现。
pub mod embedding;
pub mod gene_expression;
pub mod list_genes;
pub mod marker_heatmap;

pub use embedding::EmbeddingTask;
pub use gene_expression::GeneExpressionTask;
pub use list_genes::ListGenesTask;
pub use marker_heatmap::MarkerHeatmapTask;

// types.rs
// 定义通用类型，如细胞ID、表达向量、细胞选择等辅助类型和常量。
use serde::{Deserialize, Serialize};

/// 细胞标识，在一个实验的全部细胞中唯一
pub type CellId = u64;

/// 单个基因在各细胞上的表达值，`None` 表示缺失
pub type ExpressionVector = Vec<Option<f64>>;

// 常量定义，避免硬编码
pub const ALL_CELLS: &str = "all";
pub const GENE_NAMES_COLUMN: &str = "gene_names";
pub const MARKER_HEATMAP_ROUTE: &str = "v0/runMarkerHeatmap";

/// 细胞选择：全部细胞，或若干细胞集的并集
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellSelection {
    /// 请求中的字符串，只接受 "all"
    Keyword(String),
    /// 细胞集 key 列表
    Sets(Vec<String>),
}

impl Default for CellSelection {
    fn default() -> Self {
        CellSelection::Sets(Vec::new())
    }
}

impl CellSelection {
    pub fn is_all(&self) -> bool {
        matches!(self, CellSelection::Keyword(k) if k == ALL_CELLS)
    }
}

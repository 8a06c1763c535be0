// embedding.rs
// 降维嵌入：目前支持基于SVD的PCA，把细胞投影到前几个主成分上。
use crate::error::{Error, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 嵌入类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingKind {
    Pca,
}

impl fmt::Display for EmbeddingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingKind::Pca => write!(f, "pca"),
        }
    }
}

impl FromStr for EmbeddingKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pca" => Ok(EmbeddingKind::Pca),
            "umap" | "tsne" => Err(Error::validation(format!(
                "嵌入类型 {} 暂不支持，目前只支持 pca",
                s
            ))),
            _ => Err(Error::validation(format!("未知的嵌入类型 \"{}\"", s))),
        }
    }
}

/// 嵌入结果，每个细胞一行坐标，顺序与数据集的细胞顺序一致
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub kind: EmbeddingKind,
    pub coordinates: Vec<Vec<f64>>,
}

/// 计算 PCA 嵌入
///
/// 先按列中心化，再做 SVD，细胞坐标为 `U * Σ` 的前 `components` 列。
/// 每个主成分的符号固定为载荷绝对值最大的基因取正。
pub fn compute_pca(matrix: &DMatrix<f64>, components: usize) -> Result<Embedding> {
    let (n_cells, n_genes) = matrix.shape();
    if n_cells == 0 || n_genes == 0 {
        return Err(Error::validation("数据集为空，无法计算 PCA"));
    }
    if components == 0 {
        return Err(Error::validation("PCA 维度必须大于0"));
    }
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(Error::validation("表达矩阵包含 NaN 或无穷值，无法计算 PCA"));
    }

    let mut centered = matrix.clone();
    for mut column in centered.column_iter_mut() {
        let mean = column.mean();
        column.add_scalar_mut(-mean);
    }

    let svd = centered.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return Err(Error::Other(anyhow::anyhow!("SVD 未返回奇异向量"))),
    };

    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|a, b| {
        svd.singular_values[*b]
            .partial_cmp(&svd.singular_values[*a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order.truncate(components);

    let mut coordinates = vec![Vec::with_capacity(order.len()); n_cells];
    for &j in &order {
        let loadings = v_t.row(j);
        let sign = match loadings.iter().max_by(|a, b| {
            a.abs()
                .partial_cmp(&b.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        }) {
            Some(v) if *v < 0.0 => -1.0,
            _ => 1.0,
        };
        let scale = svd.singular_values[j] * sign;
        for (i, row) in coordinates.iter_mut().enumerate() {
            row.push(u[(i, j)] * scale);
        }
    }

    Ok(Embedding {
        kind: EmbeddingKind::Pca,
        coordinates,
    })
}

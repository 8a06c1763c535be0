// dataset.rs
// 实验数据集的内存表示：细胞顺序、基因顺序、原始表达矩阵、基因元数据表和嵌入结果槽位。
use crate::embedding::{Embedding, EmbeddingKind};
use crate::error::{Error, Result};
use crate::gene_table::GeneTable;
use crate::types::CellId;
use nalgebra::DMatrix;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

/// 数据集，除嵌入槽位外只读
///
/// 嵌入槽位由读写锁保护：同一数据集上的并发写入互斥，最后写入者生效。
#[derive(Debug)]
pub struct Dataset {
    cell_ids: Vec<CellId>,
    cell_index: HashMap<CellId, usize>,
    gene_names: Vec<String>,
    gene_index: HashMap<String, usize>,
    /// 行为细胞，列为基因
    expression: DMatrix<f64>,
    gene_table: GeneTable,
    embeddings: RwLock<HashMap<EmbeddingKind, Embedding>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetDocument {
    cells: Vec<CellId>,
    genes: Vec<String>,
    expression: Vec<Vec<f64>>,
    #[serde(default)]
    gene_table: Option<GeneTable>,
}

impl Dataset {
    /// 由按细胞排列的表达矩阵创建数据集
    pub fn new(cell_ids: Vec<CellId>, gene_names: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        if rows.len() != cell_ids.len() {
            return Err(Error::validation(format!(
                "表达矩阵有 {} 行，但有 {} 个细胞",
                rows.len(),
                cell_ids.len()
            )));
        }
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != gene_names.len()) {
            return Err(Error::validation(format!(
                "细胞 {} 有 {} 个表达值，但有 {} 个基因",
                cell_ids[i],
                row.len(),
                gene_names.len()
            )));
        }

        let mut cell_index = HashMap::with_capacity(cell_ids.len());
        for (i, cell) in cell_ids.iter().enumerate() {
            if cell_index.insert(*cell, i).is_some() {
                return Err(Error::validation(format!("细胞ID {} 重复", cell)));
            }
        }
        let mut gene_index = HashMap::with_capacity(gene_names.len());
        for (i, gene) in gene_names.iter().enumerate() {
            if gene_index.insert(gene.clone(), i).is_some() {
                return Err(Error::validation(format!("基因 {} 重复", gene)));
            }
        }

        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let expression = DMatrix::from_row_slice(cell_ids.len(), gene_names.len(), &flat);
        let gene_table = GeneTable::from_gene_names(gene_names.iter().cloned());
        Ok(Self {
            cell_ids,
            cell_index,
            gene_names,
            gene_index,
            expression,
            gene_table,
            embeddings: RwLock::new(HashMap::new()),
        })
    }

    /// 替换基因元数据表
    pub fn with_gene_table(mut self, gene_table: GeneTable) -> Self {
        self.gene_table = gene_table;
        self
    }

    /// 从 JSON 文件读取：`{"cells", "genes", "expression", "geneTable"?}`
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let document: DatasetDocument = serde_json::from_str(&contents)?;
        let dataset = Self::new(document.cells, document.genes, document.expression)?;
        Ok(match document.gene_table {
            Some(table) => dataset.with_gene_table(table),
            None => dataset,
        })
    }

    pub fn cell_ids(&self) -> &[CellId] {
        &self.cell_ids
    }

    pub fn cell_position(&self, cell: CellId) -> Option<usize> {
        self.cell_index.get(&cell).copied()
    }

    pub fn gene_names(&self) -> &[String] {
        &self.gene_names
    }

    pub fn gene_position(&self, gene: &str) -> Option<usize> {
        self.gene_index.get(gene).copied()
    }

    pub fn expression(&self) -> &DMatrix<f64> {
        &self.expression
    }

    pub fn gene_table(&self) -> &GeneTable {
        &self.gene_table
    }

    /// 读取嵌入结果；锁损坏时返回错误而不是当作没有结果
    pub fn embedding(&self, kind: EmbeddingKind) -> Result<Option<Embedding>> {
        let slots = self
            .embeddings
            .read()
            .map_err(|e| Error::Other(anyhow::anyhow!("嵌入槽位锁已损坏: {}", e)))?;
        Ok(slots.get(&kind).cloned())
    }

    /// 覆盖写入嵌入结果，返回被替换的旧结果
    pub fn store_embedding(&self, embedding: Embedding) -> Result<Option<Embedding>> {
        let mut slots = self
            .embeddings
            .write()
            .map_err(|e| Error::Other(anyhow::anyhow!("嵌入槽位锁已损坏: {}", e)))?;
        Ok(slots.insert(embedding.kind, embedding))
    }
}

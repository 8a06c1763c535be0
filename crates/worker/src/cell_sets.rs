// cell_sets.rs
// 细胞集目录与解析器：把（可能分层的）细胞集 key 展开为具体的细胞成员映射。
use crate::error::{Error, Result};
use crate::types::{CellId, CellSelection};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// 目录中的一个细胞集节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellSet {
    pub key: String,
    #[serde(default)]
    pub name: String,
    /// 直接成员，顺序与目录一致
    #[serde(default)]
    pub cell_ids: Vec<CellId>,
    #[serde(default)]
    pub child_sets: Vec<CellSet>,
}

impl CellSet {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            cell_ids: Vec::new(),
            child_sets: Vec::new(),
        }
    }

    pub fn with_cells(mut self, cells: impl IntoIterator<Item = CellId>) -> Self {
        self.cell_ids.extend(cells);
        self
    }

    pub fn with_child(mut self, child: CellSet) -> Self {
        self.child_sets.push(child);
        self
    }
}

/// 细胞成员映射：细胞ID -> 被分配的细胞集 key
pub type CellMembership = BTreeMap<CellId, String>;

/// 细胞集目录（外部协作者），按实验ID返回整片森林
pub trait CellSetCatalog: Send + Sync {
    fn get(&self, experiment_id: &str) -> Result<Vec<CellSet>>;
}

/// 内存中的细胞集目录
#[derive(Debug, Default, Clone)]
pub struct InMemoryCatalog {
    experiments: HashMap<String, Vec<CellSet>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, experiment_id: impl Into<String>, forest: Vec<CellSet>) {
        self.experiments.insert(experiment_id.into(), forest);
    }
}

impl CellSetCatalog for InMemoryCatalog {
    fn get(&self, experiment_id: &str) -> Result<Vec<CellSet>> {
        self.experiments
            .get(experiment_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("实验 {} 没有细胞集目录", experiment_id)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CellSetsDocument {
    #[serde(default)]
    experiment_id: Option<String>,
    cell_sets: Vec<CellSet>,
}

/// 从 JSON 文件读取的细胞集目录，文件格式为 `{"experimentId"?, "cellSets": [...]}`
#[derive(Debug, Clone)]
pub struct JsonFileCatalog {
    path: PathBuf,
}

impl JsonFileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CellSetCatalog for JsonFileCatalog {
    fn get(&self, experiment_id: &str) -> Result<Vec<CellSet>> {
        let contents = std::fs::read_to_string(&self.path)?;
        let document: CellSetsDocument = serde_json::from_str(&contents)?;
        match document.experiment_id {
            Some(id) if id != experiment_id => Err(Error::not_found(format!(
                "细胞集文件属于实验 {}，而不是 {}",
                id, experiment_id
            ))),
            _ => Ok(document.cell_sets),
        }
    }
}

/// 解析后的细胞选择
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedCells {
    /// 不做细胞集过滤，数据集中的全部细胞都被选中
    All,
    Members(CellMembership),
}

/// 细胞集解析器
#[derive(Clone)]
pub struct CellSetResolver {
    catalog: Arc<dyn CellSetCatalog>,
}

impl CellSetResolver {
    pub fn new(catalog: Arc<dyn CellSetCatalog>) -> Self {
        Self { catalog }
    }

    /// 在整片森林中（不只是根节点）查找 key 对应的节点
    pub fn find<'a>(forest: &'a [CellSet], key: &str) -> Option<&'a CellSet> {
        let mut stack: Vec<&CellSet> = forest.iter().rev().collect();
        while let Some(node) = stack.pop() {
            if node.key == key {
                return Some(node);
            }
            stack.extend(node.child_sets.iter().rev());
        }
        None
    }

    /// 把 `key` 展开为成员映射，所有可达细胞都分配到被请求的 key
    pub fn resolve(forest: &[CellSet], key: &str) -> Result<CellMembership> {
        let mut membership = CellMembership::new();
        Self::resolve_into(forest, key, &mut membership)?;
        Ok(membership)
    }

    /// 依次展开多个 key；同一细胞被多个 key 覆盖时，后写入者生效
    pub fn resolve_many<S: AsRef<str>>(forest: &[CellSet], keys: &[S]) -> Result<CellMembership> {
        let mut membership = CellMembership::new();
        for key in keys {
            Self::resolve_into(forest, key.as_ref(), &mut membership)?;
        }
        Ok(membership)
    }

    fn resolve_into(forest: &[CellSet], key: &str, membership: &mut CellMembership) -> Result<()> {
        let root = Self::find(forest, key)
            .ok_or_else(|| Error::not_found(format!("细胞集 {} 不存在", key)))?;
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            for cell in &node.cell_ids {
                membership.insert(*cell, key.to_string());
            }
            stack.extend(node.child_sets.iter());
        }
        Ok(())
    }

    /// 按请求中的选择解析细胞；"all" 不会访问目录
    pub fn resolve_selection(
        &self,
        experiment_id: &str,
        selection: &CellSelection,
    ) -> Result<ResolvedCells> {
        match selection {
            CellSelection::Keyword(_) if selection.is_all() => Ok(ResolvedCells::All),
            CellSelection::Keyword(other) => Err(Error::validation(format!(
                "cellSets 只能是细胞集列表或 \"all\"，收到 \"{}\"",
                other
            ))),
            CellSelection::Sets(keys) => {
                let forest = self.catalog.get(experiment_id)?;
                let membership = Self::resolve_many(&forest, keys)?;
                debug!(sets = keys.len(), cells = membership.len(), "解析细胞集完成");
                Ok(ResolvedCells::Members(membership))
            }
        }
    }

    /// 查找单个细胞集节点并返回其完整子树和成员映射
    pub fn locate(&self, experiment_id: &str, key: &str) -> Result<(CellSet, CellMembership)> {
        let forest = self.catalog.get(experiment_id)?;
        let membership = Self::resolve(&forest, key)?;
        let node = Self::find(&forest, key)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("细胞集 {} 不存在", key)))?;
        Ok((node, membership))
    }
}

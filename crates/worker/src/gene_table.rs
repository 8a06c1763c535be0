// gene_table.rs
// 基因元数据表及其查询引擎：在内存行上做参数化的过滤、排序和分页，不拼接任何查询字符串。
use crate::error::{Error, Result};
use crate::types::GENE_NAMES_COLUMN;
use prettytable::{Cell, Row, Table};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::str::FromStr;

/// 排序方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl FromStr for OrderDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(OrderDirection::Asc),
            "desc" => Ok(OrderDirection::Desc),
            other => Err(Error::validation(format!(
                "排序方向必须是 asc 或 desc，收到 \"{}\"",
                other
            ))),
        }
    }
}

/// 一次查询的全部参数
#[derive(Debug, Clone)]
pub struct GeneQuery {
    pub select: Vec<String>,
    /// SQL LIKE 风格的模式，作用于基因名列
    pub filter: Option<String>,
    pub order_by: String,
    pub direction: OrderDirection,
    pub offset: usize,
    pub limit: usize,
}

/// 一页查询结果；`total` 是过滤后、分页前的行数
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPage {
    pub total: usize,
    pub rows: Vec<Map<String, Value>>,
}

impl QueryPage {
    /// 渲染为文本表格，列顺序与 `columns` 一致
    pub fn to_table(&self, columns: &[String]) -> Table {
        let mut table = Table::new();
        table.set_titles(Row::new(columns.iter().map(|c| Cell::new(c)).collect()));
        for record in &self.rows {
            let cells = columns
                .iter()
                .map(|column| match record.get(column) {
                    Some(Value::String(s)) => Cell::new(s),
                    Some(Value::Null) | None => Cell::new(""),
                    Some(other) => Cell::new(&other.to_string()),
                })
                .collect();
            table.add_row(Row::new(cells));
        }
        table
    }
}

/// 基因元数据表，只读
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GeneTableDocument")]
pub struct GeneTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct GeneTableDocument {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl TryFrom<GeneTableDocument> for GeneTable {
    type Error = Error;

    fn try_from(document: GeneTableDocument) -> Result<Self> {
        GeneTable::new(document.columns, document.rows)
    }
}

impl GeneTable {
    /// 创建表，每一行的宽度必须与列数一致
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(Error::validation(format!(
                    "第 {} 行有 {} 个值，但表有 {} 列",
                    i,
                    row.len(),
                    columns.len()
                )));
            }
        }
        Ok(Self { columns, rows })
    }

    /// 只有基因名一列的表
    pub fn from_gene_names<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: vec![GENE_NAMES_COLUMN.to_string()],
            rows: names
                .into_iter()
                .map(|n| vec![Value::String(n.into())])
                .collect(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| Error::validation(format!("未知列 \"{}\"", name)))
    }

    /// 过滤、排序、分页
    pub fn query(&self, query: &GeneQuery) -> Result<QueryPage> {
        // 同名列在结果行中只能出现一次
        if let Some((i, name)) = query
            .select
            .iter()
            .enumerate()
            .find(|(i, name)| query.select[..*i].contains(*name))
        {
            return Err(Error::validation(format!(
                "selectFields 第 {} 项 \"{}\" 重复",
                i, name
            )));
        }

        // 列名只通过白名单映射为下标
        let selected: Vec<(usize, &str)> = query
            .select
            .iter()
            .map(|name| Ok((self.column_index(name)?, name.as_str())))
            .collect::<Result<_>>()?;
        let order_index = self.column_index(&query.order_by)?;

        let mut matching: Vec<&Vec<Value>> = match &query.filter {
            Some(pattern) => {
                let filter_index = self.column_index(GENE_NAMES_COLUMN)?;
                let matcher = like_to_regex(pattern)?;
                self.rows
                    .iter()
                    .filter(|row| match &row[filter_index] {
                        Value::String(s) => matcher.is_match(s),
                        _ => false,
                    })
                    .collect()
            }
            None => self.rows.iter().collect(),
        };

        // 稳定排序，相等元素保持输入顺序
        match query.direction {
            OrderDirection::Asc => {
                matching.sort_by(|a, b| compare_values(&a[order_index], &b[order_index]))
            }
            OrderDirection::Desc => {
                matching.sort_by(|a, b| compare_values(&b[order_index], &a[order_index]))
            }
        }

        let total = matching.len();
        let rows = matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .map(|row| {
                selected
                    .iter()
                    .map(|(index, name)| (name.to_string(), row[*index].clone()))
                    .collect::<Map<String, Value>>()
            })
            .collect();
        Ok(QueryPage { total, rows })
    }
}

/// 把 LIKE 模式翻译为锚定的正则：`%` 匹配任意长度，`_` 匹配单个字符，其余字符按字面匹配
pub fn like_to_regex(pattern: &str) -> Result<Regex> {
    let mut expression = String::with_capacity(pattern.len() + 8);
    expression.push_str("(?s)^");
    let mut literal = [0u8; 4];
    for ch in pattern.chars() {
        match ch {
            '%' => expression.push_str(".*"),
            '_' => expression.push('.'),
            other => expression.push_str(&regex::escape(other.encode_utf8(&mut literal))),
        }
    }
    expression.push('$');
    Regex::new(&expression).map_err(|e| Error::validation(format!("无效的过滤模式 \"{}\": {}", pattern, e)))
}

/// 混合类型的全序：null < 数字/布尔 < 字符串 < 其他
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) | Value::Number(_) => 1,
            Value::String(_) => 2,
            Value::Array(_) | Value::Object(_) => 3,
        }
    }
    fn as_number(v: &Value) -> f64 {
        match v {
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
            _ => f64::NAN,
        }
    }
    match rank(a).cmp(&rank(b)) {
        Ordering::Equal => match (a, b) {
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (x, y) if rank(x) == 1 => as_number(x)
                .partial_cmp(&as_number(y))
                .unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
        other => other,
    }
}

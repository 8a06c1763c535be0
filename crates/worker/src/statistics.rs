// statistics.rs
// 表达量统计引擎：按基因计算忽略缺失值的均值、标准差、最小值和最大值。
use crate::error::{Error, Result};
use crate::types::ExpressionVector;
use serde::Serialize;
use std::collections::HashMap;

/// 原始表达量的统计结果，全部缺失时为 NaN
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RawStatistics {
    pub mean: f64,
    pub stdev: f64,
}

/// 截断表达量的统计结果，全部缺失时为 NaN
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TruncatedStatistics {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawSummary {
    #[serde(flatten)]
    pub stats: RawStatistics,
    pub expression: ExpressionVector,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TruncatedSummary {
    #[serde(flatten)]
    pub stats: TruncatedStatistics,
    pub expression: ExpressionVector,
}

/// 单个基因的统计结果，原始向量原样保留
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneSummary {
    pub raw_expression: RawSummary,
    pub truncated_expression: TruncatedSummary,
}

/// 多个基因的统计结果，`order` 显式记录输入基因的顺序
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MarkerSummaries {
    pub data: HashMap<String, GeneSummary>,
    pub order: Vec<String>,
}

/// 表达量统计引擎
pub struct ExpressionStatisticsEngine;

impl ExpressionStatisticsEngine {
    /// 原始向量：均值与总体（有偏）标准差
    pub fn summarize_raw(values: &[Option<f64>]) -> RawStatistics {
        let present: Vec<f64> = present_values(values).collect();
        if present.is_empty() {
            return RawStatistics {
                mean: f64::NAN,
                stdev: f64::NAN,
            };
        }
        let n = present.len() as f64;
        let mean = present.iter().sum::<f64>() / n;
        let variance = present.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        RawStatistics {
            mean,
            stdev: variance.sqrt(),
        }
    }

    /// 截断向量：最小值与最大值
    pub fn summarize_truncated(values: &[Option<f64>]) -> TruncatedStatistics {
        match Self::min_max(present_values(values)) {
            Some((min, max)) => TruncatedStatistics { min, max },
            None => TruncatedStatistics {
                min: f64::NAN,
                max: f64::NAN,
            },
        }
    }

    /// 非缺失值的最小值与最大值；没有值时返回 None
    pub fn min_max(values: impl IntoIterator<Item = f64>) -> Option<(f64, f64)> {
        values
            .into_iter()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// 对计算服务返回的原始/截断表达量逐基因汇总，保持原始基因顺序
    pub fn summarize_markers(
        raw: Vec<(String, ExpressionVector)>,
        mut truncated: HashMap<String, ExpressionVector>,
    ) -> Result<MarkerSummaries> {
        let mut summaries = MarkerSummaries::default();
        for (gene, raw_values) in raw {
            let truncated_values = truncated.remove(&gene).ok_or_else(|| {
                Error::domain(format!("基因 {} 缺少截断表达量", gene))
            })?;
            let summary = GeneSummary {
                raw_expression: RawSummary {
                    stats: Self::summarize_raw(&raw_values),
                    expression: raw_values,
                },
                truncated_expression: TruncatedSummary {
                    stats: Self::summarize_truncated(&truncated_values),
                    expression: truncated_values,
                },
            };
            summaries.order.push(gene.clone());
            summaries.data.insert(gene, summary);
        }
        Ok(summaries)
    }
}

fn present_values(values: &[Option<f64>]) -> impl Iterator<Item = f64> + '_ {
    values.iter().flatten().copied().filter(|v| !v.is_nan())
}

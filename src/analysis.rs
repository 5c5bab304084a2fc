use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::{json, Value};

use crate::charts::ChartSpec;
use crate::config::EngineConfig;
use crate::dataset::{format_number, parse_date_days, Column, ColumnKind, Dataset};
use crate::error::EngineError;
use crate::intent::{Classification, Intent, Strategy};
use crate::profile::{self, ColumnRole, DatasetProfile, ValueCount};
use crate::stats::{self, NumericSummary, OutlierSummary};

pub const PERCENTILES: [u8; 9] = [1, 5, 10, 25, 50, 75, 90, 95, 99];

/// Everything a routine may look at. Routines never touch engine state.
pub struct AnalysisContext<'a> {
    pub dataset: &'a Dataset,
    pub profile: &'a DatasetProfile,
    pub resolved: &'a [String],
    pub question: &'a str,
    pub classification: Classification,
    pub config: &'a EngineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub analysis_type: Intent,
    pub parameters: BTreeMap<String, Value>,
    pub statistics: Statistics,
    pub chart_spec: Option<ChartSpec>,
    pub insight_text: String,
    pub narrative: Vec<String>,
    pub related_suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnAverage {
    pub column: String,
    pub mean: f64,
    pub median: f64,
    pub sum: f64,
    pub count: usize,
    pub std: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationPair {
    pub var1: String,
    pub var2: String,
    pub correlation: f64,
    pub strength: &'static str,
    pub direction: &'static str,
    pub strong: bool,
}

impl CorrelationPair {
    fn from_pair(p: &profile::CorrelatedPair) -> Self {
        Self {
            var1: p.var1.clone(),
            var2: p.var2.clone(),
            correlation: p.correlation,
            strength: stats::correlation_strength(p.correlation),
            direction: if p.correlation > 0.0 { "positive" } else { "negative" },
            strong: p.correlation.abs() >= stats::STRONG_CORRELATION,
        }
    }

    pub fn interpretation(&self) -> String {
        format!("{} {} relationship between {} and {}", self.strength, self.direction, self.var1, self.var2)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Percentile {
    pub p: u8,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionStats {
    pub column: String,
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std: Option<f64>,
    pub min: f64,
    pub max: f64,
    pub skewness: Option<f64>,
    pub kurtosis: Option<f64>,
    pub percentiles: Vec<Percentile>,
    pub shape: &'static str,
    pub outliers: Option<OutlierSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericDescribe {
    pub column: String,
    pub count: usize,
    pub mean: f64,
    pub std: Option<f64>,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoricalDescribe {
    pub column: String,
    pub count: usize,
    pub unique: usize,
    pub top: Option<String>,
    pub freq: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemporalDescribe {
    pub column: String,
    pub count: usize,
    pub unique: usize,
    pub first: Option<String>,
    pub last: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMean {
    pub group: String,
    pub mean: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonEntry {
    pub label: String,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedValue {
    pub row: usize,
    pub value: f64,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnOutliers {
    pub column: String,
    #[serde(flatten)]
    pub summary: OutlierSummary,
}

/// Raw numbers behind a result, one shape per routine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Statistics {
    Averages {
        columns: Vec<ColumnAverage>,
    },
    Correlation {
        columns: Vec<String>,
        /// None where r is undefined
        matrix: Vec<Vec<Option<f64>>>,
        /// every defined pair, strongest first
        pairs: Vec<CorrelationPair>,
        strong_correlations: Vec<CorrelationPair>,
        highest_positive: Option<CorrelationPair>,
        highest_negative: Option<CorrelationPair>,
    },
    Trend {
        column: String,
        x_axis: String,
        slope: f64,
        intercept: f64,
        r_squared: Option<f64>,
        direction: &'static str,
        points: usize,
        first_value: f64,
        last_value: f64,
    },
    Distribution {
        columns: Vec<DistributionStats>,
    },
    Summary {
        rows: usize,
        columns: usize,
        completeness_score: f64,
        duplicate_rows: usize,
        numeric: Vec<NumericDescribe>,
        categorical: Vec<CategoricalDescribe>,
        temporal: Vec<TemporalDescribe>,
    },
    Comparison {
        target: String,
        group_by: Option<String>,
        /// highest mean first
        entries: Vec<ComparisonEntry>,
    },
    Extremes {
        column: String,
        label_column: Option<String>,
        values: Vec<RankedValue>,
    },
    Breakdown {
        column: String,
        counts: Vec<ValueCount>,
        distinct: usize,
        non_missing: usize,
        dominant: Option<ValueCount>,
        dominant_share: f64,
        diversity: f64,
        metric: Option<String>,
        metric_means: Vec<GroupMean>,
    },
    Anomalies {
        columns: Vec<ColumnOutliers>,
        /// columns with too few values to judge
        skipped: Vec<String>,
        total_outliers: usize,
    },
}

/// Runs the routine picked by the classification
pub fn run_analysis(ctx: &AnalysisContext) -> Result<AnalysisResult, EngineError> {
    if ctx.dataset.row_count() == 0 {
        return Err(EngineError::insufficient_data(ctx.classification.intent.as_str(), None, 1, 0));
    }
    match ctx.classification.intent.dispatch_target() {
        Intent::Averages => averages(ctx),
        Intent::Correlation => correlation(ctx),
        Intent::Trend => trend(ctx),
        Intent::Distribution => distribution(ctx),
        Intent::Comparison => comparison(ctx),
        Intent::TopValues => extremes(ctx, true),
        Intent::BottomValues => extremes(ctx, false),
        Intent::CategoricalBreakdown => categorical_breakdown(ctx),
        Intent::AnomalyDetection => anomaly_detection(ctx),
        Intent::Summary | Intent::General => summary(ctx),
    }
}

fn base_parameters(ctx: &AnalysisContext) -> BTreeMap<String, Value> {
    let mut p = BTreeMap::new();
    p.insert("resolved_columns".to_string(), json!(ctx.resolved));
    p.insert("strategy".to_string(), json!(ctx.classification.strategy));
    p.insert("rule".to_string(), json!(ctx.classification.rule));
    p
}

fn finish(
    intent: Intent,
    parameters: BTreeMap<String, Value>,
    statistics: Statistics,
    chart_spec: Option<ChartSpec>,
    insight_text: String,
) -> AnalysisResult {
    AnalysisResult {
        analysis_type: intent,
        parameters,
        statistics,
        chart_spec,
        insight_text,
        narrative: Vec::new(),
        related_suggestions: Vec::new(),
    }
}

fn resolved_of<'a>(ctx: &AnalysisContext<'a>, kind: ColumnKind) -> Vec<&'a Column> {
    ctx.resolved
        .iter()
        .filter_map(|r| ctx.dataset.column(r))
        .filter(|c| c.kind == kind)
        .collect()
}

/// resolved columns of the kind, else the first `fallback` columns of that kind
fn targets<'a>(ctx: &AnalysisContext<'a>, kind: ColumnKind, fallback: usize) -> Vec<&'a Column> {
    let resolved = resolved_of(ctx, kind);
    if !resolved.is_empty() {
        return resolved;
    }
    ctx.dataset.columns_of(kind).into_iter().take(fallback).collect()
}

fn require_kind(ctx: &AnalysisContext, analysis: &str, kind: ColumnKind, required: usize) -> Result<(), EngineError> {
    let found = ctx.dataset.columns_of(kind).len();
    if found < required {
        crate::debug_note!("{} refused: {} {} column(s), needs {}", analysis, found, kind.as_str(), required);
        return Err(EngineError::insufficient_columns(analysis, kind.as_str(), required, found));
    }
    Ok(())
}

fn averages(ctx: &AnalysisContext) -> Result<AnalysisResult, EngineError> {
    require_kind(ctx, "averages", ColumnKind::Numeric, 1)?;
    let cols = targets(ctx, ColumnKind::Numeric, usize::MAX);

    let columns: Vec<ColumnAverage> = cols
        .iter()
        .filter_map(|c| {
            let s = stats::describe(&c.numeric_values())?;
            Some(ColumnAverage {
                column: c.name.clone(),
                mean: s.mean,
                median: s.median,
                sum: s.sum,
                count: s.count,
                std: s.std,
            })
        })
        .collect();
    if columns.is_empty() {
        return Err(EngineError::insufficient_data("averages", cols.first().map(|c| c.name.as_str()), 1, 0));
    }

    let mut params = base_parameters(ctx);
    params.insert("columns".into(), json!(columns.iter().map(|c| &c.column).collect::<Vec<_>>()));

    let best = columns
        .iter()
        .max_by(|a, b| a.mean.total_cmp(&b.mean))
        .map(|c| (c.column.clone(), c.mean));
    let insight = match (&best, columns.len()) {
        (Some((name, mean)), 1) => format!("Average {} is {:.2}", name, mean),
        (Some((name, mean)), n) => format!("Highest average is {} ({:.2}) across {} numeric columns", name, mean, n),
        _ => String::new(),
    };

    let chart = ChartSpec::Bar {
        title: "Average Values by Column".into(),
        x_label: "Columns".into(),
        y_label: "Average Value".into(),
        categories: columns.iter().map(|c| c.column.clone()).collect(),
        values: columns.iter().map(|c| c.mean).collect(),
    };

    Ok(finish(Intent::Averages, params, Statistics::Averages { columns }, Some(chart), insight))
}

fn correlation(ctx: &AnalysisContext) -> Result<AnalysisResult, EngineError> {
    require_kind(ctx, "correlation", ColumnKind::Numeric, 2)?;

    let focused = ctx.classification.strategy == Strategy::Focused;
    let names: Vec<String> = if focused {
        let resolved = resolved_of(ctx, ColumnKind::Numeric);
        if resolved.len() >= 2 {
            resolved.iter().map(|c| c.name.clone()).collect()
        } else {
            ctx.profile
                .numeric_columns
                .iter()
                .take(ctx.config.focused_correlation_columns.max(2))
                .cloned()
                .collect()
        }
    } else {
        ctx.profile.numeric_columns.clone()
    };

    let raw_pairs = profile::pairwise_correlations(ctx.dataset, &names);
    if raw_pairs.is_empty() {
        return Err(EngineError::insufficient_data("correlation", None, 2, 0));
    }

    let lookup: HashMap<(&str, &str), f64> = raw_pairs
        .iter()
        .flat_map(|p| {
            vec![
                ((p.var1.as_str(), p.var2.as_str()), p.correlation),
                ((p.var2.as_str(), p.var1.as_str()), p.correlation),
            ]
        })
        .collect();
    let matrix: Vec<Vec<Option<f64>>> = names
        .iter()
        .map(|a| {
            names
                .iter()
                .map(|b| {
                    if a == b {
                        let varies = ctx
                            .profile
                            .column(a)
                            .and_then(|c| c.numeric.as_ref())
                            .and_then(|n| n.std)
                            .map(|s| s > 0.0)
                            .unwrap_or(false);
                        if varies { Some(1.0) } else { None }
                    } else {
                        lookup.get(&(a.as_str(), b.as_str())).copied()
                    }
                })
                .collect()
        })
        .collect();

    let mut pairs: Vec<CorrelationPair> = raw_pairs.iter().map(CorrelationPair::from_pair).collect();
    pairs.sort_by(|a, b| b.correlation.abs().total_cmp(&a.correlation.abs()));
    let strong_correlations: Vec<CorrelationPair> = pairs.iter().filter(|p| p.strong).cloned().collect();
    let highest_positive = pairs
        .iter()
        .filter(|p| p.correlation > 0.0)
        .max_by(|a, b| a.correlation.total_cmp(&b.correlation))
        .cloned();
    let highest_negative = pairs
        .iter()
        .filter(|p| p.correlation < 0.0)
        .min_by(|a, b| a.correlation.total_cmp(&b.correlation))
        .cloned();

    let insight = match strong_correlations.first() {
        Some(top) => format!(
            "Found {} strong correlation(s); strongest is {} and {} (r = {:.3})",
            strong_correlations.len(),
            top.var1,
            top.var2,
            top.correlation
        ),
        None => format!("No strong correlations (|r| >= {}) among {} numeric columns", stats::STRONG_CORRELATION, names.len()),
    };

    let mut params = base_parameters(ctx);
    params.insert("columns".into(), json!(names));
    params.insert("focused".into(), json!(focused));

    let chart = ChartSpec::Heatmap {
        title: "Correlation Matrix".into(),
        labels: names.clone(),
        matrix: matrix.clone(),
    };

    Ok(finish(
        Intent::Correlation,
        params,
        Statistics::Correlation {
            columns: names,
            matrix,
            pairs,
            strong_correlations,
            highest_positive,
            highest_negative,
        },
        Some(chart),
        insight,
    ))
}

fn trend(ctx: &AnalysisContext) -> Result<AnalysisResult, EngineError> {
    require_kind(ctx, "trend", ColumnKind::Numeric, 1)?;
    let target = match targets(ctx, ColumnKind::Numeric, 1).first() {
        Some(c) => *c,
        None => return Err(EngineError::insufficient_columns("trend", "numeric", 1, 0)),
    };
    let y_cells = target.numeric().unwrap_or(&[]);

    let time_col: Option<&Column> = resolved_of(ctx, ColumnKind::Temporal).first().copied().or_else(|| {
        if ctx.classification.strategy == Strategy::Temporal {
            ctx.dataset.columns_of(ColumnKind::Temporal).first().copied()
        } else {
            None
        }
    });

    let by_index = || -> Vec<(f64, f64)> {
        y_cells
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|y| (i as f64, y)))
            .collect()
    };

    let (mut points, x_axis) = match time_col {
        Some(tc) => {
            let dated: Vec<(f64, f64)> = y_cells
                .iter()
                .enumerate()
                .filter_map(|(i, v)| {
                    let y = (*v)?;
                    let x = tc.display_at(i).and_then(|s| parse_date_days(&s))?;
                    Some((x, y))
                })
                .collect();
            if dated.len() >= stats::MIN_TREND_POINTS {
                (dated, tc.name.clone())
            } else {
                crate::debug_note!("trend: '{}' gave {} dated points, using row order", tc.name, dated.len());
                (by_index(), "row_index".to_string())
            }
        }
        None => (by_index(), "row_index".to_string()),
    };

    if points.len() < stats::MIN_TREND_POINTS {
        return Err(EngineError::insufficient_data("trend", Some(target.name.as_str()), stats::MIN_TREND_POINTS, points.len()));
    }
    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    let xs: Vec<f64> = points.iter().map(|p| p.0).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.1).collect();

    let fit = stats::linear_fit(&xs, &ys)
        .ok_or_else(|| EngineError::insufficient_data("trend", Some(target.name.as_str()), 2, 1))?;
    let direction = if fit.slope > 0.0 {
        "increasing"
    } else if fit.slope < 0.0 {
        "decreasing"
    } else {
        "flat"
    };
    let fitted: Vec<f64> = xs.iter().map(|x| fit.intercept + fit.slope * x).collect();
    let unit = if x_axis == "row_index" { "row" } else { "day" };

    let insight = format!(
        "{} shows a {} trend (slope {:.4} per {}) over {} points",
        target.name, direction, fit.slope, unit, points.len()
    );

    let mut params = base_parameters(ctx);
    params.insert("column".into(), json!(target.name));
    params.insert("x_axis".into(), json!(x_axis));

    let chart = ChartSpec::Line {
        title: format!("Trend Analysis: {}", target.name),
        x_label: if x_axis == "row_index" { "Index".to_string() } else { format!("{} (days)", x_axis) },
        y_label: target.name.clone(),
        x: xs,
        y: ys.clone(),
        fitted: Some(fitted),
    };

    Ok(finish(
        Intent::Trend,
        params,
        Statistics::Trend {
            column: target.name.clone(),
            x_axis,
            slope: fit.slope,
            intercept: fit.intercept,
            r_squared: fit.r_squared,
            direction,
            points: points.len(),
            first_value: ys.first().copied().unwrap_or_default(),
            last_value: ys.last().copied().unwrap_or_default(),
        },
        Some(chart),
        insight,
    ))
}

/// Shape label from skewness and excess kurtosis, "unknown" when either is missing
pub fn distribution_shape(skew: Option<f64>, kurt: Option<f64>) -> &'static str {
    match (skew, kurt) {
        (Some(s), Some(k)) => {
            if s.abs() < stats::SKEW_SYMMETRY && k.abs() < 3.0 {
                "approximately_normal"
            } else if s > 1.0 {
                "right_skewed"
            } else if s < -1.0 {
                "left_skewed"
            } else if k > 3.0 {
                "heavy_tailed"
            } else {
                "unknown"
            }
        }
        _ => "unknown",
    }
}

fn distribution(ctx: &AnalysisContext) -> Result<AnalysisResult, EngineError> {
    require_kind(ctx, "distribution", ColumnKind::Numeric, 1)?;
    let resolved = resolved_of(ctx, ColumnKind::Numeric);
    let cols: Vec<&Column> = if resolved.is_empty() {
        ctx.dataset.columns_of(ColumnKind::Numeric).into_iter().take(1).collect()
    } else {
        resolved.into_iter().take(ctx.config.max_distribution_columns.max(1)).collect()
    };

    let mut first_values: Option<(String, Vec<f64>)> = None;
    let mut columns: Vec<DistributionStats> = Vec::new();
    for c in &cols {
        let values = c.numeric_values();
        let s: NumericSummary = match stats::describe(&values) {
            Some(s) => s,
            None => continue,
        };
        let percentiles = PERCENTILES
            .iter()
            .filter_map(|p| stats::quantile(&values, *p as f64 / 100.0).map(|value| Percentile { p: *p, value }))
            .collect();
        columns.push(DistributionStats {
            column: c.name.clone(),
            count: s.count,
            mean: s.mean,
            median: s.median,
            std: s.std,
            min: s.min,
            max: s.max,
            skewness: s.skewness,
            kurtosis: s.kurtosis,
            percentiles,
            shape: distribution_shape(s.skewness, s.kurtosis),
            outliers: stats::iqr_outliers(&values),
        });
        if first_values.is_none() {
            first_values = Some((c.name.clone(), values));
        }
    }

    let (chart_col, chart_values) = match first_values {
        Some(v) => v,
        None => {
            return Err(EngineError::insufficient_data("distribution", cols.first().map(|c| c.name.as_str()), 1, 0))
        }
    };

    let insight = match columns.first() {
        Some(d) => format!(
            "{}: mean {:.2}, median {:.2}, shape {}",
            d.column,
            d.mean,
            d.median,
            d.shape.replace('_', " ")
        ),
        None => String::new(),
    };

    let bins = ((chart_values.len() as f64).sqrt().ceil() as usize).clamp(5, 30);
    let chart = ChartSpec::Histogram {
        title: format!("Distribution of {}", chart_col),
        column: chart_col,
        values: chart_values,
        bins,
    };

    let mut params = base_parameters(ctx);
    params.insert("columns".into(), json!(columns.iter().map(|c| &c.column).collect::<Vec<_>>()));

    Ok(finish(Intent::Distribution, params, Statistics::Distribution { columns }, Some(chart), insight))
}

fn summary(ctx: &AnalysisContext) -> Result<AnalysisResult, EngineError> {
    let ds = ctx.dataset;
    let mut numeric = Vec::new();
    let mut categorical = Vec::new();
    let mut temporal = Vec::new();

    for c in ds.columns() {
        match c.kind {
            ColumnKind::Numeric => {
                if let Some(s) = stats::describe(&c.numeric_values()) {
                    numeric.push(NumericDescribe {
                        column: c.name.clone(),
                        count: s.count,
                        mean: s.mean,
                        std: s.std,
                        min: s.min,
                        q25: s.q25,
                        median: s.median,
                        q75: s.q75,
                        max: s.max,
                    });
                }
            }
            ColumnKind::Categorical => {
                let counts = profile::value_counts(c);
                categorical.push(CategoricalDescribe {
                    column: c.name.clone(),
                    count: c.non_missing_count(),
                    unique: counts.len(),
                    top: counts.first().map(|v| v.value.clone()),
                    freq: counts.first().map(|v| v.count).unwrap_or(0),
                });
            }
            ColumnKind::Temporal => {
                let texts = c.value_keys();
                let mut dated: Vec<(f64, &String)> =
                    texts.iter().filter_map(|t| parse_date_days(t).map(|d| (d, t))).collect();
                dated.sort_by(|a, b| a.0.total_cmp(&b.0));
                let unique = profile::value_counts(c).len();
                let (first, last) = if dated.is_empty() {
                    (texts.first().cloned(), texts.last().cloned())
                } else {
                    (dated.first().map(|d| d.1.clone()), dated.last().map(|d| d.1.clone()))
                };
                temporal.push(TemporalDescribe { column: c.name.clone(), count: texts.len(), unique, first, last });
            }
        }
    }

    let p = ctx.profile;
    let insight = format!(
        "{} rows x {} columns, {}% complete ({} numeric, {} categorical, {} temporal)",
        p.row_count,
        p.column_count,
        p.completeness_score,
        p.numeric_columns.len(),
        p.categorical_columns.len(),
        p.temporal_columns.len()
    );

    let chart = if numeric.is_empty() {
        None
    } else {
        Some(ChartSpec::Bar {
            title: "Mean Values by Column".into(),
            x_label: "Columns".into(),
            y_label: "Mean".into(),
            categories: numeric.iter().map(|n| n.column.clone()).collect(),
            values: numeric.iter().map(|n| n.mean).collect(),
        })
    };

    let mut params = base_parameters(ctx);
    params.insert("requested".into(), json!(ctx.classification.intent.as_str()));

    Ok(finish(
        Intent::Summary,
        params,
        Statistics::Summary {
            rows: p.row_count,
            columns: p.column_count,
            completeness_score: p.completeness_score,
            duplicate_rows: p.duplicate_rows,
            numeric,
            categorical,
            temporal,
        },
        chart,
        insight,
    ))
}

fn comparison(ctx: &AnalysisContext) -> Result<AnalysisResult, EngineError> {
    require_kind(ctx, "comparison", ColumnKind::Numeric, 1)?;
    let numeric = targets(ctx, ColumnKind::Numeric, 1);
    let target = match numeric.first() {
        Some(c) => *c,
        None => return Err(EngineError::insufficient_columns("comparison", "numeric", 1, 0)),
    };
    let group_col = resolved_of(ctx, ColumnKind::Categorical).first().copied();

    let mut entries: Vec<ComparisonEntry> = match group_col {
        Some(g) => group_values(target, g)
            .into_iter()
            .filter_map(|(label, values)| entry(label, &values))
            .collect(),
        None => numeric
            .iter()
            .filter_map(|c| entry(c.name.clone(), &c.numeric_values()))
            .collect(),
    };
    if entries.is_empty() {
        return Err(EngineError::insufficient_data("comparison", Some(target.name.as_str()), 1, 0));
    }
    entries.sort_by(|a, b| b.mean.total_cmp(&a.mean));
    entries.truncate(ctx.config.top_n.max(1));

    let leader = &entries[0];
    let spread = leader.mean - entries[entries.len() - 1].mean;
    let insight = match group_col {
        Some(g) => format!(
            "{} '{}' has the highest average {} ({:.2}); spread across {} groups is {:.2}",
            g.name, leader.label, target.name, leader.mean, entries.len(), spread
        ),
        None => format!(
            "{} has the highest mean ({:.2}) among {} compared column(s)",
            leader.label,
            leader.mean,
            entries.len()
        ),
    };

    let chart = ChartSpec::Bar {
        title: match group_col {
            Some(g) => format!("Average {} by {}", target.name, g.name),
            None => "Column Comparison".to_string(),
        },
        x_label: group_col.map(|g| g.name.clone()).unwrap_or_else(|| "Columns".into()),
        y_label: format!("Average {}", target.name),
        categories: entries.iter().map(|e| e.label.clone()).collect(),
        values: entries.iter().map(|e| e.mean).collect(),
    };

    let mut params = base_parameters(ctx);
    params.insert("target".into(), json!(target.name));
    params.insert("group_by".into(), json!(group_col.map(|g| g.name.clone())));

    Ok(finish(
        Intent::Comparison,
        params,
        Statistics::Comparison {
            target: target.name.clone(),
            group_by: group_col.map(|g| g.name.clone()),
            entries,
        },
        Some(chart),
        insight,
    ))
}

fn entry(label: String, values: &[f64]) -> Option<ComparisonEntry> {
    let s = stats::describe(values)?;
    Some(ComparisonEntry { label, mean: s.mean, median: s.median, min: s.min, max: s.max, count: s.count })
}

/// Values of `metric` per category of `group`, categories in first appearance order.
/// Rows missing either side are ignored.
fn group_values(metric: &Column, group: &Column) -> Vec<(String, Vec<f64>)> {
    let cells = metric.numeric().unwrap_or(&[]);
    let mut order: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, Vec<f64>> = HashMap::new();
    for (row, cell) in cells.iter().enumerate() {
        let (value, key) = match (cell, group.display_at(row)) {
            (Some(v), Some(k)) => (*v, k),
            _ => continue,
        };
        if !buckets.contains_key(&key) {
            order.push(key.clone());
        }
        buckets.entry(key).or_default().push(value);
    }
    order
        .into_iter()
        .map(|k| {
            let v = buckets.remove(&k).unwrap_or_default();
            (k, v)
        })
        .collect()
}

/// "top 5", "bottom 3 ..." - the first plain number in the question, if sensible
pub fn requested_count(question: &str) -> Option<usize> {
    crate::resolver::question_words(question)
        .iter()
        .find_map(|w| w.parse::<usize>().ok().filter(|n| *n > 0 && *n <= 1000))
}

fn label_column<'a>(ctx: &AnalysisContext<'a>, exclude: &str) -> Option<&'a Column> {
    let by_role = ctx
        .profile
        .columns
        .iter()
        .find(|c| c.role == ColumnRole::Identifier && c.name != exclude)
        .and_then(|c| ctx.dataset.column(&c.name));
    by_role.or_else(|| {
        ctx.dataset
            .columns_of(ColumnKind::Categorical)
            .into_iter()
            .find(|c| c.name != exclude)
    })
}

fn extremes(ctx: &AnalysisContext, top: bool) -> Result<AnalysisResult, EngineError> {
    let analysis = if top { "top_values" } else { "bottom_values" };
    require_kind(ctx, analysis, ColumnKind::Numeric, 1)?;
    let target = match targets(ctx, ColumnKind::Numeric, 1).first() {
        Some(c) => *c,
        None => return Err(EngineError::insufficient_columns(analysis, "numeric", 1, 0)),
    };
    let n = requested_count(ctx.question).unwrap_or(ctx.config.top_n).max(1);
    let label_col = label_column(ctx, &target.name);

    let mut ranked: Vec<(usize, f64)> = target
        .numeric()
        .unwrap_or(&[])
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i, v)))
        .collect();
    if ranked.is_empty() {
        return Err(EngineError::insufficient_data(analysis, Some(target.name.as_str()), 1, 0));
    }
    if top {
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    } else {
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
    }
    let values: Vec<RankedValue> = ranked
        .into_iter()
        .take(n)
        .map(|(row, value)| RankedValue { row, value, label: label_col.and_then(|c| c.display_at(row)) })
        .collect();

    let head = &values[0];
    let insight = format!(
        "{} {}: {}{}",
        if top { "Highest" } else { "Lowest" },
        target.name,
        format_number(head.value),
        head.label.as_ref().map(|l| format!(" ({})", l)).unwrap_or_default()
    );

    let chart = ChartSpec::Bar {
        title: format!("{} {} {} values", if top { "Top" } else { "Bottom" }, values.len(), target.name),
        x_label: label_col.map(|c| c.name.clone()).unwrap_or_else(|| "Row".into()),
        y_label: target.name.clone(),
        categories: values
            .iter()
            .map(|v| v.label.clone().unwrap_or_else(|| format!("row {}", v.row)))
            .collect(),
        values: values.iter().map(|v| v.value).collect(),
    };

    let mut params = base_parameters(ctx);
    params.insert("column".into(), json!(target.name));
    params.insert("n".into(), json!(n));

    Ok(finish(
        if top { Intent::TopValues } else { Intent::BottomValues },
        params,
        Statistics::Extremes {
            column: target.name.clone(),
            label_column: label_col.map(|c| c.name.clone()),
            values,
        },
        Some(chart),
        insight,
    ))
}

fn categorical_breakdown(ctx: &AnalysisContext) -> Result<AnalysisResult, EngineError> {
    require_kind(ctx, "categorical_breakdown", ColumnKind::Categorical, 1)?;
    let column = match targets(ctx, ColumnKind::Categorical, 1).first() {
        Some(c) => *c,
        None => return Err(EngineError::insufficient_columns("categorical_breakdown", "categorical", 1, 0)),
    };

    let all_counts = profile::value_counts(column);
    let non_missing = column.non_missing_count();
    if non_missing == 0 {
        return Err(EngineError::insufficient_data("categorical_breakdown", Some(column.name.as_str()), 1, 0));
    }
    let distinct = all_counts.len();
    let diversity = stats::shannon_diversity(&all_counts.iter().map(|v| v.count).collect::<Vec<_>>());
    let counts: Vec<ValueCount> = all_counts.into_iter().take(ctx.config.breakdown_top_k.max(1)).collect();
    let dominant = counts.first().cloned();
    let dominant_share = dominant
        .as_ref()
        .map(|d| d.count as f64 / non_missing as f64 * 100.0)
        .unwrap_or(0.0);

    let metric = resolved_of(ctx, ColumnKind::Numeric).first().copied();
    let metric_means: Vec<GroupMean> = match metric {
        Some(m) => {
            let grouped: HashMap<String, Vec<f64>> = group_values(m, column).into_iter().collect();
            counts
                .iter()
                .filter_map(|vc| {
                    let values = grouped.get(&vc.value)?;
                    Some(GroupMean { group: vc.value.clone(), mean: stats::mean(values)?, count: values.len() })
                })
                .collect()
        }
        None => Vec::new(),
    };

    let mut insight = match &dominant {
        Some(d) => format!(
            "'{}' is the most common {} ({:.1}% of {} values, {} distinct)",
            d.value, column.name, dominant_share, non_missing, distinct
        ),
        None => String::new(),
    };
    if let (Some(m), Some(best)) = (metric, metric_means.iter().max_by(|a, b| a.mean.total_cmp(&b.mean))) {
        insight.push_str(&format!("; highest average {} is in '{}' ({:.2})", m.name, best.group, best.mean));
    }

    let chart = ChartSpec::Bar {
        title: format!("Breakdown of {}", column.name),
        x_label: column.name.clone(),
        y_label: "Count".into(),
        categories: counts.iter().map(|c| c.value.clone()).collect(),
        values: counts.iter().map(|c| c.count as f64).collect(),
    };

    let mut params = base_parameters(ctx);
    params.insert("column".into(), json!(column.name));
    params.insert("metric".into(), json!(metric.map(|m| m.name.clone())));

    Ok(finish(
        Intent::CategoricalBreakdown,
        params,
        Statistics::Breakdown {
            column: column.name.clone(),
            counts,
            distinct,
            non_missing,
            dominant,
            dominant_share,
            diversity,
            metric: metric.map(|m| m.name.clone()),
            metric_means,
        },
        Some(chart),
        insight,
    ))
}

fn anomaly_detection(ctx: &AnalysisContext) -> Result<AnalysisResult, EngineError> {
    require_kind(ctx, "anomaly_detection", ColumnKind::Numeric, 1)?;
    let cols = targets(ctx, ColumnKind::Numeric, usize::MAX);

    let mut columns: Vec<ColumnOutliers> = Vec::new();
    let mut skipped: Vec<String> = Vec::new();
    let mut best_seen = 0;
    for c in &cols {
        let values = c.numeric_values();
        best_seen = best_seen.max(values.len());
        match stats::iqr_outliers(&values) {
            Some(summary) => columns.push(ColumnOutliers { column: c.name.clone(), summary }),
            None => skipped.push(c.name.clone()),
        }
    }
    if columns.is_empty() {
        return Err(EngineError::insufficient_data(
            "anomaly_detection",
            cols.first().map(|c| c.name.as_str()),
            stats::MIN_OUTLIER_SAMPLES,
            best_seen,
        ));
    }

    let total_outliers: usize = columns.iter().map(|c| c.summary.outlier_count).sum();
    let worst = columns
        .iter()
        .fold(&columns[0], |acc, c| if c.summary.outlier_count > acc.summary.outlier_count { c } else { acc });

    let insight = if total_outliers == 0 {
        format!("No outliers found in {} column(s) using the 1.5 x IQR rule", columns.len())
    } else {
        format!(
            "{} outlier(s) across {} column(s); most in {} ({})",
            total_outliers,
            columns.len(),
            worst.column,
            worst.summary.outlier_count
        )
    };

    let chart = ctx.dataset.column(&worst.column).map(|c| ChartSpec::BoxPlot {
        title: format!("Outliers in {}", c.name),
        column: c.name.clone(),
        values: c.numeric_values(),
    });

    let mut params = base_parameters(ctx);
    params.insert("columns".into(), json!(cols.iter().map(|c| &c.name).collect::<Vec<_>>()));
    params.insert("method".into(), json!("iqr_1.5"));

    Ok(finish(
        Intent::AnomalyDetection,
        params,
        Statistics::Anomalies { columns, skipped, total_outliers },
        chart,
        insight,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::LoadRequest;
    use crate::intent::classify;
    use crate::resolver::resolve_columns;

    fn load(cols: &[&str], rows: &[Vec<String>]) -> Dataset {
        let req = LoadRequest::new(cols.iter().map(|c| c.to_string()).collect(), rows.to_vec());
        Dataset::from_request(&req, 10).unwrap()
    }

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter().map(|r| r.iter().map(|c| c.to_string()).collect()).collect()
    }

    fn ask(ds: &Dataset, question: &str) -> Result<AnalysisResult, EngineError> {
        let profile = DatasetProfile::build(Some(ds));
        let names = ds.column_names();
        let resolved = resolve_columns(question, &names);
        let classification = classify(question, &resolved, &profile);
        let config = EngineConfig::default();
        let ctx = AnalysisContext {
            dataset: ds,
            profile: &profile,
            resolved: &resolved,
            question,
            classification,
            config: &config,
        };
        run_analysis(&ctx)
    }

    fn price_category() -> Dataset {
        load(
            &["price", "category"],
            &rows(&[&["10", "a"], &["20", "a"], &["30", "a"], &["40", "b"], &["1000", "c"]]),
        )
    }

    #[test]
    fn grouped_average_becomes_a_breakdown() {
        let r = ask(&price_category(), "what's the average price grouped by category").unwrap();
        assert_eq!(r.analysis_type, Intent::CategoricalBreakdown);
        match &r.statistics {
            Statistics::Breakdown { column, dominant, dominant_share, metric, metric_means, .. } => {
                assert_eq!(column, "category");
                assert_eq!(dominant.as_ref().unwrap().value, "a");
                assert!((dominant_share - 60.0).abs() < 1e-9);
                assert_eq!(metric.as_deref(), Some("price"));
                assert_eq!(metric_means[0], GroupMean { group: "a".into(), mean: 20.0, count: 3 });
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn averages_without_numeric_columns_fail_typed() {
        let ds = load(&["name"], &rows(&[&["x"], &["y"]]));
        match ask(&ds, "average please") {
            Err(EngineError::InsufficientColumns { required, found, .. }) => assert_eq!((required, found), (1, 0)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn correlation_needs_two_numeric_columns() {
        let r = ask(&price_category(), "show correlation");
        assert!(matches!(r, Err(EngineError::InsufficientColumns { required: 2, found: 1, .. })));
    }

    #[test]
    fn trend_on_row_position_and_short_series() {
        let ds = load(&["sales"], &rows(&[&["1"], &["3"], &["5"], &["7"]]));
        let r = ask(&ds, "sales trend").unwrap();
        match r.statistics {
            Statistics::Trend { slope, direction, ref x_axis, .. } => {
                assert!((slope - 2.0).abs() < 1e-9);
                assert_eq!(direction, "increasing");
                assert_eq!(x_axis, "row_index");
            }
            other => panic!("unexpected {:?}", other),
        }

        let ds = load(&["sales"], &rows(&[&["1"], &["NA"], &["5"]]));
        assert!(matches!(ask(&ds, "sales trend"), Err(EngineError::InsufficientData { required: 3, found: 2, .. })));
    }

    #[test]
    fn trend_uses_dates_when_present() {
        let ds = load(
            &["day", "temp"],
            &rows(&[&["2024-01-01", "10"], &["2024-01-03", "6"], &["2024-01-02", "8"]]),
        );
        let r = ask(&ds, "temp trend").unwrap();
        match r.statistics {
            Statistics::Trend { slope, direction, ref x_axis, first_value, .. } => {
                assert!((slope + 2.0).abs() < 1e-9);
                assert_eq!(direction, "decreasing");
                assert_eq!(x_axis, "day");
                assert_eq!(first_value, 10.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn top_values_honour_the_requested_count() {
        let ds = load(
            &["item", "revenue"],
            &rows(&[&["a", "5"], &["b", "50"], &["c", "20"], &["d", "35"]]),
        );
        let r = ask(&ds, "top 2 revenue").unwrap();
        match r.statistics {
            Statistics::Extremes { ref values, ref label_column, .. } => {
                assert_eq!(values.len(), 2);
                assert_eq!(values[0].value, 50.0);
                assert_eq!(values[0].label.as_deref(), Some("b"));
                assert_eq!(label_column.as_deref(), Some("item"));
            }
            other => panic!("unexpected {:?}", other),
        }
        let r = ask(&ds, "lowest revenue").unwrap();
        assert_eq!(r.analysis_type, Intent::BottomValues);
        assert!(r.insight_text.starts_with("Lowest revenue: 5"));
    }

    #[test]
    fn requested_count_skips_out_of_range_numbers() {
        assert_eq!(requested_count("top values of 2024 for 5 stores"), Some(5));
        assert_eq!(requested_count("top 0 then 3"), Some(3));
        assert_eq!(requested_count("sales in 2024"), None);
        assert_eq!(requested_count("highest revenue"), None);
    }

    #[test]
    fn focused_correlation_falls_back_to_leading_numeric_columns() {
        let ds = load(
            &["price", "qty", "region"],
            &rows(&[&["1", "2", "north"], &["2", "4", "south"], &["3", "5", "north"], &["4", "9", "east"]]),
        );
        let r = ask(&ds, "relationship between price and region").unwrap();
        assert_eq!(r.analysis_type, Intent::Correlation);
        assert_eq!(r.parameters["focused"], json!(true));
        assert_eq!(r.parameters["columns"], json!(["price", "qty"]));
        match r.statistics {
            Statistics::Correlation { ref pairs, .. } => {
                assert_eq!(pairs.len(), 1);
                assert_eq!((pairs[0].var1.as_str(), pairs[0].var2.as_str()), ("price", "qty"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn anomalies_skip_short_columns() {
        let ds = load(&["x"], &rows(&[&["1"], &["2"], &["3"], &["4"], &["5"], &["100"]]));
        let r = ask(&ds, "any outliers").unwrap();
        match r.statistics {
            Statistics::Anomalies { ref columns, total_outliers, .. } => {
                assert_eq!(total_outliers, 1);
                assert_eq!(columns[0].summary.outlier_values, vec![100.0]);
            }
            other => panic!("unexpected {:?}", other),
        }

        let ds = load(&["x"], &rows(&[&["1"], &["2"], &["3"]]));
        assert!(matches!(ask(&ds, "outliers"), Err(EngineError::InsufficientData { required: 5, found: 3, .. })));
    }

    #[test]
    fn general_questions_get_a_summary() {
        let r = ask(&price_category(), "tell me something").unwrap();
        assert_eq!(r.analysis_type, Intent::Summary);
        assert_eq!(r.parameters["requested"], json!("general"));
        assert!(r.insight_text.starts_with("5 rows x 2 columns"));
    }

    #[test]
    fn comparison_by_group_sorts_means() {
        let ds = load(
            &["price", "segment"],
            &rows(&[&["10", "a"], &["20", "a"], &["30", "a"], &["40", "b"], &["1000", "c"]]),
        );
        let r = ask(&ds, "compare price across segment").unwrap();
        match r.statistics {
            Statistics::Comparison { ref entries, ref group_by, .. } => {
                assert_eq!(group_by.as_deref(), Some("segment"));
                let labels: Vec<&str> = entries.iter().map(|e| e.label.as_str()).collect();
                assert_eq!(labels, vec!["c", "b", "a"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn distribution_reports_shape_and_percentiles() {
        let r = ask(&price_category(), "price distribution").unwrap();
        match r.statistics {
            Statistics::Distribution { ref columns } => {
                assert_eq!(columns[0].percentiles.len(), 9);
                assert_eq!(columns[0].shape, "right_skewed");
                assert_eq!(columns[0].outliers.as_ref().unwrap().outlier_values, vec![1000.0]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(distribution_shape(Some(0.1), Some(0.2)), "approximately_normal");
        assert_eq!(distribution_shape(None, None), "unknown");
    }

    #[test]
    fn empty_dataset_refuses_every_query() {
        let ds = load(&["a", "b"], &[]);
        assert!(matches!(ask(&ds, "summary"), Err(EngineError::InsufficientData { .. })));
        assert!(matches!(ask(&ds, "average a"), Err(EngineError::InsufficientData { .. })));
    }
}

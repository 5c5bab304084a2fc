// Whole-dataset analytics dashboard.
//
// Unlike a query result this looks at every column at once: per-column statistics,
// a data quality report, missing values, categorical frequencies, distribution shape,
// outliers and a few ready-to-draw charts. Built once per dataset version.

use std::collections::HashMap;

use serde::Serialize;

use crate::analysis::{distribution_shape, Percentile, PERCENTILES};
use crate::charts::ChartSpec;
use crate::dataset::{Column, ColumnKind, Dataset};
use crate::insights::{self, Recommendation};
use crate::profile::{self, CorrelatedPair, DatasetProfile, ValueCount};
use crate::stats::{self, NumericSummary, OutlierSummary};

/// share of missing cells (percent) from which a column is flagged
pub const HIGH_MISSING_PERCENTAGE: f64 = 10.0;
/// value counts with std below this share of their mean are "uniform"
pub const UNIFORM_COUNT_SPREAD: f64 = 0.5;
pub const CATEGORY_EXTREMES: usize = 5;
pub const MAX_DISTRIBUTION_CHARTS: usize = 4;
pub const MAX_CATEGORY_CHARTS: usize = 2;
const HISTOGRAM_BINS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityIssue {
    HighMissingValues,
    ConstantValues,
    InconsistentFormatting,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnQuality {
    pub column: String,
    /// percent of non-missing cells
    pub completeness: f64,
    /// distinct values over all rows, percent
    pub uniqueness: f64,
    pub issues: Vec<QualityIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataQualityReport {
    /// mean column completeness
    pub overall_quality_score: f64,
    pub column_quality: Vec<ColumnQuality>,
    pub quality_issues: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStatistics {
    pub column: String,
    #[serde(flatten)]
    pub summary: NumericSummary,
    /// smallest of the most frequent values
    pub mode: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallSummary {
    pub total_rows: usize,
    pub total_columns: usize,
    pub numeric_columns: usize,
    pub categorical_columns: usize,
    pub temporal_columns: usize,
    pub missing_cells: usize,
    /// rows without a single missing cell
    pub complete_rows: usize,
    pub data_completeness_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComprehensiveStatistics {
    pub numeric_statistics: Vec<ColumnStatistics>,
    pub overall_summary: OverallSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnMissing {
    pub column: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingValuesAnalysis {
    /// every column, in dataset order
    pub columns: Vec<ColumnMissing>,
    pub total_missing: usize,
    pub columns_with_missing: Vec<String>,
    pub complete_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoricalColumnAnalysis {
    pub column: String,
    pub unique_count: usize,
    pub most_common: Vec<ValueCount>,
    pub least_common: Vec<ValueCount>,
    /// Shannon entropy of the frequency table
    pub diversity_index: f64,
    /// share of the most common value, percent
    pub concentration: f64,
    pub category_distribution: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Normality {
    pub is_approximately_normal: bool,
    pub skewness: f64,
    pub kurtosis: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDistribution {
    pub column: String,
    pub distribution_type: &'static str,
    /// None below three values
    pub normality: Option<Normality>,
    pub outliers: Option<OutlierSummary>,
    pub percentiles: Vec<Percentile>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationOverview {
    pub strong_correlations: Vec<CorrelatedPair>,
    pub highest_positive: Option<CorrelatedPair>,
    pub highest_negative: Option<CorrelatedPair>,
    pub total_strong_correlations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnOutliers {
    pub column: String,
    #[serde(flatten)]
    pub summary: OutlierSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardChart {
    pub name: String,
    pub spec: ChartSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsDashboard {
    pub version: u64,
    pub summary_statistics: ComprehensiveStatistics,
    pub data_quality_report: DataQualityReport,
    /// None with fewer than two numeric columns
    pub correlation: Option<CorrelationOverview>,
    pub distribution_analysis: Vec<ColumnDistribution>,
    pub categorical_analysis: Vec<CategoricalColumnAnalysis>,
    pub missing_values_analysis: MissingValuesAnalysis,
    pub outlier_detection: Vec<ColumnOutliers>,
    pub charts: Vec<DashboardChart>,
    pub recommendations: Vec<Recommendation>,
}

pub fn build_dashboard(version: u64, ds: &Dataset, profile: &DatasetProfile) -> AnalyticsDashboard {
    let highlights = insights::correlation_highlights(ds, profile);
    let dashboard = AnalyticsDashboard {
        version,
        summary_statistics: comprehensive_statistics(ds),
        data_quality_report: data_quality_report(ds),
        correlation: correlation_overview(ds, profile),
        distribution_analysis: distribution_analysis(ds),
        categorical_analysis: categorical_analysis(ds),
        missing_values_analysis: missing_values_analysis(ds),
        outlier_detection: outlier_detection(ds),
        charts: dashboard_charts(ds, profile),
        recommendations: insights::recommendations(ds, profile, &highlights),
    };
    crate::debug_note!(
        "dashboard for version {}: {} quality issue(s), {} chart(s)",
        version,
        dashboard.data_quality_report.quality_issues.len(),
        dashboard.charts.len()
    );
    dashboard
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

pub fn complete_rows(ds: &Dataset) -> usize {
    (0..ds.row_count())
        .filter(|r| ds.columns().iter().all(|c| !c.is_missing_at(*r)))
        .count()
}

/// Most frequent value, the smallest one on ties
pub fn mode(values: &[f64]) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mut best: Option<(f64, usize)> = None;
    let mut i = 0;
    while i < sorted.len() {
        let run = sorted[i..].iter().take_while(|v| **v == sorted[i]).count();
        if best.map(|(_, n)| run > n).unwrap_or(true) {
            best = Some((sorted[i], run));
        }
        i += run;
    }
    best.map(|(v, _)| v)
}

pub fn comprehensive_statistics(ds: &Dataset) -> ComprehensiveStatistics {
    let numeric_statistics = ds
        .columns_of(ColumnKind::Numeric)
        .iter()
        .filter_map(|c| {
            let values = c.numeric_values();
            let summary = stats::describe(&values)?;
            Some(ColumnStatistics { column: c.name.clone(), summary, mode: mode(&values) })
        })
        .collect();

    let complete = complete_rows(ds);
    let overall_summary = OverallSummary {
        total_rows: ds.row_count(),
        total_columns: ds.column_count(),
        numeric_columns: ds.columns_of(ColumnKind::Numeric).len(),
        categorical_columns: ds.columns_of(ColumnKind::Categorical).len(),
        temporal_columns: ds.columns_of(ColumnKind::Temporal).len(),
        missing_cells: ds.missing_cells(),
        complete_rows: complete,
        data_completeness_percentage: if ds.row_count() == 0 { 100.0 } else { percent(complete, ds.row_count()) },
    };

    ComprehensiveStatistics { numeric_statistics, overall_summary }
}

/// Text cells whose lengths vary more than twice their mean length
fn inconsistent_formatting(column: &Column) -> bool {
    let lengths: Vec<f64> = match column.text() {
        Some(cells) => cells.iter().flatten().map(|s| s.chars().count() as f64).collect(),
        None => return false,
    };
    match (stats::variance(&lengths), stats::mean(&lengths)) {
        (Some(var), Some(mean)) => var > mean * 2.0,
        _ => false,
    }
}

pub fn column_quality(column: &Column) -> ColumnQuality {
    let rows = column.len();
    let missing = column.missing_count();
    let unique = profile::value_counts(column).len();

    let mut issues = Vec::new();
    if percent(missing, rows) > HIGH_MISSING_PERCENTAGE {
        issues.push(QualityIssue::HighMissingValues);
    }
    if unique == 1 {
        issues.push(QualityIssue::ConstantValues);
    }
    if inconsistent_formatting(column) {
        issues.push(QualityIssue::InconsistentFormatting);
    }

    ColumnQuality {
        column: column.name.clone(),
        completeness: if rows == 0 { 100.0 } else { percent(rows - missing, rows) },
        uniqueness: percent(unique, rows),
        issues,
    }
}

pub fn data_quality_report(ds: &Dataset) -> DataQualityReport {
    let column_quality: Vec<ColumnQuality> = ds.columns().iter().map(column_quality).collect();

    let mut quality_issues = Vec::new();
    let mut recommendations = Vec::new();
    for (q, c) in column_quality.iter().zip(ds.columns()) {
        for issue in &q.issues {
            match issue {
                QualityIssue::HighMissingValues => {
                    let missing = c.missing_count();
                    quality_issues.push(format!(
                        "Column '{}' has {} missing values ({:.1}%)",
                        q.column,
                        missing,
                        percent(missing, c.len())
                    ));
                    recommendations.push(format!("Consider imputing or removing missing values in '{}'", q.column));
                }
                QualityIssue::ConstantValues => {
                    quality_issues.push(format!("Column '{}' has constant values", q.column));
                    recommendations.push(format!("Column '{}' has constant values and might be removed", q.column));
                }
                QualityIssue::InconsistentFormatting => {
                    recommendations.push(format!("Standardize formatting in '{}'", q.column));
                }
            }
        }
    }

    let scores: Vec<f64> = column_quality.iter().map(|q| q.completeness).collect();
    DataQualityReport {
        overall_quality_score: stats::mean(&scores).unwrap_or(100.0),
        column_quality,
        quality_issues,
        recommendations,
    }
}

pub fn missing_values_analysis(ds: &Dataset) -> MissingValuesAnalysis {
    let columns: Vec<ColumnMissing> = ds
        .columns()
        .iter()
        .map(|c| {
            let count = c.missing_count();
            ColumnMissing { column: c.name.clone(), count, percentage: percent(count, ds.row_count()) }
        })
        .collect();

    MissingValuesAnalysis {
        total_missing: columns.iter().map(|c| c.count).sum(),
        columns_with_missing: columns.iter().filter(|c| c.count > 0).map(|c| c.column.clone()).collect(),
        complete_rows: complete_rows(ds),
        columns,
    }
}

pub fn categorical_column(column: &Column) -> CategoricalColumnAnalysis {
    let counts = profile::value_counts(column);
    let sizes: Vec<usize> = counts.iter().map(|v| v.count).collect();
    let non_missing: usize = sizes.iter().sum();

    let as_f64: Vec<f64> = sizes.iter().map(|n| *n as f64).collect();
    let uniform = match (stats::std_deviation(&as_f64), stats::mean(&as_f64)) {
        (Some(std), Some(mean)) => std < mean * UNIFORM_COUNT_SPREAD,
        _ => false,
    };

    CategoricalColumnAnalysis {
        column: column.name.clone(),
        unique_count: counts.len(),
        most_common: counts.iter().take(CATEGORY_EXTREMES).cloned().collect(),
        least_common: counts[counts.len().saturating_sub(CATEGORY_EXTREMES)..].to_vec(),
        diversity_index: stats::shannon_diversity(&sizes),
        concentration: counts.first().map(|v| percent(v.count, non_missing)).unwrap_or(0.0),
        category_distribution: if uniform { "uniform" } else { "skewed" },
    }
}

/// Text columns (categorical and temporal)
pub fn categorical_analysis(ds: &Dataset) -> Vec<CategoricalColumnAnalysis> {
    ds.columns()
        .iter()
        .filter(|c| c.kind != ColumnKind::Numeric)
        .map(categorical_column)
        .collect()
}

pub fn normality(values: &[f64]) -> Option<Normality> {
    if values.len() < 3 {
        return None;
    }
    let skewness = stats::skewness(values)?.abs();
    let kurtosis = stats::excess_kurtosis(values).unwrap_or(0.0).abs();
    Some(Normality { is_approximately_normal: skewness < 1.0 && kurtosis < 3.0, skewness, kurtosis })
}

pub fn column_distribution(column: &Column) -> Option<ColumnDistribution> {
    let values = column.numeric_values();
    if values.is_empty() {
        return None;
    }
    let percentiles = PERCENTILES
        .iter()
        .filter_map(|p| stats::quantile(&values, *p as f64 / 100.0).map(|value| Percentile { p: *p, value }))
        .collect();
    Some(ColumnDistribution {
        column: column.name.clone(),
        distribution_type: distribution_shape(stats::skewness(&values), stats::excess_kurtosis(&values)),
        normality: normality(&values),
        outliers: stats::iqr_outliers(&values),
        percentiles,
    })
}

pub fn distribution_analysis(ds: &Dataset) -> Vec<ColumnDistribution> {
    ds.columns_of(ColumnKind::Numeric)
        .into_iter()
        .filter_map(column_distribution)
        .collect()
}

pub fn correlation_overview(ds: &Dataset, profile: &DatasetProfile) -> Option<CorrelationOverview> {
    if profile.numeric_columns.len() < 2 {
        return None;
    }
    let pairs = profile::pairwise_correlations(ds, &profile.numeric_columns);
    let strong_correlations: Vec<CorrelatedPair> = pairs
        .iter()
        .filter(|p| p.correlation.abs() > stats::RELATIONSHIP_CORRELATION)
        .cloned()
        .collect();
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

    Some(CorrelationOverview {
        total_strong_correlations: strong_correlations.len(),
        strong_correlations,
        highest_positive,
        highest_negative,
    })
}

/// Columns with at least five values
pub fn outlier_detection(ds: &Dataset) -> Vec<ColumnOutliers> {
    ds.columns_of(ColumnKind::Numeric)
        .iter()
        .filter_map(|c| {
            stats::iqr_outliers(&c.numeric_values()).map(|summary| ColumnOutliers { column: c.name.clone(), summary })
        })
        .collect()
}

fn correlation_matrix(ds: &Dataset, names: &[String]) -> Vec<Vec<Option<f64>>> {
    let lookup: HashMap<(String, String), f64> = profile::pairwise_correlations(ds, names)
        .into_iter()
        .flat_map(|p| {
            [
                ((p.var1.clone(), p.var2.clone()), p.correlation),
                ((p.var2, p.var1), p.correlation),
            ]
        })
        .collect();
    names
        .iter()
        .map(|a| {
            names
                .iter()
                .map(|b| if a == b { Some(1.0) } else { lookup.get(&(a.clone(), b.clone())).copied() })
                .collect()
        })
        .collect()
}

/// Histograms for the first numeric columns, the correlation heatmap, missing values per column
/// and the top categories of the first categorical columns
pub fn dashboard_charts(ds: &Dataset, profile: &DatasetProfile) -> Vec<DashboardChart> {
    let mut charts = Vec::new();

    let numeric = ds.columns_of(ColumnKind::Numeric);
    for c in numeric.iter().take(MAX_DISTRIBUTION_CHARTS) {
        let values = c.numeric_values();
        if values.is_empty() {
            continue;
        }
        charts.push(DashboardChart {
            name: format!("{}_distribution", c.name),
            spec: ChartSpec::Histogram {
                title: format!("Distribution of {}", c.name),
                column: c.name.clone(),
                values,
                bins: HISTOGRAM_BINS,
            },
        });
    }

    let heat_columns: Vec<String> = profile.numeric_columns.iter().take(MAX_DISTRIBUTION_CHARTS).cloned().collect();
    if heat_columns.len() >= 2 {
        charts.push(DashboardChart {
            name: "correlation_heatmap".into(),
            spec: ChartSpec::Heatmap {
                title: "Correlation Matrix".into(),
                matrix: correlation_matrix(ds, &heat_columns),
                labels: heat_columns,
            },
        });
    }

    charts.push(DashboardChart {
        name: "missing_values".into(),
        spec: ChartSpec::Bar {
            title: "Missing Values by Column".into(),
            x_label: "Columns".into(),
            y_label: "Missing Count".into(),
            categories: ds.column_names().iter().map(|n| n.to_string()).collect(),
            values: ds.columns().iter().map(|c| c.missing_count() as f64).collect(),
        },
    });

    for c in ds.columns_of(ColumnKind::Categorical).iter().take(MAX_CATEGORY_CHARTS) {
        let top: Vec<ValueCount> = profile::value_counts(c).into_iter().take(10).collect();
        if top.is_empty() {
            continue;
        }
        charts.push(DashboardChart {
            name: format!("{}_categories", c.name),
            spec: ChartSpec::Bar {
                title: format!("Top Categories in {}", c.name),
                x_label: c.name.clone(),
                y_label: "Count".into(),
                categories: top.iter().map(|v| v.value.clone()).collect(),
                values: top.iter().map(|v| v.count as f64).collect(),
            },
        });
    }

    charts
}

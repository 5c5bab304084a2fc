// Dataset context and answers shaped for a text generation assistant.
//
// The assistant does not go through intent classification: every keyword family
// present in the question adds its own section, so one question can pull statistics,
// correlations and missing values together.

use prettytable::{Cell, Row, Table};
use serde::Serialize;

use crate::dashboard::{self, ColumnDistribution, ColumnMissing, ColumnOutliers};
use crate::dataset::{Column, ColumnKind, Dataset};
use crate::profile::{self, CorrelatedPair, DatasetProfile, ValueCount};
use crate::resolver::resolve_columns;
use crate::stats;

pub const SAMPLE_ROWS: usize = 3;
pub const SAMPLE_COLUMNS: usize = 10;
pub const MAX_STATISTIC_COLUMNS: usize = 5;
pub const MAX_DISTRIBUTION_COLUMNS: usize = 3;
pub const MAX_CORRELATIONS: usize = 5;
pub const MAX_SAMPLE_VALUES: usize = 10;

const STATISTIC_WORDS: [&str; 5] = ["average", "mean", "median", "sum", "total"];
const DISTRIBUTION_WORDS: [&str; 4] = ["distribution", "spread", "range", "histogram"];
const CORRELATION_WORDS: [&str; 4] = ["correlation", "relationship", "related", "connected"];
const MISSING_WORDS: [&str; 4] = ["missing", "null", "empty", "incomplete"];
const OUTLIER_WORDS: [&str; 4] = ["outlier", "anomaly", "unusual", "extreme"];

pub const NOTHING_FOUND: &str = "I couldn't find specific information to answer your question.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericDetail {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDetail {
    pub name: String,
    pub kind: ColumnKind,
    pub total_values: usize,
    pub non_null_values: usize,
    pub null_values: usize,
    pub unique_values: usize,
    pub numeric: Option<NumericDetail>,
    /// text columns only
    pub most_common: Vec<ValueCount>,
    pub sample_values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnTotals {
    pub column: String,
    pub mean: f64,
    pub median: f64,
    pub sum: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingOverview {
    pub total_missing: usize,
    /// columns with at least one missing cell
    pub columns: Vec<ColumnMissing>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantAnswer {
    pub question: String,
    pub answer: String,
    pub mentioned_columns: Vec<String>,
    pub column_info: Vec<ColumnDetail>,
    pub statistics: Vec<ColumnTotals>,
    pub distributions: Vec<ColumnDistribution>,
    pub correlations: Vec<CorrelatedPair>,
    pub missing_analysis: Option<MissingOverview>,
    pub outliers: Vec<ColumnOutliers>,
    /// the dataset context the answer was produced against
    pub context: String,
}

fn mentions(q: &str, words: &[&str]) -> bool {
    words.iter().any(|w| q.contains(w))
}

fn sample_table(ds: &Dataset) -> String {
    let cols: Vec<&Column> = ds.columns().iter().take(SAMPLE_COLUMNS).collect();
    let mut table = Table::new();
    table.set_titles(Row::new(cols.iter().map(|c| Cell::new(&c.name)).collect()));
    for r in 0..ds.row_count().min(SAMPLE_ROWS) {
        table.add_row(Row::new(
            cols.iter()
                .map(|c| Cell::new(&c.display_at(r).unwrap_or_else(|| "NA".to_string())))
                .collect(),
        ));
    }
    table.to_string()
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| format!("{:.2}", x)).unwrap_or_else(|| "n/a".to_string())
}

/// Plain-text description of the loaded dataset: shape, kinds, a few sample rows,
/// key statistics, missing values, patterns and dataset type
pub fn dataset_context(ds: &Dataset, profile: &DatasetProfile) -> String {
    let mut parts: Vec<String> = vec![
        "Dataset Overview:".to_string(),
        format!("- {} rows and {} columns", ds.row_count(), ds.column_count()),
        format!("- Columns: {}", ds.column_names().join(", ")),
    ];
    if !profile.numeric_columns.is_empty() {
        parts.push(format!("- Numeric columns: {}", profile.numeric_columns.join(", ")));
    }
    if !profile.categorical_columns.is_empty() {
        parts.push(format!("- Categorical columns: {}", profile.categorical_columns.join(", ")));
    }
    if !profile.temporal_columns.is_empty() {
        parts.push(format!("- Date columns: {}", profile.temporal_columns.join(", ")));
    }

    parts.push(format!("\nSample Data (first {} rows):", SAMPLE_ROWS));
    parts.push(sample_table(ds).trim_end().to_string());

    let numeric = ds.columns_of(ColumnKind::Numeric);
    if !numeric.is_empty() {
        parts.push("\nKey Statistics:".to_string());
        for c in numeric.iter().take(MAX_STATISTIC_COLUMNS) {
            if let Some(s) = stats::describe(&c.numeric_values()) {
                parts.push(format!(
                    "- {}: mean={:.2}, std={}, range=[{:.2}, {:.2}]",
                    c.name,
                    s.mean,
                    fmt_opt(s.std),
                    s.min,
                    s.max
                ));
            }
        }
    }

    let missing = missing_overview(ds);
    if missing.total_missing > 0 {
        parts.push("\nMissing Values:".to_string());
        for m in &missing.columns {
            parts.push(format!("- {}: {} ({:.1}%)", m.column, m.count, m.percentage));
        }
    }

    let patterns: Vec<&str> = profile.patterns.iter().map(|p| p.as_str()).collect();
    parts.push(format!("\nData Patterns: {}", if patterns.is_empty() { "none".to_string() } else { patterns.join(", ") }));
    parts.push(format!("Dataset Type: {}", profile.dataset_type.label()));

    parts.join("\n")
}

pub fn column_detail(column: &Column) -> ColumnDetail {
    let counts = profile::value_counts(column);
    let numeric = match column.kind {
        ColumnKind::Numeric => stats::describe(&column.numeric_values()).map(|s| NumericDetail {
            min: s.min,
            max: s.max,
            mean: s.mean,
            median: s.median,
            std: s.std,
        }),
        _ => None,
    };
    let is_text = column.kind != ColumnKind::Numeric;

    ColumnDetail {
        name: column.name.clone(),
        kind: column.kind,
        total_values: column.len(),
        non_null_values: column.non_missing_count(),
        null_values: column.missing_count(),
        unique_values: counts.len(),
        numeric,
        most_common: if is_text { counts.into_iter().take(5).collect() } else { Vec::new() },
        sample_values: if is_text {
            column.value_keys().into_iter().take(MAX_SAMPLE_VALUES).collect()
        } else {
            Vec::new()
        },
    }
}

pub fn missing_overview(ds: &Dataset) -> MissingOverview {
    let analysis = dashboard::missing_values_analysis(ds);
    MissingOverview {
        total_missing: analysis.total_missing,
        columns: analysis.columns.into_iter().filter(|c| c.count > 0).collect(),
    }
}

fn totals(column: &Column) -> Option<ColumnTotals> {
    let s = stats::describe(&column.numeric_values())?;
    Some(ColumnTotals { column: column.name.clone(), mean: s.mean, median: s.median, sum: s.sum, count: s.count })
}

/// Among the mentioned columns when two of them are numeric, else the strongest pairs of the dataset
fn correlations_for(ds: &Dataset, profile: &DatasetProfile, mentioned_numeric: &[String]) -> Vec<CorrelatedPair> {
    if mentioned_numeric.len() >= 2 {
        return profile::pairwise_correlations(ds, mentioned_numeric);
    }
    let mut pairs = profile::pairwise_correlations(ds, &profile.numeric_columns);
    pairs.sort_by(|a, b| b.correlation.abs().total_cmp(&a.correlation.abs()));
    pairs.truncate(MAX_CORRELATIONS);
    pairs
}

fn compose_answer(a: &AssistantAnswer) -> String {
    let mut lines: Vec<String> = Vec::new();

    if !a.statistics.is_empty() {
        lines.push("Here are the key statistics:".to_string());
        for s in &a.statistics {
            lines.push(format!("- {}: mean={:.2}, median={:.2}", s.column, s.mean, s.median));
        }
    }
    if !a.correlations.is_empty() {
        lines.push("Key correlations found:".to_string());
        for c in a.correlations.iter().take(3) {
            lines.push(format!("- {} and {}: {:.3}", c.var1, c.var2, c.correlation));
        }
    }
    if let Some(m) = &a.missing_analysis {
        if m.total_missing == 0 {
            lines.push("No missing values in the dataset.".to_string());
        } else {
            lines.push(format!("{} missing cells:", m.total_missing));
            for c in &m.columns {
                lines.push(format!("- {}: {} ({:.1}%)", c.column, c.count, c.percentage));
            }
        }
    }
    if !a.outliers.is_empty() {
        let flagged: Vec<&ColumnOutliers> = a.outliers.iter().filter(|o| o.summary.outlier_count > 0).collect();
        if flagged.is_empty() {
            lines.push("No outliers beyond 1.5 x IQR.".to_string());
        } else {
            lines.push("Outliers beyond 1.5 x IQR:".to_string());
            for o in flagged {
                lines.push(format!("- {}: {} value(s)", o.column, o.summary.outlier_count));
            }
        }
    }

    if lines.is_empty() {
        if a.column_info.is_empty() {
            return NOTHING_FOUND.to_string();
        }
        lines.push("Columns mentioned:".to_string());
        for c in &a.column_info {
            lines.push(format!(
                "- {}: {}, {} values, {} unique",
                c.name,
                c.kind.as_str(),
                c.non_null_values,
                c.unique_values
            ));
        }
    }
    lines.join("\n")
}

/// Answers a free-text question with every section its keywords ask for.
/// Never fails: a question matching nothing gets NOTHING_FOUND and the context.
pub fn answer(ds: &Dataset, profile: &DatasetProfile, question: &str) -> AssistantAnswer {
    let q = question.to_lowercase();
    let mentioned_columns = resolve_columns(question, &ds.column_names());
    let mentioned_numeric: Vec<String> = mentioned_columns
        .iter()
        .filter(|m| profile.numeric_columns.contains(m))
        .cloned()
        .collect();
    let numeric_targets: Vec<&Column> = if mentioned_numeric.is_empty() {
        ds.columns_of(ColumnKind::Numeric)
    } else {
        mentioned_numeric.iter().filter_map(|m| ds.column(m)).collect()
    };

    let mut a = AssistantAnswer {
        question: question.to_string(),
        answer: String::new(),
        column_info: mentioned_columns.iter().filter_map(|m| ds.column(m)).map(column_detail).collect(),
        mentioned_columns,
        statistics: Vec::new(),
        distributions: Vec::new(),
        correlations: Vec::new(),
        missing_analysis: None,
        outliers: Vec::new(),
        context: dataset_context(ds, profile),
    };

    if mentions(&q, &STATISTIC_WORDS) {
        a.statistics = numeric_targets.iter().take(MAX_STATISTIC_COLUMNS).filter_map(|c| totals(c)).collect();
    }
    if mentions(&q, &DISTRIBUTION_WORDS) {
        let limit = if mentioned_numeric.is_empty() { MAX_DISTRIBUTION_COLUMNS } else { numeric_targets.len() };
        a.distributions = numeric_targets
            .iter()
            .take(limit)
            .filter_map(|c| dashboard::column_distribution(c))
            .collect();
    }
    if mentions(&q, &CORRELATION_WORDS) {
        a.correlations = correlations_for(ds, profile, &mentioned_numeric);
    }
    if mentions(&q, &MISSING_WORDS) {
        a.missing_analysis = Some(missing_overview(ds));
    }
    if mentions(&q, &OUTLIER_WORDS) {
        a.outliers = dashboard::outlier_detection(ds);
    }

    a.answer = compose_answer(&a);
    crate::debug_note!("assistant answer for '{}': {} line(s)", question, a.answer.lines().count());
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::LoadRequest;

    fn load(cols: &[&str], rows: &[&[&str]]) -> Dataset {
        let req = LoadRequest::new(
            cols.iter().map(|c| c.to_string()).collect(),
            rows.iter().map(|r| r.iter().map(|c| c.to_string()).collect()).collect(),
        );
        Dataset::from_request(&req, 10).unwrap()
    }

    fn sales() -> (Dataset, DatasetProfile) {
        let ds = load(
            &["revenue", "units", "region"],
            &[
                &["100", "1", "north"],
                &["200", "2", "south"],
                &["300", "3", ""],
                &["400", "4", "north"],
                &["500", "NA", "east"],
            ],
        );
        let p = DatasetProfile::build(Some(&ds));
        (ds, p)
    }

    #[test]
    fn context_lists_shape_samples_and_missing_cells() {
        let (ds, p) = sales();
        let ctx = dataset_context(&ds, &p);
        assert!(ctx.starts_with("Dataset Overview:\n- 5 rows and 3 columns"));
        assert!(ctx.contains("- Numeric columns: revenue, units"));
        assert!(ctx.contains("- revenue: mean=300.00, std=158.11, range=[100.00, 500.00]"));
        assert!(ctx.contains("- units: 1 (20.0%)"));
        assert!(ctx.contains("Dataset Type: sales data"));
        assert!(ctx.contains("north"));
        assert!(!ctx.contains("east"));
    }

    #[test]
    fn statistic_words_sum_the_mentioned_column() {
        let (ds, p) = sales();
        let a = answer(&ds, &p, "what is the total revenue");
        assert_eq!(a.mentioned_columns, vec!["revenue".to_string()]);
        assert_eq!(a.statistics.len(), 1);
        assert_eq!(a.statistics[0].sum, 1500.0);
        assert!(a.answer.starts_with("Here are the key statistics:\n- revenue: mean=300.00, median=300.00"));
        assert!(a.correlations.is_empty() && a.missing_analysis.is_none());
    }

    #[test]
    fn missing_and_correlation_sections_stack() {
        let (ds, p) = sales();
        let a = answer(&ds, &p, "any missing values, and how are things related?");
        let m = a.missing_analysis.as_ref().unwrap();
        assert_eq!(m.total_missing, 2);
        assert_eq!(m.columns.iter().map(|c| c.column.as_str()).collect::<Vec<_>>(), vec!["units", "region"]);
        assert_eq!(a.correlations.len(), 1);
        assert!(a.answer.contains("Key correlations found:\n- revenue and units: 1.000"));
        assert!(a.answer.contains("2 missing cells:"));
    }

    #[test]
    fn unmatched_questions_still_carry_context() {
        let (ds, p) = sales();
        let a = answer(&ds, &p, "hello");
        assert_eq!(a.answer, NOTHING_FOUND);
        assert!(a.context.starts_with("Dataset Overview:"));

        let a = answer(&ds, &p, "tell me about region");
        assert!(a.answer.starts_with("Columns mentioned:\n- region: categorical, 4 values, 3 unique"));
        assert_eq!(a.column_info[0].most_common[0].value, "north");
    }

    #[test]
    fn outlier_words_scan_every_numeric_column() {
        let ds = load(&["v"], &[&["1"], &["2"], &["3"], &["4"], &["5"], &["100"]]);
        let p = DatasetProfile::build(Some(&ds));
        let a = answer(&ds, &p, "anything unusual?");
        assert_eq!(a.outliers.len(), 1);
        assert_eq!(a.answer, "Outliers beyond 1.5 x IQR:\n- v: 1 value(s)");
    }
}

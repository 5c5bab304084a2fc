use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::dataset::{ColumnKind, Dataset};
use crate::intent::Intent;
use crate::profile::{self, CorrelatedPair, DatasetProfile, DatasetType};
use crate::stats;

pub const MAX_HIGHLIGHTS: usize = 5;
pub const MAX_VOLATILITY: usize = 3;
pub const MAX_QUERY_SUGGESTIONS: usize = 8;
pub const MAX_RELATED_SUGGESTIONS: usize = 4;
/// share of outliers (percent) from which a column is flagged for treatment
pub const HIGH_OUTLIER_PERCENTAGE: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityEntry {
    pub column: String,
    pub std: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: String,
    pub recommendation: String,
    pub reason: String,
    pub priority: Priority,
}

impl Recommendation {
    fn new(category: &str, recommendation: &str, reason: String, priority: Priority) -> Self {
        Self {
            category: category.to_string(),
            recommendation: recommendation.to_string(),
            reason,
            priority,
        }
    }
}

/// Whole-dataset insight document. Built once per loaded dataset and cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightsDocument {
    pub version: u64,
    pub dataset_shape: String,
    pub completeness_score: f64,
    pub issues_summary: Vec<String>,
    pub top_numeric_volatility: Vec<VolatilityEntry>,
    pub strong_correlations: Vec<CorrelatedPair>,
    pub recommended_next_steps: Vec<String>,
    pub recommendations: Vec<Recommendation>,
    pub dataset_type: DatasetType,
    pub business_context: String,
    pub data_story: String,
    pub narrative: String,
}

pub fn build_insights(version: u64, ds: &Dataset, profile: &DatasetProfile) -> InsightsDocument {
    let highlights = correlation_highlights(ds, profile);
    let doc = InsightsDocument {
        version,
        dataset_shape: format!("{} rows x {} columns", profile.row_count, profile.column_count),
        completeness_score: profile.completeness_score,
        issues_summary: profile.uniformity.categories().iter().map(|c| c.to_string()).collect(),
        top_numeric_volatility: rank_by_volatility(ds).into_iter().take(MAX_VOLATILITY).collect(),
        recommended_next_steps: next_steps(profile),
        recommendations: recommendations(ds, profile, &highlights),
        dataset_type: profile.dataset_type,
        business_context: profile.dataset_type.business_context().to_string(),
        data_story: data_story(profile),
        narrative: insights_narrative(profile, &highlights),
        strong_correlations: highlights,
    };
    crate::debug_note!("insights built for version {}: {} highlights, {} recommendations",
        version, doc.strong_correlations.len(), doc.recommendations.len());
    doc
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Pairs with |r| >= 0.6, strongest first, at most five, r rounded to 3 places
pub fn correlation_highlights(ds: &Dataset, profile: &DatasetProfile) -> Vec<CorrelatedPair> {
    let mut pairs: Vec<CorrelatedPair> = profile::pairwise_correlations(ds, &profile.numeric_columns)
        .into_iter()
        .filter(|p| p.correlation.abs() >= stats::HIGHLIGHT_CORRELATION)
        .map(|p| CorrelatedPair { correlation: round3(p.correlation), ..p })
        .collect();
    pairs.sort_by(|a, b| b.correlation.abs().total_cmp(&a.correlation.abs()));
    pairs.truncate(MAX_HIGHLIGHTS);
    pairs
}

/// Numeric columns with at least two values, largest sample std first
pub fn rank_by_volatility(ds: &Dataset) -> Vec<VolatilityEntry> {
    let mut ranked: Vec<VolatilityEntry> = ds
        .columns_of(ColumnKind::Numeric)
        .iter()
        .filter_map(|c| {
            let values = c.numeric_values();
            Some(VolatilityEntry {
                column: c.name.clone(),
                std: stats::std_deviation(&values)?,
                mean: stats::mean(&values)?,
            })
        })
        .collect();
    ranked.sort_by(|a, b| b.std.total_cmp(&a.std));
    ranked
}

pub fn next_steps(profile: &DatasetProfile) -> Vec<String> {
    let mut steps = Vec::new();
    if profile.duplicate_rows > 0 {
        steps.push("Remove duplicate rows".to_string());
    }
    if profile.columns_with_missing > 0 {
        steps.push("Impute or drop columns with high missing values".to_string());
    }
    if steps.is_empty() {
        steps.push("Deep dive into correlation drivers".to_string());
        steps.push("Segment analysis by key categorical variable".to_string());
    }
    steps
}

/// Structured follow-ups, first occurrence of each (category, recommendation) kept
pub fn recommendations(ds: &Dataset, profile: &DatasetProfile, highlights: &[CorrelatedPair]) -> Vec<Recommendation> {
    let mut recs: Vec<Recommendation> = Vec::new();

    if profile.columns_with_missing > 0 {
        recs.push(Recommendation::new(
            "data_quality",
            "Handle missing values",
            format!("{} columns contain missing data", profile.columns_with_missing),
            Priority::High,
        ));
    }
    if profile.duplicate_rows > 0 {
        recs.push(Recommendation::new(
            "data_quality",
            "Remove duplicate rows",
            format!("{} duplicate rows detected", profile.duplicate_rows),
            Priority::Medium,
        ));
    }

    let flat = profile
        .columns
        .iter()
        .filter(|c| c.kind == ColumnKind::Numeric)
        .filter(|c| match c.numeric.as_ref().and_then(|n| n.std) {
            Some(s) => s == 0.0,
            None => true,
        })
        .count();
    if flat > 0 {
        recs.push(Recommendation::new(
            "feature_engineering",
            "Drop or combine low-variance columns",
            format!("{} numeric columns with zero/undefined variance", flat),
            Priority::Low,
        ));
    }

    if let Some(top) = highlights.first() {
        recs.push(Recommendation::new(
            "relationships",
            "Investigate strongest correlation",
            format!("{} ~ {} (r={})", top.var1, top.var2, top.correlation),
            Priority::Medium,
        ));
    }

    let noisy: Vec<String> = ds
        .columns_of(ColumnKind::Numeric)
        .iter()
        .filter(|c| {
            stats::iqr_outliers(&c.numeric_values())
                .map(|o| o.outlier_percentage > HIGH_OUTLIER_PERCENTAGE)
                .unwrap_or(false)
        })
        .map(|c| c.name.clone())
        .collect();
    if !noisy.is_empty() {
        recs.push(Recommendation::new(
            "outliers",
            "Apply outlier treatment",
            format!("Columns with >5% outliers: {}", noisy.iter().take(5).cloned().collect::<Vec<_>>().join(", ")),
            Priority::Medium,
        ));
    }

    if profile.numeric_columns.len() >= 2 {
        recs.push(Recommendation::new(
            "advanced",
            "Run multivariate analysis / PCA",
            "Multiple numeric columns available".to_string(),
            Priority::Low,
        ));
    }
    if !profile.categorical_columns.is_empty() && !profile.numeric_columns.is_empty() {
        recs.push(Recommendation::new(
            "segmentation",
            "Group numeric metrics by top categorical variable",
            "Mixed data types present".to_string(),
            Priority::Medium,
        ));
    }

    let mut seen: HashSet<(String, String)> = HashSet::new();
    recs.retain(|r| seen.insert((r.category.clone(), r.recommendation.clone())));
    recs
}

pub fn data_story(profile: &DatasetProfile) -> String {
    let mut story = format!(
        "This dataset contains {} records with {} variables. It includes {} numeric and {} categorical variables. ",
        profile.row_count,
        profile.column_count,
        profile.numeric_columns.len(),
        profile.categorical_columns.len()
    );
    let missing_pct = profile.missing_percentage();
    if missing_pct > 5.0 {
        story.push_str(&format!("Note that {:.1}% of values are missing, which may require attention. ", missing_pct));
    } else if missing_pct > 0.0 {
        story.push_str(&format!("The data is relatively complete with only {:.1}% missing values. ", missing_pct));
    } else {
        story.push_str("The data appears to be complete with no missing values. ");
    }
    story.push_str(&format!(
        "Based on the column names and content, this appears to be {}.",
        profile.dataset_type.label()
    ));
    story
}

fn insights_narrative(profile: &DatasetProfile, highlights: &[CorrelatedPair]) -> String {
    let mut parts = vec![
        format!("Dataset has {} rows and {} columns.", profile.row_count, profile.column_count),
        format!("Completeness score {}%.", profile.completeness_score),
    ];
    if let Some(top) = highlights.first() {
        parts.push(format!(
            "Strongest observed correlation: {} vs {} (r={}).",
            top.var1, top.var2, top.correlation
        ));
    }
    let u = &profile.uniformity;
    let flagged: BTreeSet<&str> = u
        .constant
        .iter()
        .chain(u.near_constant.iter())
        .chain(u.low_variance.iter())
        .map(|s| s.as_str())
        .chain(u.duplicate_like.iter().flat_map(|p| [p.var1.as_str(), p.var2.as_str()]))
        .collect();
    if !flagged.is_empty() {
        parts.push(format!("Potential uniformity concerns in {} columns.", flagged.len()));
    }
    parts.join(" ")
}

/// Example questions for the current dataset, at most eight
pub fn suggest_queries(profile: Option<&DatasetProfile>) -> Vec<String> {
    let p = match profile {
        Some(p) => p,
        None => {
            return vec![
                "Upload a dataset to get started".to_string(),
                "Try uploading a CSV file".to_string(),
            ]
        }
    };

    let mut out = Vec::new();
    if let Some(first) = p.numeric_columns.first() {
        out.push(format!("What's the average {}?", first));
        out.push(format!("Show the distribution of {}", first));
        out.push("Analyze correlations between numeric variables".to_string());
    }
    if let Some(cat) = p.categorical_columns.first() {
        out.push(format!("Group data by {}", cat));
    }
    if p.numeric_columns.len() > 1 {
        out.push(format!("Compare {} vs {}", p.numeric_columns[0], p.numeric_columns[1]));
    }
    out.push("Generate a summary of the dataset".to_string());
    out.push("Show trends over time".to_string());
    out.push("Detect any anomalies in the data".to_string());
    out.truncate(MAX_QUERY_SUGGESTIONS);
    out
}

/// Follow-ups for a query: what the question asked about first, then what the
/// recent history has not covered yet. `recent` holds the intents already run, newest last.
pub fn related_suggestions(question: &str, current: Option<Intent>, recent: &[Intent]) -> Vec<String> {
    let q = question.to_lowercase();
    let mut out: Vec<String> = Vec::new();

    if q.contains("correl") {
        out.push("Run a distribution analysis for correlated variables".to_string());
    }
    if q.contains("trend") || q.contains("over time") {
        out.push("Decompose time series to check seasonality".to_string());
    }
    if ["average", "mean", "median"].iter().any(|k| q.contains(k)) {
        out.push("Calculate variance and coefficient of variation for numeric columns".to_string());
    }
    if ["outlier", "anomal", "unusual"].iter().any(|k| q.contains(k)) {
        out.push("Cluster data points to isolate anomalous groups".to_string());
    }

    let covered: HashSet<Intent> = recent.iter().copied().chain(current).map(|i| i.dispatch_target()).collect();
    if !covered.contains(&Intent::Summary) {
        out.push("Generate dataset summary".to_string());
    }
    if !covered.contains(&Intent::Correlation) {
        out.push("View top correlations".to_string());
    }
    if !covered.contains(&Intent::AnomalyDetection) {
        out.push("Detect any anomalies in the data".to_string());
    }

    let mut seen: HashSet<String> = HashSet::new();
    out.retain(|s| seen.insert(s.clone()));
    out.truncate(MAX_RELATED_SUGGESTIONS);
    out
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

    fn sample() -> Dataset {
        load(
            &["a", "b", "kind"],
            &[
                &["1", "2", "x"],
                &["2", "4", "y"],
                &["3", "6", "x"],
                &["4", "8", ""],
                &["1", "2", "x"],
            ],
        )
    }

    #[test]
    fn document_carries_highlights_and_steps() {
        let ds = sample();
        let p = DatasetProfile::build(Some(&ds));
        let doc = build_insights(3, &ds, &p);
        assert_eq!(doc.version, 3);
        assert_eq!(doc.dataset_shape, "5 rows x 3 columns");
        assert_eq!(doc.strong_correlations.len(), 1);
        assert_eq!(doc.strong_correlations[0].correlation, 1.0);
        assert_eq!(
            doc.recommended_next_steps,
            vec!["Remove duplicate rows".to_string(), "Impute or drop columns with high missing values".to_string()]
        );
        assert_eq!(doc.top_numeric_volatility[0].column, "b");
        assert!(doc.narrative.contains("Strongest observed correlation: a vs b (r=1)"));
        assert!(doc.issues_summary.contains(&"duplicate_like".to_string()));
    }

    #[test]
    fn recommendations_are_unique_and_ranked_by_source() {
        let ds = sample();
        let p = DatasetProfile::build(Some(&ds));
        let recs = recommendations(&ds, &p, &correlation_highlights(&ds, &p));
        let names: Vec<&str> = recs.iter().map(|r| r.recommendation.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Handle missing values",
                "Remove duplicate rows",
                "Investigate strongest correlation",
                "Run multivariate analysis / PCA",
                "Group numeric metrics by top categorical variable",
            ]
        );
        assert_eq!(recs[0].priority, Priority::High);
    }

    #[test]
    fn query_suggestions_follow_the_columns() {
        let ds = sample();
        let p = DatasetProfile::build(Some(&ds));
        let s = suggest_queries(Some(&p));
        assert_eq!(s.len(), MAX_QUERY_SUGGESTIONS);
        assert_eq!(s[0], "What's the average a?");
        assert!(s.contains(&"Group data by kind".to_string()));
        assert_eq!(suggest_queries(None)[0], "Upload a dataset to get started");
    }

    #[test]
    fn related_suggestions_skip_what_was_done() {
        let s = related_suggestions("is there a correlation", Some(Intent::Correlation), &[Intent::Summary]);
        assert_eq!(
            s,
            vec![
                "Run a distribution analysis for correlated variables".to_string(),
                "Detect any anomalies in the data".to_string(),
            ]
        );
        let s = related_suggestions("hello", None, &[]);
        assert_eq!(s[0], "Generate dataset summary");
        assert!(s.len() <= MAX_RELATED_SUGGESTIONS);
    }
}

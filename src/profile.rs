use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::dataset::{Column, ColumnKind, Dataset};
use crate::stats;

pub const TOP_VALUES_PER_COLUMN: usize = 5;

pub const GEO_KEYWORDS: [&str; 9] = [
    "country", "state", "city", "region", "latitude", "longitude", "lat", "lng", "zip",
];
pub const FINANCE_KEYWORDS: [&str; 7] = ["price", "cost", "revenue", "profit", "sales", "amount", "value"];

// dataset type is the first group with a keyword inside the joined column names
const DATASET_TYPE_KEYWORDS: [(DatasetType, &[&str]); 5] = [
    (DatasetType::SalesData, &["sales", "revenue", "price", "amount"]),
    (DatasetType::HrData, &["employee", "staff", "hr", "salary"]),
    (DatasetType::WebAnalytics, &["traffic", "visits", "pageviews", "clicks"]),
    (DatasetType::WeatherData, &["temperature", "humidity", "weather"]),
    (DatasetType::FinancialData, &["stock", "market", "trading"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Identifier,
    Metric,
    Dimension,
    Temporal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataPattern {
    TimeSeries,
    HasIdentifiers,
    Geographic,
    Financial,
}

impl DataPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataPattern::TimeSeries => "time_series",
            DataPattern::HasIdentifiers => "has_identifiers",
            DataPattern::Geographic => "geographic",
            DataPattern::Financial => "financial",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetType {
    SalesData,
    HrData,
    WebAnalytics,
    WeatherData,
    FinancialData,
    GeneralData,
}

impl DatasetType {
    pub fn label(&self) -> &'static str {
        match self {
            DatasetType::SalesData => "sales data",
            DatasetType::HrData => "hr data",
            DatasetType::WebAnalytics => "web analytics",
            DatasetType::WeatherData => "weather data",
            DatasetType::FinancialData => "financial data",
            DatasetType::GeneralData => "general data",
        }
    }

    pub fn business_context(&self) -> &'static str {
        match self {
            DatasetType::SalesData => "This appears to be sales or revenue data, useful for understanding business performance and customer behavior.",
            DatasetType::HrData => "This looks like HR or employee data, suitable for workforce analytics and performance evaluation.",
            DatasetType::WebAnalytics => "This seems to be web analytics data, helpful for understanding user behavior and site performance.",
            DatasetType::FinancialData => "This appears to be financial market data, useful for investment analysis and market research.",
            DatasetType::WeatherData => "This looks like weather or environmental data, suitable for climate analysis and forecasting.",
            DatasetType::GeneralData => "General business data suitable for various analytical purposes.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericProfile {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: Option<f64>,
    pub variance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub kind: ColumnKind,
    pub role: ColumnRole,
    pub non_missing: usize,
    pub missing: usize,
    pub unique: usize,
    pub numeric: Option<NumericProfile>,
    /// Most frequent values, categorical and temporal columns only
    pub top_values: Vec<ValueCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedPair {
    pub var1: String,
    pub var2: String,
    pub correlation: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UniformityIssues {
    pub constant: Vec<String>,
    pub near_constant: Vec<String>,
    pub low_variance: Vec<String>,
    pub duplicate_like: Vec<CorrelatedPair>,
}

impl UniformityIssues {
    pub fn is_empty(&self) -> bool {
        self.constant.is_empty()
            && self.near_constant.is_empty()
            && self.low_variance.is_empty()
            && self.duplicate_like.is_empty()
    }

    /// Names of the issue categories that have at least one entry
    pub fn categories(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if !self.constant.is_empty() {
            out.push("constant");
        }
        if !self.near_constant.is_empty() {
            out.push("near_constant");
        }
        if !self.low_variance.is_empty() {
            out.push("low_variance");
        }
        if !self.duplicate_like.is_empty() {
            out.push("duplicate_like");
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<ColumnProfile>,
    pub numeric_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
    pub temporal_columns: Vec<String>,
    pub missing_cells: usize,
    /// 100 * (1 - missing / total), 2 decimals
    pub completeness_score: f64,
    pub duplicate_rows: usize,
    pub columns_with_missing: usize,
    pub patterns: Vec<DataPattern>,
    pub dataset_type: DatasetType,
    pub uniformity: UniformityIssues,
    pub key_relationships: Vec<CorrelatedPair>,
}

impl Default for DatasetProfile {
    fn default() -> Self {
        Self::empty()
    }
}

impl DatasetProfile {
    pub fn empty() -> Self {
        Self {
            row_count: 0,
            column_count: 0,
            columns: Vec::new(),
            numeric_columns: Vec::new(),
            categorical_columns: Vec::new(),
            temporal_columns: Vec::new(),
            missing_cells: 0,
            completeness_score: 100.0,
            duplicate_rows: 0,
            columns_with_missing: 0,
            patterns: Vec::new(),
            dataset_type: DatasetType::GeneralData,
            uniformity: UniformityIssues::default(),
            key_relationships: Vec::new(),
        }
    }

    pub fn build(dataset: Option<&Dataset>) -> Self {
        let ds = match dataset {
            Some(ds) => ds,
            None => return Self::empty(),
        };

        let columns: Vec<ColumnProfile> = ds.columns().iter().map(profile_column).collect();
        let numeric_columns = ds.names_of(ColumnKind::Numeric);
        let categorical_columns = ds.names_of(ColumnKind::Categorical);
        let temporal_columns = ds.names_of(ColumnKind::Temporal);

        let total = ds.total_cells();
        let missing_cells = ds.missing_cells();
        let completeness_score = if total == 0 {
            100.0
        } else {
            round2(100.0 * (1.0 - missing_cells as f64 / total as f64))
        };

        let pairs = pairwise_correlations(ds, &numeric_columns);
        let mut uniformity = UniformityIssues::default();
        for cp in &columns {
            if cp.unique == 1 {
                uniformity.constant.push(cp.name.clone());
            } else if cp.unique > 1 {
                let top = top_share(ds.column(&cp.name));
                if top > stats::NEAR_CONSTANT_SHARE {
                    uniformity.near_constant.push(cp.name.clone());
                }
            }
            if let Some(var) = cp.numeric.as_ref().and_then(|n| n.variance) {
                if var < stats::LOW_VARIANCE {
                    uniformity.low_variance.push(cp.name.clone());
                }
            }
        }
        uniformity.duplicate_like = pairs
            .iter()
            .filter(|p| p.correlation.abs() > stats::DUPLICATE_CORRELATION)
            .cloned()
            .collect();
        let key_relationships: Vec<CorrelatedPair> = pairs
            .iter()
            .filter(|p| p.correlation.abs() >= stats::RELATIONSHIP_CORRELATION)
            .cloned()
            .collect();

        let patterns = detect_patterns(ds, !temporal_columns.is_empty());
        let dataset_type = infer_dataset_type(&ds.column_names());

        crate::debug_note!(
            "profile built: {} rows, {} columns, completeness {}, type {:?}",
            ds.row_count(),
            ds.column_count(),
            completeness_score,
            dataset_type
        );

        Self {
            row_count: ds.row_count(),
            column_count: ds.column_count(),
            columns_with_missing: columns.iter().filter(|c| c.missing > 0).count(),
            columns,
            numeric_columns,
            categorical_columns,
            temporal_columns,
            missing_cells,
            completeness_score,
            duplicate_rows: ds.duplicate_rows(),
            patterns,
            dataset_type,
            uniformity,
            key_relationships,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_pattern(&self, p: DataPattern) -> bool {
        self.patterns.contains(&p)
    }

    pub fn has_temporal(&self) -> bool {
        !self.temporal_columns.is_empty() || self.has_pattern(DataPattern::TimeSeries)
    }

    pub fn missing_percentage(&self) -> f64 {
        let total = self.row_count * self.column_count;
        if total == 0 {
            0.0
        } else {
            self.missing_cells as f64 / total as f64 * 100.0
        }
    }

    /// One paragraph handed back to the caller right after a load
    pub fn summary_text(&self) -> String {
        let mut parts: Vec<String> = vec![format!(
            "Dataset with {} rows and {} columns",
            self.row_count, self.column_count
        )];
        if !self.numeric_columns.is_empty() {
            parts.push(format!("{} numeric columns for quantitative analysis", self.numeric_columns.len()));
        }
        if !self.categorical_columns.is_empty() {
            parts.push(format!("{} categorical columns for segmentation", self.categorical_columns.len()));
        }
        if !self.temporal_columns.is_empty() {
            parts.push(format!("{} date columns for time-based analysis", self.temporal_columns.len()));
        }
        let missing_pct = self.missing_percentage();
        if missing_pct > 10.0 {
            parts.push(format!("{:.1}% missing values detected", missing_pct));
        } else if missing_pct > 0.0 {
            parts.push(format!("Good data quality ({:.1}% missing)", missing_pct));
        } else {
            parts.push("Complete dataset (no missing values)".to_string());
        }
        format!("{}.", parts.join(". "))
    }
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Pearson r for every pair of the given numeric columns, pairwise-complete.
/// Pairs whose r is undefined (constant side, fewer than two shared rows) are left out.
pub fn pairwise_correlations(ds: &Dataset, names: &[String]) -> Vec<CorrelatedPair> {
    let cols: Vec<(&String, &[Option<f64>])> = names
        .iter()
        .filter_map(|n| ds.column(n).and_then(|c| c.numeric()).map(|v| (n, v)))
        .collect();

    let mut out = Vec::new();
    for i in 0..cols.len() {
        for j in (i + 1)..cols.len() {
            let (x, y) = stats::pairwise_complete(cols[i].1, cols[j].1);
            if let Some(r) = stats::pearson_correlation_2v(&x, &y) {
                out.push(CorrelatedPair {
                    var1: cols[i].0.clone(),
                    var2: cols[j].0.clone(),
                    correlation: r,
                });
            }
        }
    }
    out
}

/// Frequency table, most common first; ties keep first appearance order
pub fn value_counts(column: &Column) -> Vec<ValueCount> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for key in column.value_keys() {
        let e = counts.entry(key.clone()).or_insert(0);
        if *e == 0 {
            order.push(key);
        }
        *e += 1;
    }
    let mut out: Vec<ValueCount> = order
        .into_iter()
        .map(|value| {
            let count = counts.get(&value).copied().unwrap_or(0);
            ValueCount { value, count }
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count));
    out
}

pub fn is_identifier_name(name: &str) -> bool {
    let n = name.to_lowercase();
    n == "id" || n.ends_with("_id") || n.ends_with(" id")
}

fn profile_column(col: &Column) -> ColumnProfile {
    let counts = value_counts(col);
    let non_missing = col.non_missing_count();
    let unique = counts.len();

    let numeric = match col.kind {
        ColumnKind::Numeric => {
            let values = col.numeric_values();
            stats::min_max(&values).and_then(|(min, max)| {
                let mean = stats::mean(&values)?;
                let variance = stats::variance(&values);
                Some(NumericProfile { min, max, mean, std: variance.map(|v| v.sqrt()), variance })
            })
        }
        _ => None,
    };

    let role = if is_identifier_name(&col.name)
        || (col.kind == ColumnKind::Categorical && non_missing >= 2 && unique == non_missing)
    {
        ColumnRole::Identifier
    } else {
        match col.kind {
            ColumnKind::Temporal => ColumnRole::Temporal,
            ColumnKind::Numeric => ColumnRole::Metric,
            ColumnKind::Categorical => ColumnRole::Dimension,
        }
    };

    let top_values = match col.kind {
        ColumnKind::Numeric => Vec::new(),
        _ => counts.into_iter().take(TOP_VALUES_PER_COLUMN).collect(),
    };

    ColumnProfile {
        name: col.name.clone(),
        kind: col.kind,
        role,
        non_missing,
        missing: col.missing_count(),
        unique,
        numeric,
        top_values,
    }
}

fn top_share(col: Option<&Column>) -> f64 {
    let col = match col {
        Some(c) => c,
        None => return 0.0,
    };
    let non_missing = col.non_missing_count();
    if non_missing == 0 {
        return 0.0;
    }
    value_counts(col)
        .first()
        .map(|vc| vc.count as f64 / non_missing as f64)
        .unwrap_or(0.0)
}

fn detect_patterns(ds: &Dataset, has_temporal: bool) -> Vec<DataPattern> {
    let names: Vec<String> = ds.column_names().iter().map(|n| n.to_lowercase()).collect();
    let mut patterns = Vec::new();
    if has_temporal {
        patterns.push(DataPattern::TimeSeries);
    }
    if names.iter().any(|n| n.contains("_id") || n == "id") {
        patterns.push(DataPattern::HasIdentifiers);
    }
    if names.iter().any(|n| GEO_KEYWORDS.iter().any(|k| n.contains(k))) {
        patterns.push(DataPattern::Geographic);
    }
    if names.iter().any(|n| FINANCE_KEYWORDS.iter().any(|k| n.contains(k))) {
        patterns.push(DataPattern::Financial);
    }
    patterns
}

pub fn infer_dataset_type(column_names: &[&str]) -> DatasetType {
    let joined = column_names
        .iter()
        .map(|n| n.to_lowercase())
        .collect::<Vec<String>>()
        .join(" ");
    DATASET_TYPE_KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| joined.contains(w)))
        .map(|(t, _)| *t)
        .unwrap_or(DatasetType::GeneralData)
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

    #[test]
    fn absent_dataset_gives_empty_profile() {
        let p = DatasetProfile::build(None);
        assert_eq!(p.column_count, 0);
        assert_eq!(p.completeness_score, 100.0);
        assert!(p.uniformity.is_empty());
    }

    #[test]
    fn completeness_and_roles() {
        let ds = load(
            &["customer_id", "price", "region", "day"],
            &[
                &["1", "10", "north", "2024-01-01"],
                &["2", "", "north", "2024-01-02"],
                &["3", "30", "south", "2024-01-03"],
            ],
        );
        let p = DatasetProfile::build(Some(&ds));
        assert_eq!(p.completeness_score, 91.67);
        assert_eq!(p.column("customer_id").unwrap().role, ColumnRole::Identifier);
        assert_eq!(p.column("price").unwrap().role, ColumnRole::Metric);
        assert_eq!(p.column("region").unwrap().role, ColumnRole::Dimension);
        assert_eq!(p.column("day").unwrap().role, ColumnRole::Temporal);
        assert_eq!(p.columns_with_missing, 1);
        assert_eq!(
            p.patterns,
            vec![DataPattern::TimeSeries, DataPattern::HasIdentifiers, DataPattern::Geographic, DataPattern::Financial]
        );
        assert_eq!(p.dataset_type, DatasetType::SalesData);
        let region = p.column("region").unwrap();
        assert_eq!(region.top_values[0], ValueCount { value: "north".into(), count: 2 });
    }

    #[test]
    fn uniformity_issues_are_detected() {
        let mut rows: Vec<Vec<String>> = Vec::new();
        for i in 0..25 {
            rows.push(vec![
                "7".to_string(),
                if i == 0 { "b".to_string() } else { "a".to_string() },
                format!("{}", i),
                format!("{}", i * 3),
                format!("{}", 1.0 + (i % 2) as f64 * 0.01),
            ]);
        }
        let req = LoadRequest::new(
            vec!["flat".into(), "mostly".into(), "x".into(), "x3".into(), "tiny".into()],
            rows,
        );
        let ds = Dataset::from_request(&req, 10).unwrap();
        let p = DatasetProfile::build(Some(&ds));
        assert_eq!(p.uniformity.constant, vec!["flat".to_string()]);
        assert_eq!(p.uniformity.near_constant, vec!["mostly".to_string()]);
        assert!(p.uniformity.low_variance.contains(&"tiny".to_string()));
        assert!(p.uniformity.low_variance.contains(&"flat".to_string()));
        assert_eq!(p.uniformity.duplicate_like.len(), 1);
        assert_eq!(p.uniformity.duplicate_like[0].var1, "x");
        assert_eq!(p.uniformity.duplicate_like[0].var2, "x3");
        assert!(p.key_relationships.iter().any(|k| k.var1 == "x" && k.var2 == "x3"));
    }

    #[test]
    fn dataset_type_follows_keyword_order() {
        assert_eq!(infer_dataset_type(&["Employee", "Salary"]), DatasetType::HrData);
        assert_eq!(infer_dataset_type(&["stock", "price"]), DatasetType::SalesData);
        assert_eq!(infer_dataset_type(&["a", "b"]), DatasetType::GeneralData);
    }

    #[test]
    fn all_distinct_text_column_is_an_identifier() {
        let ds = load(&["name", "score"], &[&["ann", "1"], &["bob", "2"]]);
        let p = DatasetProfile::build(Some(&ds));
        assert_eq!(p.column("name").unwrap().role, ColumnRole::Identifier);
    }
}

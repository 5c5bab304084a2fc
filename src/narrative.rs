use crate::analysis::{AnalysisResult, Statistics};
use crate::dataset::format_number;
use crate::stats::SKEW_SYMMETRY;

pub const FALLBACK_NARRATIVE: &str = "Analysis completed with no critical anomalies detected.";
pub const MAX_SENTENCES: usize = 4;

/// Short plain-language bullets for a result. Always at least one sentence.
pub fn compose(result: &AnalysisResult) -> Vec<String> {
    let mut out: Vec<String> = match &result.statistics {
        Statistics::Distribution { columns } => columns
            .iter()
            .filter_map(|d| {
                let s = d.skewness?;
                let shape = if s > SKEW_SYMMETRY {
                    "right-skewed (a few large values pull the mean up)"
                } else if s < -SKEW_SYMMETRY {
                    "left-skewed (a few small values pull the mean down)"
                } else {
                    "roughly symmetric"
                };
                Some(format!("{} is {}, skewness {:.2}.", d.column, shape, s))
            })
            .chain(columns.iter().filter_map(|d| {
                let o = d.outliers.as_ref().filter(|o| o.outlier_count > 0)?;
                Some(format!("{} has {} value(s) outside the 1.5 x IQR fences.", d.column, o.outlier_count))
            }))
            .collect(),

        Statistics::Correlation { strong_correlations, highest_negative, .. } => {
            let mut v = Vec::new();
            if let Some(top) = strong_correlations.first() {
                v.push(format!(
                    "{} strong correlation(s) found, the largest |r| is {:.2}.",
                    strong_correlations.len(),
                    top.correlation.abs()
                ));
                v.push(format!("There is a {}.", top.interpretation()));
            } else {
                v.push("No pair of numeric columns moves together strongly.".to_string());
            }
            if let Some(neg) = highest_negative.as_ref().filter(|n| n.strong) {
                if strong_correlations.first().map(|t| t != neg).unwrap_or(true) {
                    v.push(format!("{} tends to fall as {} rises (r = {:.2}).", neg.var2, neg.var1, neg.correlation));
                }
            }
            v
        }

        Statistics::Averages { columns } => {
            let mut v = Vec::new();
            if let Some(best) = columns.iter().max_by(|a, b| a.mean.total_cmp(&b.mean)) {
                v.push(format!("{} has the highest mean at {:.2}.", best.column, best.mean));
            }
            for c in columns.iter().filter(|c| c.mean != 0.0 && (c.mean - c.median).abs() / c.mean.abs() > 0.25).take(2) {
                v.push(format!(
                    "The mean of {} ({:.2}) is far from its median ({:.2}), look for extreme values.",
                    c.column, c.mean, c.median
                ));
            }
            v
        }

        Statistics::Trend { column, slope, direction, r_squared, x_axis, .. } => {
            let unit = if x_axis == "row_index" { "row" } else { "day" };
            let mut v = vec![format!("{} is {} with a slope of {:.4} per {}.", column, direction, slope, unit)];
            if let Some(r2) = r_squared {
                v.push(format!("A straight line explains {:.0}% of the variation.", r2 * 100.0));
            }
            v
        }

        Statistics::Breakdown { column, dominant, dominant_share, distinct, metric, metric_means, .. } => {
            let mut v = Vec::new();
            if let Some(d) = dominant {
                v.push(format!("'{}' is the dominant {} at {:.1}% of values.", d.value, column, dominant_share));
            }
            v.push(format!("{} has {} distinct value(s).", column, distinct));
            if let (Some(m), Some(best)) = (metric, metric_means.iter().max_by(|a, b| a.mean.total_cmp(&b.mean))) {
                v.push(format!("Average {} is highest for '{}' ({:.2}).", m, best.group, best.mean));
            }
            v
        }

        Statistics::Anomalies { columns, total_outliers, .. } => {
            if *total_outliers == 0 {
                Vec::new()
            } else {
                columns
                    .iter()
                    .filter(|c| c.summary.outlier_count > 0)
                    .take(MAX_SENTENCES)
                    .map(|c| {
                        format!(
                            "{}: {} outlier(s) ({:.1}% of values) outside [{:.2}, {:.2}].",
                            c.column,
                            c.summary.outlier_count,
                            c.summary.outlier_percentage,
                            c.summary.lower_bound,
                            c.summary.upper_bound
                        )
                    })
                    .collect()
            }
        }

        Statistics::Extremes { column, values, .. } => {
            let top = matches!(result.analysis_type, crate::intent::Intent::TopValues);
            values
                .first()
                .map(|head| {
                    vec![format!(
                        "The {} {} is {}{}.",
                        if top { "highest" } else { "lowest" },
                        column,
                        format_number(head.value),
                        head.label.as_ref().map(|l| format!(" ({})", l)).unwrap_or_default()
                    )]
                })
                .unwrap_or_default()
        }

        Statistics::Comparison { target, entries, group_by } => match (entries.first(), entries.last()) {
            (Some(first), Some(last)) if entries.len() > 1 => vec![format!(
                "{} leads on {} with a mean of {:.2}, {:.2} above the lowest{}.",
                first.label,
                target,
                first.mean,
                first.mean - last.mean,
                group_by.as_ref().map(|g| format!(" {}", g)).unwrap_or_default()
            )],
            (Some(first), _) => vec![format!("{} averages {:.2}.", first.label, first.mean)],
            _ => Vec::new(),
        },

        Statistics::Summary { rows, columns, completeness_score, duplicate_rows, .. } => {
            let mut v = vec![format!(
                "The dataset has {} rows and {} columns with a completeness score of {}%.",
                rows, columns, completeness_score
            )];
            if *duplicate_rows > 0 {
                v.push(format!("{} duplicate row(s) were found.", duplicate_rows));
            }
            v
        }
    };

    out.truncate(MAX_SENTENCES);
    if out.is_empty() {
        out.push(FALLBACK_NARRATIVE.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisResult, ColumnAverage, DistributionStats, Statistics};
    use crate::intent::Intent;
    use std::collections::BTreeMap;

    fn wrap(intent: Intent, statistics: Statistics) -> AnalysisResult {
        AnalysisResult {
            analysis_type: intent,
            parameters: BTreeMap::new(),
            statistics,
            chart_spec: None,
            insight_text: String::new(),
            narrative: Vec::new(),
            related_suggestions: Vec::new(),
        }
    }

    fn dist(column: &str, skew: Option<f64>) -> DistributionStats {
        DistributionStats {
            column: column.into(),
            count: 10,
            mean: 1.0,
            median: 1.0,
            std: Some(1.0),
            min: 0.0,
            max: 2.0,
            skewness: skew,
            kurtosis: Some(0.0),
            percentiles: Vec::new(),
            shape: "unknown",
            outliers: None,
        }
    }

    #[test]
    fn skew_direction_uses_half_thresholds() {
        let r = wrap(
            Intent::Distribution,
            Statistics::Distribution { columns: vec![dist("a", Some(0.6)), dist("b", Some(-0.7)), dist("c", Some(0.4))] },
        );
        let n = compose(&r);
        assert!(n[0].contains("right-skewed"));
        assert!(n[1].contains("left-skewed"));
        assert!(n[2].contains("roughly symmetric"));
    }

    #[test]
    fn nothing_to_say_falls_back() {
        let r = wrap(Intent::Distribution, Statistics::Distribution { columns: vec![dist("a", None)] });
        assert_eq!(compose(&r), vec![FALLBACK_NARRATIVE.to_string()]);
    }

    #[test]
    fn averages_name_the_highest_mean() {
        let r = wrap(
            Intent::Averages,
            Statistics::Averages {
                columns: vec![
                    ColumnAverage { column: "a".into(), mean: 2.0, median: 2.0, sum: 4.0, count: 2, std: None },
                    ColumnAverage { column: "b".into(), mean: 9.0, median: 9.0, sum: 18.0, count: 2, std: None },
                ],
            },
        );
        assert_eq!(compose(&r), vec!["b has the highest mean at 9.00.".to_string()]);
    }

    #[test]
    fn never_more_than_four_sentences() {
        let cols = (0..6).map(|i| dist(&format!("c{}", i), Some(1.0))).collect();
        let r = wrap(Intent::Distribution, Statistics::Distribution { columns: cols });
        assert_eq!(compose(&r).len(), MAX_SENTENCES);
    }
}

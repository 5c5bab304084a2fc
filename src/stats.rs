use ndarray::{Array1, Array2, Axis};
use ndarray_stats::interpolate::Linear;
use ndarray_stats::{CorrelationExt, QuantileExt};
use noisy_float::types::N64;
use serde::{Deserialize, Serialize};

/// |r| from which a pair is reported by a correlation scan
pub const STRONG_CORRELATION: f64 = 0.5;
/// |r| from which a pair makes it to the comprehensive insights highlights
pub const HIGHLIGHT_CORRELATION: f64 = 0.6;
/// |r| from which two numeric columns are treated as possibly redundant
pub const RELATIONSHIP_CORRELATION: f64 = 0.7;
/// |r| above which two numeric columns look like copies of each other
pub const DUPLICATE_CORRELATION: f64 = 0.999;

pub const IQR_FENCE: f64 = 1.5;
pub const MIN_OUTLIER_SAMPLES: usize = 5;
pub const MIN_TREND_POINTS: usize = 3;
pub const LOW_VARIANCE: f64 = 0.01;
pub const NEAR_CONSTANT_SHARE: f64 = 0.95;
/// |skewness| below this is reported as symmetric
pub const SKEW_SYMMETRY: f64 = 0.5;

pub fn mean(data: &[f64]) -> Option<f64> {
    let sum: f64 = data.iter().sum::<f64>();
    let count: usize = data.len();

    match count {
        positive if positive > 0 => Some(sum / count as f64),
        _ => None,
    }
}

/// Sample variance (ddof = 1)
pub fn variance(data: &[f64]) -> Option<f64> {
    if data.len() < 2 {
        return None;
    }
    let arr = Array1::from(data.to_vec());
    Some(arr.var(1.0))
}

/// Sample standard deviation (ddof = 1)
pub fn std_deviation(data: &[f64]) -> Option<f64> {
    variance(data).map(|v| v.sqrt())
}

/// Quantile with linear interpolation between closest ranks.
/// Callers only pass finite values (the dataset refuses NaN/inf as numbers).
pub fn quantile(data: &[f64], q: f64) -> Option<f64> {
    if data.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut arr_n64: Array1<N64> = data.iter().map(|v| N64::new(*v)).collect();
    arr_n64
        .quantile_axis_mut(Axis(0), N64::new(q), &Linear)
        .ok()
        .map(|a| a.into_scalar().raw())
}

pub fn median(data: &[f64]) -> Option<f64> {
    quantile(data, 0.5)
}

pub fn min_max(data: &[f64]) -> Option<(f64, f64)> {
    if data.is_empty() {
        return None;
    }
    let arr: Array1<N64> = data.iter().map(|v| N64::new(*v)).collect();
    let min = arr.min().ok()?.raw();
    let max = arr.max().ok()?.raw();
    Some((min, max))
}

fn central_moments(data: &[f64]) -> Option<(f64, f64, f64, f64)> {
    let n = data.len() as f64;
    let m = mean(data)?;
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for v in data {
        let d = v - m;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    Some((n, m2 / n, m3 / n, m4 / n))
}

/// Adjusted Fisher-Pearson skewness (G1). Needs 3 values.
pub fn skewness(data: &[f64]) -> Option<f64> {
    if data.len() < 3 {
        return None;
    }
    let (n, m2, m3, _) = central_moments(data)?;
    if m2 <= f64::EPSILON * f64::EPSILON {
        return Some(0.0);
    }
    let g1 = m3 / m2.powf(1.5);
    Some(g1 * (n * (n - 1.0)).sqrt() / (n - 2.0))
}

/// Bias corrected excess kurtosis (G2). Needs 4 values.
pub fn excess_kurtosis(data: &[f64]) -> Option<f64> {
    if data.len() < 4 {
        return None;
    }
    let (n, m2, _, m4) = central_moments(data)?;
    if m2 <= f64::EPSILON * f64::EPSILON {
        return Some(0.0);
    }
    let g2 = m4 / (m2 * m2) - 3.0;
    Some(((n + 1.0) * g2 + 6.0) * (n - 1.0) / ((n - 2.0) * (n - 3.0)))
}

//Calculate pearson correlation of 2 vectors and return simple result
pub fn pearson_correlation_2v(vec1: &[f64], vec2: &[f64]) -> Option<f64> {
    if vec1.len() != vec2.len() || vec1.len() < 2 {
        return None;
    }
    let rows: usize = 2;
    let cols: usize = vec1.len();

    let mut data: Vec<f64> = Vec::with_capacity(rows * cols);
    data.extend_from_slice(vec1);
    data.extend_from_slice(vec2);

    let a: Array2<f64> = Array2::from_shape_vec((rows, cols), data).ok()?;
    let crr = a.pearson_correlation().ok()?;
    let r = crr.row(0)[1];

    if r.is_finite() {
        Some(r.clamp(-1.0, 1.0))
    } else {
        None
    }
}

/// Keeps only rows where both sides are present, like a pairwise-complete correlation
pub fn pairwise_complete(x: &[Option<f64>], y: &[Option<f64>]) -> (Vec<f64>, Vec<f64>) {
    x.iter()
        .zip(y.iter())
        .filter_map(|(a, b)| match (a, b) {
            (Some(a), Some(b)) => Some((*a, *b)),
            _ => None,
        })
        .unzip()
}

pub fn correlation_strength(r: f64) -> &'static str {
    let a = r.abs();
    if a > RELATIONSHIP_CORRELATION {
        "strong"
    } else if a > 0.4 {
        "moderate"
    } else {
        "weak"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: Option<f64>,
    pub points: usize,
}

/// First degree least squares fit of y on x
pub fn linear_fit(x: &[f64], y: &[f64]) -> Option<LinearFit> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let xa = Array1::from(x.to_vec());
    let ya = Array1::from(y.to_vec());
    let x_mean = xa.mean()?;
    let y_mean = ya.mean()?;
    let dx = &xa - x_mean;
    let dy = &ya - y_mean;
    let sxx = dx.dot(&dx);
    if sxx == 0.0 {
        return None;
    }
    let slope = dx.dot(&dy) / sxx;
    let intercept = y_mean - slope * x_mean;
    let syy = dy.dot(&dy);
    let r_squared = if syy > 0.0 {
        let sxy = dx.dot(&dy);
        Some((sxy * sxy) / (sxx * syy))
    } else {
        None
    };
    Some(LinearFit { slope, intercept, r_squared, points: x.len() })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierSummary {
    pub count: usize,
    pub outlier_count: usize,
    pub outlier_percentage: f64,
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// First outliers in data order, capped at 10
    pub outlier_values: Vec<f64>,
}

/// 1.5 x IQR fences. Columns with fewer than MIN_OUTLIER_SAMPLES values are not judged.
pub fn iqr_outliers(data: &[f64]) -> Option<OutlierSummary> {
    if data.len() < MIN_OUTLIER_SAMPLES {
        return None;
    }
    let q1 = quantile(data, 0.25)?;
    let q3 = quantile(data, 0.75)?;
    let iqr = q3 - q1;
    let lower_bound = q1 - IQR_FENCE * iqr;
    let upper_bound = q3 + IQR_FENCE * iqr;

    let outliers: Vec<f64> = data
        .iter()
        .copied()
        .filter(|v| *v < lower_bound || *v > upper_bound)
        .collect();

    Some(OutlierSummary {
        count: data.len(),
        outlier_count: outliers.len(),
        outlier_percentage: outliers.len() as f64 / data.len() as f64 * 100.0,
        q1,
        q3,
        iqr,
        lower_bound,
        upper_bound,
        outlier_values: outliers.into_iter().take(10).collect(),
    })
}

/// Shannon entropy of a frequency table
pub fn shannon_diversity(counts: &[usize]) -> f64 {
    let total: usize = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }
    counts
        .iter()
        .filter(|c| **c > 0)
        .map(|c| {
            let p = *c as f64 / total as f64;
            -p * p.ln()
        })
        .sum()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub median: f64,
    pub std: Option<f64>,
    pub variance: Option<f64>,
    pub min: f64,
    pub max: f64,
    pub q25: f64,
    pub q75: f64,
    pub iqr: f64,
    pub range: f64,
    pub skewness: Option<f64>,
    pub kurtosis: Option<f64>,
    /// std / mean * 100, absent when the mean is zero or std is unknown
    pub coefficient_of_variation: Option<f64>,
}

/// Everything the routines usually need about one numeric column, in one go.
/// None for an empty column - callers skip it.
pub fn describe(data: &[f64]) -> Option<NumericSummary> {
    if data.is_empty() {
        return None;
    }
    let mean = mean(data)?;
    let median = median(data)?;
    let (min, max) = min_max(data)?;
    let q25 = quantile(data, 0.25)?;
    let q75 = quantile(data, 0.75)?;
    let variance = variance(data);
    let std = variance.map(|v| v.sqrt());
    let coefficient_of_variation = match std {
        Some(s) if mean != 0.0 => Some(s / mean * 100.0),
        _ => None,
    };

    Some(NumericSummary {
        count: data.len(),
        sum: data.iter().sum(),
        mean,
        median,
        std,
        variance,
        min,
        max,
        q25,
        q75,
        iqr: q75 - q25,
        range: max - min,
        skewness: skewness(data),
        kurtosis: excess_kurtosis(data),
        coefficient_of_variation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn quantiles_interpolate_linearly() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 100.0];
        assert!(close(quantile(&data, 0.25).unwrap(), 2.25));
        assert!(close(quantile(&data, 0.75).unwrap(), 4.75));
        assert!(close(median(&data).unwrap(), 3.5));
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn sample_std_uses_ddof_one() {
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        // population std is 2.0, sample std is sqrt(32/7)
        assert!(close(std_deviation(&data).unwrap(), (32.0f64 / 7.0).sqrt()));
        assert_eq!(std_deviation(&[1.0]), None);
    }

    #[test]
    fn skew_and_kurtosis_match_bias_corrected_formulas() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 100.0];
        let s = skewness(&data).unwrap();
        let k = excess_kurtosis(&data).unwrap();
        assert!((s - 2.44247).abs() < 1e-4, "skew was {}", s);
        assert!((k - 5.97328).abs() < 1e-4, "kurtosis was {}", k);
        assert_eq!(skewness(&[1.0, 2.0]), None);
        assert_eq!(skewness(&[3.0, 3.0, 3.0]), Some(0.0));
    }

    #[test]
    fn iqr_rule_flags_only_the_far_value() {
        let out = iqr_outliers(&[1.0, 2.0, 3.0, 4.0, 5.0, 100.0]).unwrap();
        assert_eq!(out.outlier_count, 1);
        assert_eq!(out.outlier_values, vec![100.0]);
        assert!(close(out.upper_bound, 8.5));
        assert!(close(out.lower_bound, -1.5));
        assert!(iqr_outliers(&[1.0, 2.0, 3.0, 4.0]).is_none());
    }

    #[test]
    fn pearson_handles_exact_and_degenerate_inputs() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [2.0, 4.0, 6.0, 8.0];
        assert!((pearson_correlation_2v(&a, &b).unwrap() - 1.0).abs() < 1e-9);
        let c = [8.0, 6.0, 4.0, 2.0];
        assert!((pearson_correlation_2v(&a, &c).unwrap() + 1.0).abs() < 1e-9);
        assert_eq!(pearson_correlation_2v(&a, &[5.0, 5.0, 5.0, 5.0]), None);
        assert_eq!(pearson_correlation_2v(&a[..1], &b[..1]), None);
    }

    #[test]
    fn pairwise_complete_drops_rows_with_a_gap() {
        let (x, y) = pairwise_complete(&[Some(1.0), None, Some(3.0)], &[Some(2.0), Some(5.0), None]);
        assert_eq!(x, vec![1.0]);
        assert_eq!(y, vec![2.0]);
    }

    #[test]
    fn linear_fit_recovers_a_line() {
        let fit = linear_fit(&[0.0, 1.0, 2.0, 3.0], &[1.0, 3.0, 5.0, 7.0]).unwrap();
        assert!(close(fit.slope, 2.0));
        assert!(close(fit.intercept, 1.0));
        assert!(close(fit.r_squared.unwrap(), 1.0));
        assert!(linear_fit(&[1.0, 1.0], &[2.0, 3.0]).is_none());
    }

    #[test]
    fn diversity_is_zero_for_one_category() {
        assert_eq!(shannon_diversity(&[7]), 0.0);
        assert!(close(shannon_diversity(&[1, 1]), 2.0f64.ln()));
    }

    #[test]
    fn describe_skips_empty_columns() {
        assert!(describe(&[]).is_none());
        let d = describe(&[10.0, 20.0, 30.0, 40.0, 1000.0]).unwrap();
        assert_eq!(d.count, 5);
        assert!(close(d.mean, 220.0));
        assert!(close(d.median, 30.0));
        assert!(close(d.range, 990.0));
    }
}

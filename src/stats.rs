//! Small numeric helpers shared by the loader and the analyzers
//!
//! All functions are total: inputs that cannot produce a meaningful value
//! (empty slices, zero variance, mismatched lengths) yield `None` rather than
//! NaN.

/// Least-squares fit of `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Coefficient of determination, 0-1
    pub r_squared: f64,
}

impl LinearFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population variance.
pub fn variance(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    Some(values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64)
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    variance(values).map(f64::sqrt)
}

/// Standard deviation relative to the mean.
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    if m.abs() < f64::EPSILON {
        return None;
    }
    std_dev(values).map(|sd| sd / m)
}

pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().min_by(f64::total_cmp)
}

pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().max_by(f64::total_cmp)
}

/// Ordinary least squares over paired samples; needs two distinct x values.
pub fn linear_regression(xs: &[f64], ys: &[f64]) -> Option<LinearFit> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mx = mean(xs)?;
    let my = mean(ys)?;

    let sxx: f64 = xs.iter().map(|x| (x - mx).powi(2)).sum();
    if sxx.abs() < f64::EPSILON {
        return None;
    }
    let sxy: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mx) * (y - my)).sum();
    let syy: f64 = ys.iter().map(|y| (y - my).powi(2)).sum();

    let slope = sxy / sxx;
    let intercept = my - slope * mx;
    let r_squared = if syy.abs() < f64::EPSILON { 1.0 } else { (sxy * sxy) / (sxx * syy) };

    Some(LinearFit { slope, intercept, r_squared })
}

/// Regression of `ys` against their index.
pub fn trend(ys: &[f64]) -> Option<LinearFit> {
    let xs: Vec<f64> = (0..ys.len()).map(|i| i as f64).collect();
    linear_regression(&xs, ys)
}

/// Pearson correlation coefficient; `None` when either side is constant.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mx = mean(xs)?;
    let my = mean(ys)?;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx).powi(2);
        syy += (y - my).powi(2);
    }
    if sxx < f64::EPSILON || syy < f64::EPSILON {
        return None;
    }
    Some(sxy / (sxx.sqrt() * syy.sqrt()))
}

/// Linear-interpolated percentile, `p` in 0-100.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    Some(sorted[lower] * (1.0 - weight) + sorted[upper] * weight)
}

/// Round for presentation in result documents.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn regression_recovers_a_line() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        let ys = [91.0, 91.5, 92.0, 92.5];
        let fit = linear_regression(&xs, &ys).unwrap();
        assert!((fit.slope - 0.5).abs() < 1e-12);
        assert!((fit.intercept - 90.5).abs() < 1e-12);
        assert!((fit.r_squared - 1.0).abs() < 1e-12);
        assert!((fit.predict(10.0) - 95.5).abs() < 1e-12);
    }

    #[test]
    fn degenerate_inputs_yield_none() {
        assert_eq!(mean(&[]), None);
        assert_eq!(linear_regression(&[1.0], &[2.0]), None);
        assert_eq!(linear_regression(&[3.0, 3.0], &[1.0, 2.0]), None);
        assert_eq!(pearson(&[1.0, 2.0], &[5.0, 5.0]), None);
        assert_eq!(coefficient_of_variation(&[0.0, 0.0]), None);
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn percentile_interpolates() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(percentile(&values, 0.0), Some(1.0));
        assert_eq!(percentile(&values, 100.0), Some(4.0));
        assert_eq!(percentile(&values, 50.0), Some(2.5));
    }

    #[test]
    fn pearson_detects_direction() {
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0];
        let up = [2.0, 4.1, 6.0, 8.2, 9.9];
        let down = [10.0, 8.0, 6.0, 4.0, 2.0];
        assert!(pearson(&xs, &up).unwrap() > 0.99);
        assert!((pearson(&xs, &down).unwrap() + 1.0).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn prop_pearson_is_bounded(
            pairs in prop::collection::vec((-1000.0f64..1000.0, -1000.0f64..1000.0), 2..50)
        ) {
            let (xs, ys): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
            if let Some(r) = pearson(&xs, &ys) {
                prop_assert!((-1.0 - 1e-9..=1.0 + 1e-9).contains(&r));
            }
        }

        #[test]
        fn prop_variance_is_non_negative(values in prop::collection::vec(-1e6f64..1e6, 1..100)) {
            let v = variance(&values).unwrap();
            prop_assert!(v >= 0.0);
            let lo = min(&values).unwrap();
            let hi = max(&values).unwrap();
            let m = mean(&values).unwrap();
            prop_assert!(m >= lo - 1e-6 && m <= hi + 1e-6);
        }
    }
}

//! Mathematical utility functions for metric series

/// Arithmetic mean; 0.0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance (divides by n)
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Consecutive differences `v[i+1] - v[i]`
pub fn deltas(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Relative change from `from` to `to`, with the denominator floored at 0.01
pub fn relative_change(from: f64, to: f64) -> f64 {
    (to - from) / from.abs().max(0.01)
}

/// Lagged autocorrelation against the series mean.
/// The denominator is floored at 0.01 so near-constant series stay small.
pub fn autocorrelation(values: &[f64], lag: usize) -> f64 {
    if lag == 0 || values.len() <= lag {
        return 0.0;
    }
    let m = mean(values);
    let n = values.len() - lag;
    let numerator: f64 = (0..n)
        .map(|i| (values[i] - m) * (values[i + lag] - m))
        .sum();
    let denominator: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    numerator / denominator.max(0.01)
}

/// Clamp into the closed unit interval
pub fn clamp_unit(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

/// (min, max) of a non-empty slice
pub fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    let first = *values.first()?;
    Some(
        values
            .iter()
            .fold((first, first), |(lo, hi), v| (lo.min(*v), hi.max(*v))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std_dev() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&v) - 5.0).abs() < 1e-12);
        assert!((std_dev(&v) - 2.0).abs() < 1e-12);
        assert_eq!(mean(&[]), 0.0);
    }

    #[test]
    fn test_relative_change_floors_denominator() {
        assert!((relative_change(0.0, 0.02) - 2.0).abs() < 1e-12);
        assert!((relative_change(0.5, 0.6) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_autocorrelation_of_alternating_series_is_negative_at_lag_one() {
        let v = [0.2, 0.8, 0.2, 0.8, 0.2, 0.8, 0.2, 0.8];
        assert!(autocorrelation(&v, 1) < -0.5);
        assert!(autocorrelation(&v, 2) > 0.6);
        assert_eq!(autocorrelation(&v, 8), 0.0);
    }

    #[test]
    fn test_min_max() {
        assert_eq!(min_max(&[0.3, 0.1, 0.9]), Some((0.1, 0.9)));
        assert_eq!(min_max(&[]), None);
    }
}

//! Order statistics and trailing-window aggregates over sequences with gaps
//!
//! Missing observations are `None` and are skipped, never treated as zero.

/// Quantile with linear interpolation between order statistics
///
/// Missing values are excluded. Returns `None` when nothing is present.
pub fn quantile(values: &[Option<f64>], q: f64) -> Option<f64> {
    let mut present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return None;
    }
    present.sort_by(f64::total_cmp);
    Some(sorted_quantile(&present, q))
}

/// Quantile of an already sorted, non-empty slice
pub fn sorted_quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Trailing mean over the last `window` positions
///
/// A position yields `Some` once its window holds at least one present value.
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    trailing(values, window, |present| {
        Some(present.iter().sum::<f64>() / present.len() as f64)
    })
}

/// Trailing sample standard deviation (n - 1 denominator)
///
/// A window with a single present value has a deviation of 0.
pub fn rolling_std(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    trailing(values, window, |present| {
        if present.len() == 1 {
            return Some(0.0);
        }
        let n = present.len() as f64;
        let mean = present.iter().sum::<f64>() / n;
        let ss: f64 = present.iter().map(|v| (v - mean).powi(2)).sum();
        Some((ss / (n - 1.0)).sqrt())
    })
}

fn trailing<F>(values: &[Option<f64>], window: usize, agg: F) -> Vec<Option<f64>>
where
    F: Fn(&[f64]) -> Option<f64>,
{
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let present: Vec<f64> = values[start..=i].iter().flatten().copied().collect();
            if present.is_empty() {
                None
            } else {
                agg(&present)
            }
        })
        .collect()
}

/// Absolute first difference; the first position and gaps yield `None`
pub fn abs_diff(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        let delta = match (i.checked_sub(1).and_then(|p| values[p]), values[i]) {
            (Some(prev), Some(cur)) => Some((cur - prev).abs()),
            _ => None,
        };
        out.push(delta);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn test_quantile_interpolates() {
        let values = some(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(quantile(&values, 0.5), Some(3.0));
        assert!((quantile(&values, 0.9).unwrap() - 4.6).abs() < 1e-12);
        assert!((quantile(&values, 0.05).unwrap() - 1.2).abs() < 1e-12);
    }

    #[test]
    fn test_quantile_skips_missing() {
        let values = vec![Some(10.0), None, Some(20.0), None];
        assert_eq!(quantile(&values, 0.5), Some(15.0));
        assert_eq!(quantile(&[None, None], 0.9), None);
    }

    #[test]
    fn test_rolling_mean_window_five() {
        let values = some(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let means: Vec<f64> = rolling_mean(&values, 5).into_iter().flatten().collect();
        assert_eq!(means, vec![1.0, 1.5, 2.0, 2.5, 3.0]);
    }

    #[test]
    fn test_rolling_mean_drops_oldest() {
        let values = some(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 100.0]);
        let means = rolling_mean(&values, 5);
        assert_eq!(means[5], Some(4.0));
        assert!((means[6].unwrap() - 23.6).abs() < 1e-12);
    }

    #[test]
    fn test_rolling_std_single_record_is_zero() {
        let stds = rolling_std(&some(&[7.0]), 5);
        assert_eq!(stds, vec![Some(0.0)]);
    }

    #[test]
    fn test_rolling_std_sample_denominator() {
        let stds = rolling_std(&some(&[1.0, 2.0, 3.0]), 5);
        assert!((stds[1].unwrap() - 0.5_f64.sqrt()).abs() < 1e-12);
        assert!((stds[2].unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rolling_all_missing_window() {
        let values = vec![None, None, Some(4.0)];
        let means = rolling_mean(&values, 2);
        assert_eq!(means, vec![None, None, Some(4.0)]);
    }

    #[test]
    fn test_abs_diff() {
        let values = vec![Some(5.0), Some(2.0), None, Some(1.0), Some(4.0)];
        assert_eq!(abs_diff(&values), vec![None, Some(3.0), None, None, Some(3.0)]);
    }
}

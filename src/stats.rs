use serde::Serialize;

/// Summary statistics over one numeric series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub field: String,
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
}

impl Statistics {
    /// Compute statistics over the finite values of a series
    pub fn compute(field: &str, values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let values: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();

        if values.is_empty() {
            return None;
        }

        let count = values.len();
        let sum: f64 = values.iter().sum();
        let mean = sum / count as f64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Some(Statistics {
            field: field.to_string(),
            count,
            mean,
            min,
            max,
            sum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_compute() {
        let stats = Statistics::compute("value", [10.0, 20.0, 30.0, 40.0, 50.0]).unwrap();

        assert_eq!(stats.field, "value");
        assert_eq!(stats.count, 5);
        assert_eq!(stats.mean, 30.0);
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 50.0);
        assert_eq!(stats.sum, 150.0);
    }

    #[test]
    fn test_statistics_skip_non_finite() {
        let stats = Statistics::compute("score", [-0.2, f64::NAN, 0.1]).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.min, -0.2);
    }

    #[test]
    fn test_statistics_empty_series() {
        assert!(Statistics::compute("value", Vec::new()).is_none());
    }
}

use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::utils::window::sorted_quantile;
use crate::utils::{validate_contamination, validate_matrix, AnalysisError};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Binary decision of the anomaly scorer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyLabel {
    Inlier,
    Outlier,
}

impl AnomalyLabel {
    pub fn is_outlier(self) -> bool {
        self == AnomalyLabel::Outlier
    }
}

/// Isolation forest hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IsolationForestParams {
    /// Number of trees in the ensemble
    pub n_estimators: usize,
    /// Subsample size per tree, capped at the training row count
    pub max_samples: usize,
    /// Expected outlier fraction of the training batch
    pub contamination: f64,
    /// Seed for subsampling and split selection
    pub seed: u64,
}

impl Default for IsolationForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            contamination: 0.1,
            seed: 42,
        }
    }
}

impl IsolationForestParams {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        validate_contamination(self.contamination)?;
        if self.n_estimators == 0 {
            return Err(AnalysisError::ValidationError(
                "n_estimators must be > 0".to_string(),
            ));
        }
        if self.max_samples == 0 {
            return Err(AnalysisError::ValidationError(
                "max_samples must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Expected path length of an unsuccessful BST search over `n` points
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone)]
enum IsolationNode {
    Split {
        feature: usize,
        threshold: f64,
        left: Box<IsolationNode>,
        right: Box<IsolationNode>,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug, Clone)]
struct IsolationTree {
    root: IsolationNode,
}

impl IsolationTree {
    fn grow(data: &Array2<f64>, rows: &[usize], max_depth: usize, rng: &mut StdRng) -> Self {
        Self {
            root: grow_node(data, rows, 0, max_depth, rng),
        }
    }

    fn path_length(&self, sample: ArrayView1<'_, f64>) -> f64 {
        let mut node = &self.root;
        let mut depth = 0.0;
        loop {
            match node {
                IsolationNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if sample[*feature] <= *threshold { left } else { right };
                    depth += 1.0;
                }
                IsolationNode::Leaf { size } => return depth + average_path_length(*size),
            }
        }
    }
}

fn grow_node(
    data: &Array2<f64>,
    rows: &[usize],
    depth: usize,
    max_depth: usize,
    rng: &mut StdRng,
) -> IsolationNode {
    let leaf = IsolationNode::Leaf { size: rows.len() };
    if depth >= max_depth || rows.len() <= 1 {
        return leaf;
    }

    // only features that still vary inside this node can split it
    let candidates: Vec<(usize, f64, f64)> = (0..data.ncols())
        .filter_map(|feature| {
            let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                let v = data[[r, feature]];
                (lo.min(v), hi.max(v))
            });
            (hi > lo).then_some((feature, lo, hi))
        })
        .collect();
    if candidates.is_empty() {
        return leaf;
    }

    let (feature, lo, hi) = candidates[rng.random_range(0..candidates.len())];
    let threshold = rng.random_range(lo..hi);

    let (left, right): (Vec<usize>, Vec<usize>) =
        rows.iter().partition(|&&r| data[[r, feature]] <= threshold);
    if left.is_empty() || right.is_empty() {
        return leaf;
    }

    IsolationNode::Split {
        feature,
        threshold,
        left: Box::new(grow_node(data, &left, depth + 1, max_depth, rng)),
        right: Box::new(grow_node(data, &right, depth + 1, max_depth, rng)),
    }
}

#[derive(Debug, Clone)]
enum ScorerState {
    Unfitted,
    Fitted {
        trees: Vec<IsolationTree>,
        n_features: usize,
        subsample: usize,
        offset: f64,
    },
}

/// Isolation forest over standardized features
///
/// `score` returns the decision function: the normalized isolation score minus
/// the fit-time offset, so negative values are outliers and more negative is
/// more anomalous. The offset is the `contamination` quantile of the training
/// scores, which makes the training outlier rate track `contamination`.
#[derive(Debug, Clone)]
pub struct AnomalyScorer {
    params: IsolationForestParams,
    state: ScorerState,
}

impl AnomalyScorer {
    pub fn new(params: IsolationForestParams) -> Result<Self, AnalysisError> {
        params.validate()?;
        Ok(Self {
            params,
            state: ScorerState::Unfitted,
        })
    }

    pub fn params(&self) -> &IsolationForestParams {
        &self.params
    }

    pub fn is_fitted(&self) -> bool {
        matches!(self.state, ScorerState::Fitted { .. })
    }

    /// Decision offset fixed at fit time
    pub fn offset(&self) -> Option<f64> {
        match self.state {
            ScorerState::Fitted { offset, .. } => Some(offset),
            ScorerState::Unfitted => None,
        }
    }

    /// Build the ensemble and fix the decision boundary
    ///
    /// # Errors
    /// * `StateError` if already fitted
    /// * `ModelError` for an empty matrix or non-finite values
    pub fn fit(&mut self, features: &Array2<f64>) -> Result<(), AnalysisError> {
        if self.is_fitted() {
            return Err(AnalysisError::StateError(
                "anomaly scorer is already fitted".to_string(),
            ));
        }
        validate_matrix(features)?;

        let n_rows = features.nrows();
        let subsample = self.params.max_samples.min(n_rows);
        let max_depth = (subsample.max(2) as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(self.params.seed);

        let trees: Vec<IsolationTree> = (0..self.params.n_estimators)
            .map(|_| {
                let rows = rand::seq::index::sample(&mut rng, n_rows, subsample).into_vec();
                IsolationTree::grow(features, &rows, max_depth, &mut rng)
            })
            .collect();

        let mut train_scores = raw_scores(&trees, subsample, features).to_vec();
        train_scores.sort_by(f64::total_cmp);
        let offset = sorted_quantile(&train_scores, self.params.contamination);

        debug!(subsample, max_depth, offset, "isolation forest grown");
        info!(
            trees = trees.len(),
            rows = n_rows,
            features = features.ncols(),
            "anomaly scorer fitted"
        );

        self.state = ScorerState::Fitted {
            trees,
            n_features: features.ncols(),
            subsample,
            offset,
        };
        Ok(())
    }

    /// Normalized isolation score in [-1, 0), lower is more anomalous
    ///
    /// # Errors
    /// * `StateError` before fit or on a column-count mismatch
    pub fn score_samples(&self, features: &Array2<f64>) -> Result<Array1<f64>, AnalysisError> {
        let ScorerState::Fitted {
            trees,
            n_features,
            subsample,
            ..
        } = &self.state
        else {
            return Err(AnalysisError::StateError(
                "anomaly scorer used before fit".to_string(),
            ));
        };
        if features.ncols() != *n_features {
            return Err(AnalysisError::StateError(format!(
                "anomaly scorer was fitted on {} features, got {}",
                n_features,
                features.ncols()
            )));
        }
        Ok(raw_scores(trees, *subsample, features))
    }

    /// Continuous anomaly score; negative means outlier
    pub fn score(&self, features: &Array2<f64>) -> Result<Array1<f64>, AnalysisError> {
        let raw = self.score_samples(features)?;
        let offset = self.offset().unwrap_or_default();
        Ok(raw - offset)
    }

    /// Label each row using the boundary fixed at fit time
    pub fn predict(&self, features: &Array2<f64>) -> Result<Vec<AnomalyLabel>, AnalysisError> {
        Ok(self.score(features)?.iter().map(|&s| label_for(s)).collect())
    }
}

/// Label for a decision score
pub fn label_for(score: f64) -> AnomalyLabel {
    if score < 0.0 {
        AnomalyLabel::Outlier
    } else {
        AnomalyLabel::Inlier
    }
}

fn raw_scores(trees: &[IsolationTree], subsample: usize, features: &Array2<f64>) -> Array1<f64> {
    let norm = average_path_length(subsample).max(f64::EPSILON);
    features
        .rows()
        .into_iter()
        .map(|row| {
            let mean_path =
                trees.iter().map(|t| t.path_length(row)).sum::<f64>() / trees.len() as f64;
            -(2.0_f64.powf(-mean_path / norm))
        })
        .collect()
}

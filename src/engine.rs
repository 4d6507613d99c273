use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

use crate::analyzer::{AnomalyAnalyzer, AnomalyReport};
use crate::config::{PipelineConfig, QuantileMode};
use crate::dataset::RawBatch;
use crate::insight_core::{
    AnomalyScorer, FeatureEngineer, FeatureFrame, FeatureSelector, QuantileThresholds,
};
use crate::preprocess::Preprocessor;
use crate::record::TelemetryBatch;
use crate::risk::{RiskClassifier, ScoredRecord};
use crate::utils::{AnalysisError, Scaler};

/// What the training run saw and produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingSummary {
    pub batch: String,
    pub records: usize,
    pub dropped: usize,
    pub coerced: usize,
    pub features: Vec<&'static str>,
    pub anomalies: usize,
    pub offset: f64,
    pub thresholds: QuantileThresholds,
}

/// Scored output of one batch
#[derive(Debug, Clone)]
pub struct ScoredBatch {
    pub name: String,
    pub features: FeatureFrame,
    pub records: Vec<ScoredRecord>,
    pub dropped: usize,
    pub coerced: usize,
}

impl ScoredBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn outlier_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_outlier()).count()
    }

    pub fn distress_count(&self) -> usize {
        self.records.iter().filter(|r| r.distress_flag).count()
    }
}

/// Frozen state produced by one training run
#[derive(Debug)]
struct FittedPipeline {
    selector: FeatureSelector,
    scaler: Scaler,
    scorer: AnomalyScorer,
    thresholds: QuantileThresholds,
    summary: TrainingSummary,
}

/// End-to-end distress detection: fit once, score any number of batches
///
/// Scoring takes a shared lock on the fitted state for the whole call and a
/// refit swaps the state under the exclusive lock, so a refit never
/// interleaves with an in-flight score.
#[derive(Debug)]
pub struct DistressDetector {
    config: PipelineConfig,
    preprocessor: Preprocessor,
    classifier: RiskClassifier,
    fitted: RwLock<Option<FittedPipeline>>,
}

impl DistressDetector {
    pub fn new(config: PipelineConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self {
            classifier: RiskClassifier::new(config.causes),
            preprocessor: Preprocessor::new(),
            config,
            fitted: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.read().is_some()
    }

    /// Fit-time feature names in model column order
    pub fn feature_names(&self) -> Option<Vec<&'static str>> {
        self.fitted.read().as_ref().map(|p| p.summary.features.clone())
    }

    pub fn training_summary(&self) -> Option<TrainingSummary> {
        self.fitted.read().as_ref().map(|p| p.summary.clone())
    }

    /// Preprocess and fit on a raw training batch
    pub fn fit(&self, raw: &RawBatch) -> Result<ScoredBatch, AnalysisError> {
        let batch = self.preprocessor.process(raw);
        self.fit_batch(&raw.name, &batch)
    }

    /// Fit every stateful component on a training batch and score it
    ///
    /// Components are built fresh and only replace the current fitted state
    /// once all of them fitted successfully.
    ///
    /// # Errors
    /// * `ModelError` for an empty batch, no usable feature, or a zero-variance
    ///   feature when constant features are not allowed
    pub fn fit_batch(&self, name: &str, batch: &TelemetryBatch) -> Result<ScoredBatch, AnalysisError> {
        ensure_records(name, batch)?;

        let frame = self.engineer().engineer(batch);
        let thresholds = frame.thresholds().clone();

        let mut selector = FeatureSelector::new();
        let matrix = selector.fit(&frame)?;

        let mut scaler = Scaler::new(self.config.constant_feature_policy())
            .with_feature_names(selector.feature_names().unwrap_or_default());
        scaler.fit(&matrix)?;
        let scaled = scaler.transform(&matrix)?;

        let mut scorer = AnomalyScorer::new(self.config.forest_params())?;
        scorer.fit(&scaled)?;
        let scores = scorer.score(&scaled)?;

        let records = self.classifier.classify_batch(batch, &frame, &scores)?;
        let scored = ScoredBatch {
            name: name.to_string(),
            features: frame,
            records,
            dropped: batch.dropped,
            coerced: batch.coerced,
        };

        let anomalies = scored.outlier_count();
        info!(
            batch = name,
            "training found {} anomalies out of {} records",
            anomalies,
            scored.len()
        );

        let summary = TrainingSummary {
            batch: name.to_string(),
            records: scored.len(),
            dropped: batch.dropped,
            coerced: batch.coerced,
            features: selector.feature_names().unwrap_or_default().to_vec(),
            anomalies,
            offset: scorer.offset().unwrap_or_default(),
            thresholds: thresholds.clone(),
        };

        *self.fitted.write() = Some(FittedPipeline {
            selector,
            scaler,
            scorer,
            thresholds,
            summary,
        });
        Ok(scored)
    }

    /// Preprocess and score a raw batch against the fitted state
    pub fn score(&self, raw: &RawBatch) -> Result<ScoredBatch, AnalysisError> {
        let batch = self.preprocessor.process(raw);
        self.score_batch(&raw.name, &batch)
    }

    /// Score a batch with the frozen selector, scaler and scorer
    ///
    /// # Errors
    /// * `StateError` before fit, or when a fit-time feature is missing
    /// * `ModelError` for an empty batch
    pub fn score_batch(&self, name: &str, batch: &TelemetryBatch) -> Result<ScoredBatch, AnalysisError> {
        let guard = self.fitted.read();
        let pipeline = guard.as_ref().ok_or_else(|| {
            AnalysisError::StateError("detector must be fitted before scoring".to_string())
        })?;
        ensure_records(name, batch)?;

        let engineer = match self.config.quantile_mode {
            QuantileMode::Frozen => self.engineer().with_thresholds(pipeline.thresholds.clone()),
            QuantileMode::PerBatch => self.engineer(),
        };
        let frame = engineer.engineer(batch);

        let matrix = pipeline.selector.transform(&frame)?;
        let scaled = pipeline.scaler.transform(&matrix)?;
        let scores = pipeline.scorer.score(&scaled)?;
        let records = self.classifier.classify_batch(batch, &frame, &scores)?;

        let scored = ScoredBatch {
            name: name.to_string(),
            features: frame,
            records,
            dropped: batch.dropped,
            coerced: batch.coerced,
        };
        info!(
            batch = name,
            outliers = scored.outlier_count(),
            distress = scored.distress_count(),
            records = scored.len(),
            "batch scored"
        );
        Ok(scored)
    }

    /// Aggregate a scored batch with the configured top-N
    pub fn analyze(&self, scored: &ScoredBatch) -> AnomalyReport {
        AnomalyAnalyzer::new(self.config.top_n).analyze(scored)
    }

    fn engineer(&self) -> FeatureEngineer {
        FeatureEngineer::new()
            .with_window(self.config.rolling_window)
            .partition_by_subject(self.config.partition_by_subject)
    }
}

fn ensure_records(name: &str, batch: &TelemetryBatch) -> Result<(), AnalysisError> {
    if batch.is_empty() {
        return Err(AnalysisError::ModelError(format!(
            "batch '{name}' has no usable records"
        )));
    }
    Ok(())
}

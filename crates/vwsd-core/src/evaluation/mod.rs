//! Scoring ranked predictions against gold references.
//!
//! [`official_metrics`] computes the task's MRR and Hit@1 directly and
//! enforces the prediction invariants. [`Evaluator`] adds the cutoff metrics
//! from a [`RankingEvaluator`] and assembles one [`MetricRecord`] per run.

pub mod ir;

pub use ir::{IrEvaluator, Metric, MetricKind, Qrels, RankingEvaluator, Run};

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};
use crate::output;

/// Official task scores for one language.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OfficialMetrics {
    /// Mean reciprocal rank of the gold candidate
    pub mrr: f64,
    /// Fraction of samples whose gold candidate is ranked first
    pub hit_at_1: f64,
}

/// Check prediction integrity against the references.
///
/// Fails on the first prediction containing duplicates, then on every
/// reference missing from its prediction (all offending pairs are reported).
pub fn validate_predictions(
    predictions: &[Vec<String>],
    references: &[String],
) -> std::result::Result<(), EvalError> {
    for (index, prediction) in predictions.iter().enumerate() {
        let unique: HashSet<&String> = prediction.iter().collect();
        if unique.len() != prediction.len() {
            return Err(EvalError::DuplicateCandidates {
                index,
                prediction: prediction.clone(),
            });
        }
    }

    let missing: Vec<(usize, String, Vec<String>)> = predictions
        .iter()
        .zip(references)
        .enumerate()
        .filter(|(_, (p, r))| !p.contains(r))
        .map(|(i, (p, r))| (i, r.clone(), p.clone()))
        .collect();
    if !missing.is_empty() {
        return Err(EvalError::ReferenceNotRanked { pairs: missing });
    }

    Ok(())
}

/// Reciprocal rank of `reference` within `prediction`, if present.
pub fn reciprocal_rank(prediction: &[String], reference: &str) -> Option<f64> {
    prediction
        .iter()
        .position(|c| c == reference)
        .map(|i| 1.0 / (1 + i) as f64)
}

/// Compute MRR and Hit@1, after validating the predictions.
pub fn official_metrics(
    predictions: &[Vec<String>],
    references: &[String],
) -> std::result::Result<OfficialMetrics, EvalError> {
    validate_predictions(predictions, references)?;

    let n = predictions.len().max(1) as f64;
    let mut rr_sum = 0.0;
    let mut hits = 0usize;
    for (prediction, reference) in predictions.iter().zip(references) {
        rr_sum += reciprocal_rank(prediction, reference).unwrap_or(0.0);
        if prediction.first() == Some(reference) {
            hits += 1;
        }
    }

    Ok(OfficialMetrics {
        mrr: rr_sum / n,
        hit_at_1: hits as f64 / n,
    })
}

/// Qrels with each sample's gold candidate at relevance 1.
pub fn build_qrels(references: &[String]) -> Qrels {
    references
        .iter()
        .enumerate()
        .map(|(i, r)| (i.to_string(), BTreeMap::from([(r.clone(), 1)])))
        .collect()
}

/// Run scoring each predicted candidate `1 / (1 + rank)`.
pub fn build_run(predictions: &[Vec<String>]) -> Run {
    predictions
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let scores = p
                .iter()
                .enumerate()
                .map(|(rank, c)| (c.clone(), 1.0 / (1 + rank) as f64))
                .collect();
            (i.to_string(), scores)
        })
        .collect()
}

/// One run's scores, appended as a single line to the metrics log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Label of the evaluated run (the prediction directory)
    pub model: String,
    /// Metric name (suffixed with `/<language>`) to score
    #[serde(flatten)]
    pub metrics: BTreeMap<String, f64>,
}

impl MetricRecord {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            metrics: BTreeMap::new(),
        }
    }
}

/// Evaluates prediction files with a pluggable ranking evaluator.
pub struct Evaluator<E: RankingEvaluator> {
    ranking: E,
    metrics: Vec<String>,
}

impl<E: RankingEvaluator> Evaluator<E> {
    pub fn new(ranking: E, metrics: Vec<String>) -> Self {
        Self { ranking, metrics }
    }

    /// Score one language and add its metrics to `record`.
    ///
    /// Counts are checked before anything is computed.
    pub fn evaluate_language(
        &self,
        language: &str,
        predictions: &[Vec<String>],
        references: &[String],
        record: &mut MetricRecord,
    ) -> Result<OfficialMetrics> {
        if predictions.len() != references.len() {
            return Err(EvalError::CountMismatch {
                language: language.to_string(),
                predictions: predictions.len(),
                references: references.len(),
            }
            .into());
        }

        let official = official_metrics(predictions, references)?;
        record
            .metrics
            .insert(format!("mrr_official/{language}"), official.mrr);
        record
            .metrics
            .insert(format!("hit_official/{language}"), official.hit_at_1);

        let ranked = self.ranking.evaluate(
            &build_qrels(references),
            &build_run(predictions),
            &self.metrics,
        )?;
        for (name, value) in ranked {
            tracing::debug!("{}/{}: {:.4}", name, language, value);
            record.metrics.insert(format!("{name}/{language}"), value);
        }

        tracing::info!(
            "{}: MRR {:.4}, Hit@1 {:.4} over {} samples",
            language,
            official.mrr,
            official.hit_at_1,
            predictions.len()
        );
        Ok(official)
    }

    /// Evaluate `<prediction_dir>/prediction.<lang>.txt` for each language
    /// against the matching lines of the gold file.
    pub fn evaluate_dir(
        &self,
        prediction_dir: &Path,
        gold_path: &Path,
        languages: &[String],
    ) -> Result<MetricRecord> {
        let mut record = MetricRecord::new(prediction_dir.to_string_lossy());

        for language in languages {
            let references = output::read_gold(gold_path, language)?;
            let prediction_path = output::prediction_path(prediction_dir, language);
            let predictions = output::read_predictions(&prediction_path)?;
            tracing::info!(
                "{}: {} references, {} predictions",
                language,
                references.len(),
                predictions.len()
            );
            self.evaluate_language(language, &predictions, &references, &mut record)?;
        }

        Ok(record)
    }
}

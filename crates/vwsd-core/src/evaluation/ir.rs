//! Ranking metrics over qrels/run mappings.
//!
//! Follows the ranx conventions: runs are ordered by descending score,
//! relevance is read from the qrels, and every metric is averaged over the
//! queries in the qrels (a query with no run scores zero).

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::EvalError;

/// Relevance judgments: query id → document id → relevance.
pub type Qrels = BTreeMap<String, BTreeMap<String, u32>>;

/// System scores: query id → document id → score.
pub type Run = BTreeMap<String, BTreeMap<String, f64>>;

/// Metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    HitRate,
    Precision,
    Recall,
    Mrr,
    Map,
    Ndcg,
}

/// A metric with an optional cutoff, e.g. `ndcg@10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metric {
    pub kind: MetricKind,
    pub cutoff: Option<usize>,
}

impl Metric {
    /// Parse names like `map@5`, `hit_rate@1` or `mrr`.
    pub fn parse(name: &str) -> Result<Self, EvalError> {
        let unknown = || EvalError::UnknownMetric(name.to_string());

        let (base, cutoff) = match name.split_once('@') {
            Some((base, k)) => {
                let k: usize = k.parse().map_err(|_| unknown())?;
                if k == 0 {
                    return Err(unknown());
                }
                (base, Some(k))
            }
            None => (name, None),
        };

        let kind = match base {
            "hit_rate" | "hits" => MetricKind::HitRate,
            "precision" => MetricKind::Precision,
            "recall" => MetricKind::Recall,
            "mrr" => MetricKind::Mrr,
            "map" => MetricKind::Map,
            "ndcg" => MetricKind::Ndcg,
            _ => return Err(unknown()),
        };

        Ok(Self { kind, cutoff })
    }

    /// Score one query. `ranked` holds the relevance of each retrieved doc, best first.
    fn score_query(&self, ranked: &[u32], judged: &BTreeMap<String, u32>) -> f64 {
        let num_relevant = judged.values().filter(|&&r| r > 0).count();
        if num_relevant == 0 {
            return 0.0;
        }
        let k = self.cutoff.unwrap_or(ranked.len());
        let top = &ranked[..k.min(ranked.len())];

        match self.kind {
            MetricKind::HitRate => {
                if top.iter().any(|&r| r > 0) {
                    1.0
                } else {
                    0.0
                }
            }
            MetricKind::Precision => {
                top.iter().filter(|&&r| r > 0).count() as f64 / k.max(1) as f64
            }
            MetricKind::Recall => {
                top.iter().filter(|&&r| r > 0).count() as f64 / num_relevant as f64
            }
            MetricKind::Mrr => top
                .iter()
                .position(|&r| r > 0)
                .map(|i| 1.0 / (i + 1) as f64)
                .unwrap_or(0.0),
            MetricKind::Map => {
                let mut hits = 0usize;
                let mut sum = 0.0;
                for (i, &r) in top.iter().enumerate() {
                    if r > 0 {
                        hits += 1;
                        sum += hits as f64 / (i + 1) as f64;
                    }
                }
                sum / num_relevant as f64
            }
            MetricKind::Ndcg => {
                let mut ideal: Vec<u32> = judged.values().copied().filter(|&r| r > 0).collect();
                ideal.sort_unstable_by(|a, b| b.cmp(a));
                ideal.truncate(k);
                let ideal = dcg(&ideal);
                if ideal == 0.0 {
                    0.0
                } else {
                    dcg(top) / ideal
                }
            }
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let base = match self.kind {
            MetricKind::HitRate => "hit_rate",
            MetricKind::Precision => "precision",
            MetricKind::Recall => "recall",
            MetricKind::Mrr => "mrr",
            MetricKind::Map => "map",
            MetricKind::Ndcg => "ndcg",
        };
        match self.cutoff {
            Some(k) => write!(f, "{base}@{k}"),
            None => write!(f, "{base}"),
        }
    }
}

/// Computes ranking metrics from qrels and a run.
pub trait RankingEvaluator {
    /// Return each metric's mean over the qrels queries, keyed by metric name.
    fn evaluate(
        &self,
        qrels: &Qrels,
        run: &Run,
        metrics: &[String],
    ) -> Result<BTreeMap<String, f64>, EvalError>;
}

/// In-process implementation of the standard IR metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct IrEvaluator;

impl RankingEvaluator for IrEvaluator {
    fn evaluate(
        &self,
        qrels: &Qrels,
        run: &Run,
        metrics: &[String],
    ) -> Result<BTreeMap<String, f64>, EvalError> {
        let parsed = metrics
            .iter()
            .map(|name| Metric::parse(name).map(|m| (name.clone(), m)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut totals: BTreeMap<String, f64> =
            parsed.iter().map(|(name, _)| (name.clone(), 0.0)).collect();

        for (query_id, judged) in qrels {
            let relevance = match run.get(query_id) {
                Some(docs) => ranked_relevance(docs, judged),
                None => Vec::new(),
            };

            for (name, metric) in &parsed {
                if let Some(total) = totals.get_mut(name) {
                    *total += metric.score_query(&relevance, judged);
                }
            }
        }

        let n = qrels.len().max(1) as f64;
        Ok(totals.into_iter().map(|(k, v)| (k, v / n)).collect())
    }
}

/// Discounted cumulative gain, `Σ rel_i / log2(i + 1)` with 1-based `i`.
fn dcg(relevance: &[u32]) -> f64 {
    relevance
        .iter()
        .enumerate()
        .map(|(i, &rel)| rel as f64 / ((i + 2) as f64).log2())
        .sum()
}

/// Relevance of each retrieved document, ordered by descending score.
///
/// Equal scores are ordered by document id.
fn ranked_relevance(docs: &BTreeMap<String, f64>, judged: &BTreeMap<String, u32>) -> Vec<u32> {
    let mut ranked: Vec<(&String, f64)> = docs.iter().map(|(d, &s)| (d, s)).collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    ranked
        .into_iter()
        .map(|(doc, _)| judged.get(doc).copied().unwrap_or(0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_relevant(rank: usize, n: usize) -> (Qrels, Run) {
        let docs: Vec<String> = (0..n).map(|i| format!("d{i}")).collect();
        let mut qrels = Qrels::new();
        qrels.insert("0".into(), [(docs[rank - 1].clone(), 1)].into_iter().collect());
        let mut run = Run::new();
        run.insert(
            "0".into(),
            docs.iter()
                .enumerate()
                .map(|(i, d)| (d.clone(), 1.0 / (1.0 + i as f64)))
                .collect(),
        );
        (qrels, run)
    }

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_metric_names() {
        let m = Metric::parse("ndcg@10").unwrap();
        assert_eq!(m.kind, MetricKind::Ndcg);
        assert_eq!(m.cutoff, Some(10));
        assert_eq!(Metric::parse("mrr").unwrap().cutoff, None);
        assert_eq!(Metric::parse("hit_rate@1").unwrap().to_string(), "hit_rate@1");
        assert!(matches!(
            Metric::parse("f1@5"),
            Err(EvalError::UnknownMetric(_))
        ));
        assert!(Metric::parse("map@0").is_err());
        assert!(Metric::parse("map@x").is_err());
    }

    #[test]
    fn test_single_relevant_within_cutoff() {
        let (qrels, run) = single_relevant(3, 10);
        let scores = IrEvaluator
            .evaluate(&qrels, &run, &names(&["mrr@5", "map@5", "ndcg@5", "hit_rate@1", "hit_rate@3"]))
            .unwrap();

        assert!((scores["mrr@5"] - 1.0 / 3.0).abs() < 1e-9);
        assert!((scores["map@5"] - 1.0 / 3.0).abs() < 1e-9);
        assert!((scores["ndcg@5"] - 1.0 / 4f64.log2()).abs() < 1e-9);
        assert_eq!(scores["hit_rate@1"], 0.0);
        assert_eq!(scores["hit_rate@3"], 1.0);
    }

    #[test]
    fn test_single_relevant_beyond_cutoff() {
        let (qrels, run) = single_relevant(7, 10);
        let scores = IrEvaluator
            .evaluate(&qrels, &run, &names(&["mrr@5", "map@5", "ndcg@5", "mrr@10", "recall@10"]))
            .unwrap();

        assert_eq!(scores["mrr@5"], 0.0);
        assert_eq!(scores["map@5"], 0.0);
        assert_eq!(scores["ndcg@5"], 0.0);
        assert!((scores["mrr@10"] - 1.0 / 7.0).abs() < 1e-9);
        assert_eq!(scores["recall@10"], 1.0);
    }

    #[test]
    fn test_averages_over_queries_and_missing_runs() {
        let (mut qrels, run) = single_relevant(1, 3);
        qrels.insert("1".into(), [("d0".to_string(), 1)].into_iter().collect());
        let scores = IrEvaluator.evaluate(&qrels, &run, &names(&["mrr"])).unwrap();
        assert!((scores["mrr"] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_precision_and_multi_relevant_map() {
        let mut qrels = Qrels::new();
        qrels.insert(
            "q".into(),
            [("a".to_string(), 1), ("c".to_string(), 1)].into_iter().collect(),
        );
        let mut run = Run::new();
        run.insert(
            "q".into(),
            [("a".to_string(), 0.9), ("b".to_string(), 0.8), ("c".to_string(), 0.7)]
                .into_iter()
                .collect(),
        );
        let scores = IrEvaluator
            .evaluate(&qrels, &run, &names(&["precision@2", "map@3"]))
            .unwrap();
        assert!((scores["precision@2"] - 0.5).abs() < 1e-9);
        // (1/1 + 2/3) / 2
        assert!((scores["map@3"] - (1.0 + 2.0 / 3.0) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_metric_is_rejected() {
        let (qrels, run) = single_relevant(1, 2);
        let err = IrEvaluator.evaluate(&qrels, &run, &names(&["bleu"])).unwrap_err();
        assert!(matches!(err, EvalError::UnknownMetric(name) if name == "bleu"));
    }
}

//! Ordering candidates by similarity score.

use std::cmp::Ordering;

use serde::Serialize;

/// Candidates ordered best first, with their scores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranking {
    pub candidates: Vec<String>,
    pub scores: Vec<f32>,
}

impl Ranking {
    /// Highest-scoring candidate, if any.
    pub fn best(&self) -> Option<&str> {
        self.candidates.first().map(String::as_str)
    }
}

/// Rank candidates by descending score.
///
/// Equal scores keep their original candidate order. NaN sorts last.
pub fn rank_candidates(candidates: &[String], scores: &[f32]) -> Ranking {
    let mut order: Vec<usize> = (0..candidates.len().min(scores.len())).collect();
    order.sort_by(|&a, &b| compare_desc(scores[a], scores[b]).then(a.cmp(&b)));

    Ranking {
        candidates: order.iter().map(|&i| candidates[i].clone()).collect(),
        scores: order.iter().map(|&i| scores[i]).collect(),
    }
}

fn compare_desc(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.total_cmp(&a),
    }
}

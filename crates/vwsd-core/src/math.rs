//! Shared math utilities.

use ndarray::Array2;

/// L2-normalize a vector in place so its magnitude is 1.
pub fn l2_normalize_in_place(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// L2-normalize a slice, returning a new vector with unit magnitude.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let mut result = v.to_vec();
    l2_normalize_in_place(&mut result);
    result
}

/// Stack equal-length rows into a matrix. Returns `None` on ragged input.
pub fn stack_rows(rows: &[Vec<f32>]) -> Option<Array2<f32>> {
    let dim = rows.first().map(Vec::len).unwrap_or(0);
    if rows.iter().any(|r| r.len() != dim) {
        return None;
    }
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), dim), flat).ok()
}

/// Scaled pairwise dot products: `scale * queries · candidatesᵀ`.
///
/// With L2-normalized rows this is scaled cosine similarity, one row per query.
pub fn similarity_matrix(queries: &Array2<f32>, candidates: &Array2<f32>, scale: f32) -> Vec<Vec<f32>> {
    let product = queries.dot(&candidates.t()) * scale;
    product.outer_iter().map(|row| row.to_vec()).collect()
}

// Scalar distance kernels for the in-process backend.
// Inputs are widened to f64; mismatched lengths yield infinity.

use mediax_core::Distance;

/// Distance between two vectors under `metric`; smaller is closer.
pub fn distance(metric: Distance, a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return f64::INFINITY;
    }
    match metric {
        Distance::Euclidean => l2_distance(a, b),
        Distance::Manhattan => l1_distance(a, b),
        Distance::Cosine => cosine_distance(a, b),
        Distance::InnerProduct => -dot_product(a, b),
    }
}

#[inline]
fn dot_product(a: &[f64], b: &[f64]) -> f64 {
    // two accumulators for better pipelining
    let mut dot0 = 0.0;
    let mut dot1 = 0.0;
    let chunks = a.chunks_exact(4);
    let remainder = chunks.remainder().len();
    for (a_chunk, b_chunk) in chunks.zip(b.chunks_exact(4)) {
        dot0 += a_chunk[0] * b_chunk[0] + a_chunk[1] * b_chunk[1];
        dot1 += a_chunk[2] * b_chunk[2] + a_chunk[3] * b_chunk[3];
    }
    for i in (a.len() - remainder)..a.len() {
        dot0 += a[i] * b[i];
    }
    dot0 + dot1
}

#[inline]
fn l2_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

#[inline]
fn l1_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

#[inline]
fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    let norm = (dot_product(a, a) * dot_product(b, b)).sqrt();
    if norm == 0.0 {
        return 1.0;
    }
    1.0 - dot_product(a, b) / norm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vectors_have_zero_distance() {
        let v = [1.0, 0.0, 0.0];
        assert_eq!(distance(Distance::Euclidean, &v, &v), 0.0);
        assert_eq!(distance(Distance::Manhattan, &v, &v), 0.0);
        assert!(distance(Distance::Cosine, &v, &v).abs() < 1e-12);
    }

    #[test]
    fn test_metrics() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [2.0, 2.0, 3.0, 4.0, 3.0];
        assert!((distance(Distance::Euclidean, &a, &b) - 5f64.sqrt()).abs() < 1e-12);
        assert_eq!(distance(Distance::Manhattan, &a, &b), 3.0);
        assert_eq!(distance(Distance::InnerProduct, &a, &b), -(2.0 + 4.0 + 9.0 + 16.0 + 15.0));
        assert!((distance(Distance::Cosine, &[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-12);
        assert_eq!(distance(Distance::Euclidean, &[1.0], &[1.0, 2.0]), f64::INFINITY);
    }
}

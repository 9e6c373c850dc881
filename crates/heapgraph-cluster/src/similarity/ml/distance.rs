//! Pairwise cosine distances in condensed form.

use std::cmp::Ordering;

use super::tfidf::SparseVector;

/// Position of pair `(i, j)`, `i != j`, in a condensed upper-triangle matrix.
pub(crate) fn condensed_index(n: usize, i: usize, j: usize) -> usize {
    let (i, j) = if i < j { (i, j) } else { (j, i) };
    n * i - i * (i + 1) / 2 + (j - i - 1)
}

/// `1 - a·b` for normalised sparse rows; only shared features contribute.
pub(crate) fn cosine_distance(a: &SparseVector, b: &SparseVector) -> f64 {
    let (mut i, mut j) = (0, 0);
    let mut dot = 0.0;
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                dot += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    f64::max(0.0, 1.0 - dot)
}

pub(crate) fn pairwise_distances(rows: &[SparseVector]) -> Vec<f64> {
    let n = rows.len();
    let mut distances = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in i + 1..n {
            distances.push(cosine_distance(&rows[i], &rows[j]));
        }
    }
    distances
}

#[cfg(test)]
mod tests {
    use smallvec::smallvec;

    use super::*;

    #[test]
    fn condensed_layout_matches_push_order() {
        let n = 5;
        let mut expected = 0;
        for i in 0..n {
            for j in i + 1..n {
                assert_eq!(condensed_index(n, i, j), expected);
                assert_eq!(condensed_index(n, j, i), expected);
                expected += 1;
            }
        }
    }

    #[test]
    fn cosine_uses_shared_features_only() {
        let h = std::f64::consts::FRAC_1_SQRT_2;
        let a: SparseVector = smallvec![(0, h), (2, h)];
        let b: SparseVector = smallvec![(2, h), (5, h)];
        let c: SparseVector = smallvec![(7, 1.0)];
        assert!((cosine_distance(&a, &b) - 0.5).abs() < 1e-12);
        assert_eq!(cosine_distance(&a, &c), 1.0);
        assert!(cosine_distance(&a, &a) < 1e-12);

        let all = pairwise_distances(&[a, b, c]);
        assert_eq!(all.len(), 3);
        assert_eq!(all[condensed_index(3, 1, 2)], 1.0);
    }
}

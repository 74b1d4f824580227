//! Vector helpers for unit-normalized embeddings.

/// L2-normalize a vector in place. Zero vectors are left untouched.
pub fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Inner product. Equals cosine similarity when both operands are unit-normalized.
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Whether `v` has L2 norm within `tolerance` of 1.
pub fn is_unit(v: &[f32], tolerance: f32) -> bool {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    (norm - 1.0).abs() <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(v: &[f32]) -> Vec<f32> {
        let mut v = v.to_vec();
        normalize(&mut v);
        v
    }

    #[test]
    fn normalize_to_unit_length() {
        let v = unit(&[3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert!(is_unit(&v, 1e-5));
    }

    #[test]
    fn zero_vector_unchanged() {
        let v = unit(&[0.0, 0.0, 0.0]);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
        assert!(!is_unit(&v, 1e-5));
    }

    #[test]
    fn self_similarity_is_one() {
        let v = unit(&[0.2, -1.3, 4.1, 0.7]);
        assert!((inner_product(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn similarity_within_bounds() {
        let samples = [
            [1.0, 0.0, 0.0],
            [-1.0, 0.0, 0.0],
            [0.3, -0.2, 0.9],
            [-5.0, 2.0, 0.1],
            [0.0, 0.0, 1.0],
        ];
        for a in &samples {
            for b in &samples {
                let s = inner_product(&unit(a), &unit(b));
                assert!((-1.0 - 1e-5..=1.0 + 1e-5).contains(&s), "{s} out of range");
            }
        }
        let opposite = inner_product(&unit(&samples[0]), &unit(&samples[1]));
        assert!((opposite + 1.0).abs() < 1e-6);
    }
}

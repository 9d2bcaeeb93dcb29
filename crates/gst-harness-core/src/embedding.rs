//! Vector math used by the record set.
//!
//! The embedding *provider* abstraction lives in the app crate; this
//! module only holds the pure helpers that ranking depends on.

/// Euclidean norm of a vector.
pub fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Returns `true` if the vector has (numerically) zero length.
pub fn is_zero_norm(v: &[f32]) -> bool {
    norm(v) < f32::EPSILON
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `None` when the similarity is undefined: vectors of different
/// lengths, empty vectors, either vector with zero norm, or non-finite
/// components. Callers decide how to rank an undefined similarity instead
/// of propagating NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let (na, nb) = (norm_a.sqrt(), norm_b.sqrt());
    if na < f32::EPSILON || nb < f32::EPSILON {
        return None;
    }

    let sim = dot / (na * nb);
    if !sim.is_finite() {
        return None;
    }
    Some(sim.clamp(-1.0, 1.0))
}

/// A zero vector of the given dimension, used when embedding fails.
pub fn zero_vector(dims: usize) -> Vec<f32> {
    vec![0.0; dims]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).unwrap();
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]).unwrap();
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_undefined_cases() {
        assert_eq!(cosine_similarity(&[], &[]), None);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), None);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), None);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]), None);
    }

    #[test]
    fn test_cosine_short_vectors_still_defined() {
        let tiny = [1e-4, 0.0];
        let sim = cosine_similarity(&tiny, &tiny).unwrap();
        assert!((sim - 1.0).abs() < 1e-5);

        let sim = cosine_similarity(&tiny, &[-3.0, 0.0]).unwrap();
        assert!((sim + 1.0).abs() < 1e-5);
        assert!(!is_zero_norm(&tiny));
    }

    #[test]
    fn test_zero_vector() {
        let z = zero_vector(4);
        assert_eq!(z.len(), 4);
        assert!(is_zero_norm(&z));
        assert!(!is_zero_norm(&[0.0, 3.0]));
    }
}

//! Vector math shared by the matcher and the feedback adjuster.
//!
//! Accumulation happens in f64 in a fixed element order so the same inputs
//! always produce bit-identical results.

/// Cosine similarity in f64. Zero-magnitude inputs yield 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}

pub fn magnitude(v: &[f32]) -> f64 {
    v.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>().sqrt()
}

/// Scales `v` in place to the given magnitude. Zero vectors are left alone.
pub fn rescale(v: &mut [f32], target: f64) {
    let current = magnitude(v);
    if current == 0.0 {
        return;
    }
    let factor = target / current;
    for value in v.iter_mut() {
        *value = (f64::from(*value) * factor) as f32;
    }
}

/// Moves `v` by `step` along `target - v` (negative `step` moves away),
/// then restores the original magnitude.
pub fn nudge(v: &[f32], target: &[f32], step: f32) -> Vec<f32> {
    debug_assert_eq!(v.len(), target.len(), "Vectors must have same dimension");

    let original = magnitude(v);
    let mut moved: Vec<f32> = v
        .iter()
        .zip(target.iter())
        .map(|(x, t)| x + step * (t - x))
        .collect();
    rescale(&mut moved, original);
    moved
}

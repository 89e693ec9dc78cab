//! Text and vector similarity helpers shared by retrieval and query dedup.

use std::collections::HashSet;

/// Lowercase alphanumeric terms of at least two characters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.chars().count() >= 2)
        .map(str::to_lowercase)
        .collect()
}

/// Token-set Jaccard similarity in `[0, 1]`. Two texts without any terms are
/// treated as identical.
pub fn jaccard_similarity(a: &str, b: &str) -> f32 {
    let terms_a: HashSet<String> = tokenize(a).into_iter().collect();
    let terms_b: HashSet<String> = tokenize(b).into_iter().collect();

    if terms_a.is_empty() && terms_b.is_empty() {
        return 1.0;
    }

    let intersection = terms_a.intersection(&terms_b).count();
    let union = terms_a.union(&terms_b).count();

    #[allow(clippy::cast_precision_loss)]
    let score = intersection as f32 / union as f32;
    score
}

/// Cosine similarity; 0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

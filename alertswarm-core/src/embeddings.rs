//! Local text embeddings for the in-process similarity index.
//!
//! Hashed term-frequency vectors with L2 normalization. Good enough to rank
//! alert descriptions that share IPs, usernames, hashes, and keywords; a
//! deployment with a vector database plugs its own `SimilaritySearch` in instead.

use std::collections::HashMap;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Maps text to a fixed-width vector.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;

    fn dimensions(&self) -> usize;
}

/// Feature-hashing embedder with sublinear term weights.
#[derive(Debug, Clone)]
pub struct LocalEmbedder {
    dimensions: usize,
}

impl LocalEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn bucket(&self, term: &str) -> usize {
        let hash = term
            .bytes()
            .fold(FNV_OFFSET, |h, b| (h ^ u64::from(b)).wrapping_mul(FNV_PRIME));
        (hash % self.dimensions as u64) as usize
    }
}

impl Default for LocalEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Lowercase terms. Dots, colons, hyphens, and underscores stay inside a
/// term so IPs, hashes, and hostnames are kept whole.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || matches!(c, '.' | ':' | '-' | '_')))
        .map(|w| w.trim_matches(|c: char| matches!(c, '.' | ':' | '-' | '_')))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

impl Embedder for LocalEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut counts: HashMap<String, u32> = HashMap::new();
        for term in tokenize(text) {
            *counts.entry(term).or_default() += 1;
        }

        let mut vector = vec![0.0f32; self.dimensions];
        for (term, count) in counts {
            // 1 + ln(tf): repeated words count, but not linearly.
            vector[self.bucket(&term)] += 1.0 + (count as f32).ln();
        }

        let norm = l2_norm(&vector);
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Cosine of the angle between `a` and `b`; 0.0 for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let denom = l2_norm(a) * l2_norm(b);
    if denom == 0.0 {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>() / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_keeps_ips_whole() {
        let terms: Vec<String> = tokenize("Login from 10.0.0.5, user=ADMIN.").collect();
        assert!(terms.contains(&"10.0.0.5".to_string()));
        assert!(terms.contains(&"admin".to_string()));
    }

    #[test]
    fn test_embed_is_normalized() {
        let e = LocalEmbedder::new(64);
        let v = e.embed("ssh brute force from 1.2.3.4");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert_eq!(e.dimensions(), 64);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let e = LocalEmbedder::default();
        assert!(e.embed("  ").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_similar_texts_rank_higher() {
        let e = LocalEmbedder::default();
        let query = e.embed("ip 185.220.101.1 user jdoe");
        let close = e.embed("Tor exit 185.220.101.1 scanning, account jdoe locked");
        let far = e.embed("printer out of toner on floor three");
        assert!(cosine_similarity(&query, &close) > cosine_similarity(&query, &far));
    }

    #[test]
    fn test_repeated_terms_are_damped() {
        let e = LocalEmbedder::new(1);
        // Single bucket: weight is 1 + ln(4) for one term repeated four times.
        let v = LocalEmbedder::new(1024).embed("scan scan scan scan probe");
        let nonzero: Vec<f32> = v.iter().copied().filter(|x| *x > 0.0).collect();
        assert_eq!(nonzero.len(), 2);
        let ratio = nonzero[0].max(nonzero[1]) / nonzero[0].min(nonzero[1]);
        assert!((ratio - (1.0 + 4f32.ln())).abs() < 1e-4);
        assert_eq!(e.embed("anything"), vec![1.0]);
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}

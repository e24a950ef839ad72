use std::collections::BTreeMap;

use crate::recognition::domain::identity_matcher::Candidate;

/// One enrolment embedding. A student may have several.
#[derive(Clone, Debug)]
pub struct GalleryEntry {
    pub identity: String,
    pub embedding: Vec<f32>,
}

/// Known identities and their enrolment embeddings.
#[derive(Clone, Debug, Default)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    pub fn push(&mut self, identity: impl Into<String>, embedding: Vec<f32>) {
        self.entries.push(GalleryEntry {
            identity: identity.into(),
            embedding,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct identities, sorted.
    pub fn identities(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.entries.iter().map(|e| e.identity.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// The `top_k` identities closest to `query`, ascending by distance.
    ///
    /// Each identity is scored by its best enrolment embedding. Candidates
    /// beyond `max_distance` are dropped; equal distances order by identity.
    pub fn nearest(&self, query: &[f32], top_k: usize, max_distance: Option<f64>) -> Vec<Candidate> {
        let mut best: BTreeMap<&str, f64> = BTreeMap::new();
        for entry in &self.entries {
            if entry.embedding.len() != query.len() {
                log::warn!(
                    "Skipping gallery embedding for {}: dimension {} != {}",
                    entry.identity,
                    entry.embedding.len(),
                    query.len()
                );
                continue;
            }
            let distance = cosine_distance(query, &entry.embedding);
            if !distance.is_finite() {
                continue;
            }
            best.entry(entry.identity.as_str())
                .and_modify(|d| *d = d.min(distance))
                .or_insert(distance);
        }

        let mut ranked: Vec<Candidate> = best
            .into_iter()
            .filter(|(_, d)| max_distance.map_or(true, |max| *d <= max))
            .map(|(id, d)| Candidate::new(id, d))
            .collect();
        ranked.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.identity.cmp(&b.identity))
        });
        ranked.truncate(top_k);
        ranked
    }
}

/// `1 - a·b` for L2-normalised vectors, floored at 0.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(&x, &y)| x as f64 * y as f64).sum();
    (1.0 - dot).max(0.0)
}

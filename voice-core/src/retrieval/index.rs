//! TF-IDF index over the facts catalog.

use std::collections::HashMap;

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "of", "to", "in", "on", "for",
    "and", "or", "with", "at", "by", "from", "as", "it", "this", "that", "these", "those",
];

/// Lowercases, strips non-alphanumeric characters, and drops stopwords and
/// single-character tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|tok| tok.len() > 1 && !STOPWORDS.contains(tok))
        .map(str::to_string)
        .collect()
}

struct Document {
    term_weights: HashMap<String, f64>,
    norm: f64,
}

/// A TF-IDF index over a fixed set of documents, identified by index
/// position. Built once at startup and queried read-only thereafter.
pub struct TfIdfIndex {
    documents: Vec<Document>,
    idf: HashMap<String, f64>,
}

impl TfIdfIndex {
    /// Builds an index from `docs`, each a tokenizable piece of text. The
    /// returned index's document ids correspond to `docs`' positions.
    #[must_use]
    pub fn build(docs: &[String]) -> Self {
        let tokenized: Vec<Vec<String>> = docs.iter().map(|d| tokenize(d)).collect();
        let n = tokenized.len();

        let mut document_frequency: HashMap<String, usize> = HashMap::new();
        for tokens in &tokenized {
            let mut seen = std::collections::HashSet::new();
            for token in tokens {
                if seen.insert(token.clone()) {
                    *document_frequency.entry(token.clone()).or_insert(0) += 1;
                }
            }
        }

        let idf: HashMap<String, f64> = document_frequency
            .iter()
            .map(|(term, df)| {
                let value = ((1.0 + n as f64) / (1.0 + *df as f64)).ln() + 1.0;
                (term.clone(), value)
            })
            .collect();

        let documents = tokenized
            .iter()
            .map(|tokens| {
                let total = tokens.len().max(1) as f64;
                let mut counts: HashMap<String, usize> = HashMap::new();
                for token in tokens {
                    *counts.entry(token.clone()).or_insert(0) += 1;
                }
                let mut term_weights = HashMap::new();
                let mut sum_sq = 0.0;
                for (term, count) in counts {
                    let tf = count as f64 / total;
                    let weight = tf * idf.get(&term).copied().unwrap_or(0.0);
                    sum_sq += weight * weight;
                    term_weights.insert(term, weight);
                }
                Document {
                    term_weights,
                    norm: sum_sq.sqrt(),
                }
            })
            .collect();

        Self { documents, idf }
    }

    /// Returns the top-`k` document indices by descending cosine similarity
    /// to `query`, including only scores greater than zero.
    #[must_use]
    pub fn query(&self, query: &str, top_k: usize) -> Vec<(usize, f64)> {
        let tokens = tokenize(query);
        let total = tokens.len().max(1) as f64;
        let mut query_counts: HashMap<String, usize> = HashMap::new();
        for token in &tokens {
            *query_counts.entry(token.clone()).or_insert(0) += 1;
        }

        let mut query_weights = HashMap::new();
        let mut query_norm_sq = 0.0;
        for (term, count) in &query_counts {
            let tf = *count as f64 / total;
            let weight = tf * self.idf.get(term).copied().unwrap_or(0.0);
            query_norm_sq += weight * weight;
            query_weights.insert(term.clone(), weight);
        }
        let query_norm = query_norm_sq.sqrt();
        if query_norm == 0.0 {
            return Vec::new();
        }

        let mut scores: Vec<(usize, f64)> = self
            .documents
            .iter()
            .enumerate()
            .filter_map(|(idx, doc)| {
                if doc.norm == 0.0 {
                    return None;
                }
                let dot: f64 = query_weights
                    .iter()
                    .map(|(term, qw)| qw * doc.term_weights.get(term).copied().unwrap_or(0.0))
                    .sum();
                let score = dot / (query_norm * doc.norm);
                if score > 0.0 {
                    Some((idx, score))
                } else {
                    None
                }
            })
            .collect();

        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        scores.truncate(top_k);
        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_ranks_exact_topic_match_first() {
        let docs = vec![
            "NextGen AI delivers low latency responses".to_string(),
            "Our weather forecast is sunny".to_string(),
            "NextGen AI performance benchmarks show strong throughput".to_string(),
        ];
        let index = TfIdfIndex::build(&docs);
        let results = index.query("NextGen AI performance", 2);
        assert!(!results.is_empty());
        assert_eq!(results[0].0, 2);
    }

    #[test]
    fn empty_query_returns_nothing() {
        let docs = vec!["some document text".to_string()];
        let index = TfIdfIndex::build(&docs);
        assert!(index.query("", 5).is_empty());
    }

    #[test]
    fn unrelated_query_scores_zero_and_is_excluded() {
        let docs = vec!["apples and oranges".to_string()];
        let index = TfIdfIndex::build(&docs);
        assert!(index.query("quantum computing", 5).is_empty());
    }
}

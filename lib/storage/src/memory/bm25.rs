// BM25 index used for fulltext queries on TEXT attributes
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct Bm25Index {
    // term -> (doc_id -> term_frequency)
    inverted_index: HashMap<String, HashMap<String, u32>>,
    // doc_id -> document length
    doc_lengths: HashMap<String, u32>,
    // term -> document frequency
    term_dfs: HashMap<String, u32>,
    total_docs: u64,
    k1: f32, // term frequency saturation parameter
    b: f32,  // length normalization parameter
}

impl Bm25Index {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            inverted_index: HashMap::new(),
            doc_lengths: HashMap::new(),
            term_dfs: HashMap::new(),
            total_docs: 0,
            k1: 1.2,
            b: 0.75,
        }
    }

    /// Lowercases and splits on whitespace and punctuation
    #[inline]
    pub fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
            .map(|s| s.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn insert_doc(&mut self, doc_id: &str, text: &str) {
        self.delete_doc(doc_id);

        let tokens = Self::tokenize(text);
        let doc_len = tokens.len() as u32;

        let mut term_freqs: HashMap<String, u32> = HashMap::new();
        for token in tokens {
            *term_freqs.entry(token).or_insert(0) += 1;
        }

        for (term, tf) in &term_freqs {
            self.inverted_index
                .entry(term.clone())
                .or_default()
                .insert(doc_id.to_string(), *tf);
            *self.term_dfs.entry(term.clone()).or_insert(0) += 1;
        }

        self.doc_lengths.insert(doc_id.to_string(), doc_len);
        self.total_docs += 1;
    }

    pub fn delete_doc(&mut self, doc_id: &str) {
        if self.doc_lengths.remove(doc_id).is_none() {
            return;
        }
        let mut emptied = Vec::new();
        for (term, docs) in &mut self.inverted_index {
            if docs.remove(doc_id).is_some() {
                if let Some(df) = self.term_dfs.get_mut(term) {
                    *df = df.saturating_sub(1);
                }
                if docs.is_empty() {
                    emptied.push(term.clone());
                }
            }
        }
        for term in emptied {
            self.inverted_index.remove(&term);
            self.term_dfs.remove(&term);
        }
        self.total_docs = self.total_docs.saturating_sub(1);
    }

    /// Scores documents containing every query term, best first.
    pub fn search(&self, query: &str, limit: usize) -> Vec<(String, f32)> {
        if self.total_docs == 0 {
            return Vec::new();
        }

        let query_terms: HashSet<String> = Self::tokenize(query).into_iter().collect();
        if query_terms.is_empty() {
            return Vec::new();
        }

        let avgdl = self.doc_lengths.values().sum::<u32>() as f32 / self.total_docs as f32;

        // doc -> (score, matched terms)
        let mut doc_scores: HashMap<&str, (f32, usize)> = HashMap::new();
        for term in &query_terms {
            let Some(docs) = self.inverted_index.get(term) else {
                return Vec::new();
            };
            let df = self.term_dfs.get(term).copied().unwrap_or(0) as f32;
            // +1 keeps the idf positive for terms present in most documents
            let idf = ((self.total_docs as f32 - df + 0.5) / (df + 0.5) + 1.0).ln();

            for (doc_id, &tf) in docs {
                if let Some(&doc_len) = self.doc_lengths.get(doc_id) {
                    let score = self.score(tf, doc_len, avgdl, idf);
                    let entry = doc_scores.entry(doc_id.as_str()).or_insert((0.0, 0));
                    entry.0 += score;
                    entry.1 += 1;
                }
            }
        }

        let mut results: Vec<(String, f32)> = doc_scores
            .into_iter()
            .filter(|(_, (_, matched))| *matched == query_terms.len())
            .map(|(doc, (score, _))| (doc.to_string(), score))
            .collect();
        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        results
    }

    fn score(&self, tf: u32, doc_len: u32, avgdl: f32, idf: f32) -> f32 {
        let tf = tf as f32;
        let numerator = tf * (self.k1 + 1.0);
        let denominator = tf + self.k1 * (1.0 - self.b + self.b * (doc_len as f32 / avgdl.max(1.0)));
        idf * (numerator / denominator)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.doc_lengths.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.doc_lengths.is_empty()
    }
}

impl Default for Bm25Index {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_requires_all_terms() {
        let mut index = Bm25Index::new();
        index.insert_doc("a", "A black cat on a red sofa");
        index.insert_doc("b", "A black dog");
        index.insert_doc("c", "Cats and dogs");

        let hits = index.search("black cat", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "a");
        assert_eq!(index.search("black", 10).len(), 2);
        assert!(index.search("unicorn", 10).is_empty());
    }

    #[test]
    fn test_reinsert_replaces_document() {
        let mut index = Bm25Index::new();
        index.insert_doc("a", "sunset beach");
        index.insert_doc("a", "mountain lake");
        assert_eq!(index.len(), 1);
        assert!(index.search("beach", 10).is_empty());
        index.delete_doc("a");
        assert!(index.is_empty());
        assert!(index.search("lake", 10).is_empty());
    }
}

use std::collections::{HashMap, HashSet};

pub const DEFAULT_K1: f64 = 1.5;
pub const DEFAULT_B: f64 = 0.75;

/// Lower-cased alphanumeric tokens
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Okapi BM25 over a fixed document set
#[derive(Debug, Clone)]
pub struct Bm25Index {
    term_freqs: Vec<HashMap<String, usize>>,
    doc_lens: Vec<usize>,
    avg_doc_len: f64,
    doc_freqs: HashMap<String, usize>,
    k1: f64,
    b: f64,
}

impl Bm25Index {
    pub fn new<S: AsRef<str>>(documents: &[S]) -> Self {
        Self::with_params(documents, DEFAULT_K1, DEFAULT_B)
    }

    pub fn with_params<S: AsRef<str>>(documents: &[S], k1: f64, b: f64) -> Self {
        let mut term_freqs = Vec::with_capacity(documents.len());
        let mut doc_lens = Vec::with_capacity(documents.len());
        let mut doc_freqs: HashMap<String, usize> = HashMap::new();

        for document in documents {
            let tokens = tokenize(document.as_ref());
            doc_lens.push(tokens.len());

            let mut freqs: HashMap<String, usize> = HashMap::new();
            for token in tokens {
                *freqs.entry(token).or_default() += 1;
            }
            for term in freqs.keys() {
                *doc_freqs.entry(term.clone()).or_default() += 1;
            }
            term_freqs.push(freqs);
        }

        let avg_doc_len = if doc_lens.is_empty() {
            0.0
        } else {
            doc_lens.iter().sum::<usize>() as f64 / doc_lens.len() as f64
        };

        Self {
            term_freqs,
            doc_lens,
            avg_doc_len,
            doc_freqs,
            k1,
            b,
        }
    }

    pub fn len(&self) -> usize {
        self.doc_lens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lens.is_empty()
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.len() as f64;
        let df = self.doc_freqs.get(term).copied().unwrap_or(0) as f64;
        // the +1 keeps idf positive for terms present in most documents
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// One score per document, in document order. Repeated query terms count once.
    pub fn scores(&self, query: &str) -> Vec<f64> {
        let mut seen = HashSet::new();
        let terms: Vec<String> = tokenize(query)
            .into_iter()
            .filter(|term| seen.insert(term.clone()))
            .collect();

        self.term_freqs
            .iter()
            .zip(&self.doc_lens)
            .map(|(freqs, &len)| {
                let norm = if self.avg_doc_len > 0.0 {
                    1.0 - self.b + self.b * len as f64 / self.avg_doc_len
                } else {
                    1.0
                };
                terms
                    .iter()
                    .filter_map(|term| freqs.get(term).map(|&tf| (term, tf as f64)))
                    .map(|(term, tf)| self.idf(term) * tf * (self.k1 + 1.0) / (tf + self.k1 * norm))
                    .sum::<f64>()
            })
            .collect()
    }
}

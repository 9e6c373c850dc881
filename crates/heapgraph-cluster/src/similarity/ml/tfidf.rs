//! Trace tokenization and TF-IDF vectors.

use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;

use crate::config::MlConfig;
use crate::trace::LeakTrace;

const NULL_TOKEN: &str = "_null_";
const NUMBER_TOKEN: &str = "_number_";

/// Sparse row sorted by feature id, L2-normalised.
pub(crate) type SparseVector = SmallVec<[(u32, f64); 8]>;

/// One token per element: spaces become `_`, ASCII digits are dropped.
pub(crate) fn tokenize(trace: &LeakTrace) -> Vec<String> {
    trace
        .elements
        .iter()
        .map(|element| token(&element.label()))
        .collect()
}

fn token(label: &str) -> String {
    if label.is_empty() {
        return NULL_TOKEN.to_string();
    }
    let token: String = label
        .chars()
        .filter(|c| !c.is_ascii_digit())
        .map(|c| if c == ' ' { '_' } else { c })
        .collect();
    if token.is_empty() {
        NUMBER_TOKEN.to_string()
    } else {
        token
    }
}

fn ngrams(tokens: &[String], min: usize, max: usize) -> impl Iterator<Item = String> + '_ {
    (min..=max).flat_map(move |n| tokens.windows(n).map(|window| window.join(" ")))
}

/// Fits the vocabulary on `documents` and returns one vector per document.
///
/// Terms whose document frequency exceeds `max_df` are dropped, unless that
/// would leave no term shared by two documents (tiny batches, or batches of
/// near-duplicates); then every term is kept. A document left without terms
/// gets a shared sentinel feature, so fully generic traces end up at
/// distance zero from each other.
pub(crate) fn fit_transform(documents: &[Vec<String>], config: &MlConfig) -> Vec<SparseVector> {
    let n = documents.len();
    let mut vocabulary: IndexSet<String> = IndexSet::new();
    let mut document_frequency: Vec<usize> = Vec::new();
    let mut term_counts: Vec<IndexMap<usize, f64>> = Vec::with_capacity(n);

    for document in documents {
        let mut counts: IndexMap<usize, f64> = IndexMap::new();
        for term in ngrams(document, config.ngram_min, config.ngram_max) {
            let (id, inserted) = vocabulary.insert_full(term);
            if inserted {
                document_frequency.push(0);
            }
            *counts.entry(id).or_insert(0.0) += 1.0;
        }
        for &id in counts.keys() {
            document_frequency[id] += 1;
        }
        term_counts.push(counts);
    }

    let too_common = |df: usize| df as f64 / n as f64 > config.max_df;
    let prune = document_frequency
        .iter()
        .any(|&df| df >= 2 && !too_common(df));

    // Compact ids for surviving terms, plus their smoothed idf.
    let mut feature_of: Vec<Option<u32>> = vec![None; vocabulary.len()];
    let mut idf: Vec<f64> = Vec::new();
    for (term, &df) in document_frequency.iter().enumerate() {
        if !prune || !too_common(df) {
            feature_of[term] = Some(idf.len() as u32);
            idf.push(((1 + n) as f64 / (1 + df) as f64).ln() + 1.0);
        }
    }
    let sentinel = idf.len() as u32;
    tracing::debug!(
        documents = n,
        terms = vocabulary.len(),
        kept = idf.len(),
        prune,
        "fitted tf-idf vocabulary"
    );

    term_counts
        .into_iter()
        .map(|counts| {
            let mut row: SparseVector = counts
                .into_iter()
                .filter_map(|(term, tf)| {
                    feature_of[term].map(|feature| (feature, tf * idf[feature as usize]))
                })
                .collect();
            if row.is_empty() {
                row.push((sentinel, 1.0));
                return row;
            }
            row.sort_unstable_by_key(|&(feature, _)| feature);
            let norm = row.iter().map(|&(_, v)| v * v).sum::<f64>().sqrt();
            for entry in row.iter_mut() {
                entry.1 /= norm;
            }
            row
        })
        .collect()
}

//! Text utilities for the enrichment stage.
//!
//! - [`clean_html`] — strip HTML tags and decode entities from comment
//!   text before sentiment scoring. Minimal hand-written parsing, no
//!   extra dependencies (HN comment markup is a small, flat subset of
//!   HTML).
//! - [`tokenize`] — lowercase word tokens of two or more alphanumeric
//!   characters, with English stop words removed.
//! - [`TfidfModel`] — a term-frequency/inverse-document-frequency model
//!   fitted per partition over story titles, with a bounded vocabulary.

use std::collections::HashMap;

/// Strip HTML tags, decode entities, and collapse whitespace.
///
/// Tags are replaced by a single space so that adjacent words do not
/// fuse (`"a<b>b</b>"` → `"a b"`). Returns an empty string when nothing
/// textual remains.
pub fn clean_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '<' => {
                // Skip to the closing '>' and emit a separator.
                for t in chars.by_ref() {
                    if t == '>' {
                        break;
                    }
                }
                out.push(' ');
            }
            '&' => {
                let mut entity = String::new();
                let mut terminated = false;
                while let Some(&next) = chars.peek() {
                    if next == ';' {
                        chars.next();
                        terminated = true;
                        break;
                    }
                    if next == '&' || next == '<' || entity.len() > 8 {
                        break;
                    }
                    entity.push(next);
                    chars.next();
                }
                if terminated {
                    match decode_entity(&entity) {
                        Some(decoded) => out.push(decoded),
                        None => {
                            out.push('&');
                            out.push_str(&entity);
                            out.push(';');
                        }
                    }
                } else {
                    out.push('&');
                    out.push_str(&entity);
                }
            }
            _ => out.push(c),
        }
    }

    // Collapse runs of whitespace into single spaces.
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let num = entity.strip_prefix('#')?;
            let code = if let Some(hex) = num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                num.parse::<u32>().ok()?
            };
            char::from_u32(code)
        }
    }
}

/// Lowercase word tokens (alphanumeric runs of length ≥ 2), stop words
/// removed.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        if c.is_alphanumeric() || c == '_' {
            current.extend(c.to_lowercase());
        } else if !current.is_empty() {
            push_token(&mut tokens, std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        push_token(&mut tokens, current);
    }

    tokens
}

fn push_token(tokens: &mut Vec<String>, token: String) {
    if token.chars().count() >= 2 && !STOP_WORDS.contains(&token.as_str()) {
        tokens.push(token);
    }
}

/// English stop words excluded from topic extraction.
const STOP_WORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "cannot", "could", "did", "do", "does", "doing", "down", "during", "each", "few",
    "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers",
    "herself", "him", "himself", "his", "how", "if", "in", "into", "is", "it", "its", "itself",
    "just", "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on",
    "once", "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same",
    "she", "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves",
];

/// A TF-IDF model fitted over one partition's tokenized documents.
///
/// The vocabulary is bounded: only the `max_features` terms with the
/// highest total frequency across the corpus are kept (ties broken
/// alphabetically). IDF uses the smoothed form
/// `ln((1 + n_docs) / (1 + df)) + 1`, so every vocabulary term has a
/// strictly positive weight wherever it occurs.
pub struct TfidfModel {
    index: HashMap<String, usize>,
    terms: Vec<String>,
    idf: Vec<f64>,
}

impl TfidfModel {
    /// Fit over tokenized documents. Returns `None` when no usable
    /// vocabulary remains (e.g. every document tokenized to nothing).
    pub fn fit(docs: &[Vec<String>], max_features: usize) -> Option<Self> {
        let mut total_counts: HashMap<&str, u64> = HashMap::new();
        let mut doc_freq: HashMap<&str, u64> = HashMap::new();

        for doc in docs {
            let mut seen: Vec<&str> = Vec::new();
            for term in doc {
                *total_counts.entry(term).or_insert(0) += 1;
                if !seen.contains(&term.as_str()) {
                    seen.push(term);
                }
            }
            for term in seen {
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        if total_counts.is_empty() {
            return None;
        }

        let mut ranked: Vec<(&str, u64)> = total_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(max_features);

        let mut terms: Vec<String> = ranked.iter().map(|(t, _)| t.to_string()).collect();
        terms.sort();

        let n_docs = docs.len() as f64;
        let idf: Vec<f64> = terms
            .iter()
            .map(|t| {
                let df = doc_freq.get(t.as_str()).copied().unwrap_or(0) as f64;
                ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0
            })
            .collect();

        let index = terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();

        Some(Self { index, terms, idf })
    }

    /// Number of vocabulary terms.
    pub fn vocabulary_len(&self) -> usize {
        self.terms.len()
    }

    /// The `top_n` highest-weighted vocabulary terms for one document,
    /// restricted to strictly positive weights, in descending order.
    pub fn top_terms(&self, doc: &[String], top_n: usize) -> Vec<&str> {
        let mut counts = vec![0u64; self.terms.len()];
        for term in doc {
            if let Some(&i) = self.index.get(term.as_str()) {
                counts[i] += 1;
            }
        }

        let mut weighted: Vec<(usize, f64)> = counts
            .iter()
            .enumerate()
            .filter(|(_, &c)| c > 0)
            .map(|(i, &c)| (i, c as f64 * self.idf[i]))
            .collect();
        weighted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        weighted
            .into_iter()
            .take(top_n)
            .map(|(i, _)| self.terms[i].as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_html_strips_tags_and_decodes_entities() {
        let cleaned = clean_html("<p>This is <b>absolutely wonderful</b>!</p>");
        assert_eq!(cleaned, "This is absolutely wonderful !");

        assert_eq!(clean_html("a&amp;b &lt;ok&gt;"), "a&b <ok>");
        assert_eq!(clean_html("caf&#233;"), "café");
        assert_eq!(clean_html("x&#x41;y"), "xAy");
    }

    #[test]
    fn test_clean_html_empty_and_unterminated() {
        assert_eq!(clean_html(""), "");
        assert_eq!(clean_html("<p></p>"), "");
        // An unterminated entity passes through literally.
        assert_eq!(clean_html("AT&T rocks"), "AT&T rocks");
    }

    #[test]
    fn test_tokenize_lowercases_and_filters() {
        let tokens = tokenize("The Quick Brown Fox, v2 API!");
        assert_eq!(tokens, vec!["quick", "brown", "fox", "v2", "api"]);
    }

    #[test]
    fn test_tokenize_drops_single_chars_and_stop_words() {
        assert!(tokenize("a I the and of").is_empty());
    }

    #[test]
    fn test_tfidf_rare_terms_outrank_common_ones() {
        let docs: Vec<Vec<String>> = vec![
            tokenize("rust compiler performance"),
            tokenize("rust memory safety"),
            tokenize("rust async runtime"),
        ];
        let model = TfidfModel::fit(&docs, 100).unwrap();

        // "rust" appears in every doc, "compiler" only in one, so
        // "compiler" carries the higher weight for the first doc.
        let top = model.top_terms(&docs[0], 3);
        assert_eq!(top.len(), 3);
        assert!(top[..2].contains(&"compiler") || top[..2].contains(&"performance"));
        assert_eq!(top[2], "rust");
    }

    #[test]
    fn test_tfidf_empty_corpus_yields_no_model() {
        let docs: Vec<Vec<String>> = vec![tokenize(""), tokenize("a the of")];
        assert!(TfidfModel::fit(&docs, 100).is_none());
    }

    #[test]
    fn test_tfidf_vocabulary_is_bounded() {
        let docs: Vec<Vec<String>> = (0..50)
            .map(|i| vec![format!("term{i:02}"), format!("term{:02}", i / 2)])
            .collect();
        let model = TfidfModel::fit(&docs, 10).unwrap();
        assert_eq!(model.vocabulary_len(), 10);
    }

    #[test]
    fn test_tfidf_top_terms_only_positive_weights() {
        let docs: Vec<Vec<String>> = vec![tokenize("alpha beta"), tokenize("gamma delta")];
        let model = TfidfModel::fit(&docs, 100).unwrap();
        // Only two of the four vocabulary terms occur in this doc.
        let top = model.top_terms(&docs[0], 3);
        assert_eq!(top.len(), 2);
    }
}

//! Professor-name extraction from a query.

use crate::types::RetrievedReview;

/// Professors among `candidates` that the query refers to.
///
/// A name matches when the whole name, or any one of its words, occurs in the
/// lower-cased query. Words are trimmed of surrounding punctuation so that an
/// initial such as "A." contributes "a". Names are returned once each, in the
/// order they first appear among the candidates, and only names taken from
/// the candidates are ever returned.
pub fn extract(query: &str, candidates: &[RetrievedReview]) -> Vec<String> {
    let query = query.to_lowercase();
    let mut found: Vec<String> = Vec::new();
    for candidate in candidates {
        let name = candidate.professor();
        if name.trim().is_empty() || found.iter().any(|f| f == name) {
            continue;
        }
        if mentions(&query, name) {
            found.push(name.to_string());
        }
    }
    found
}

fn mentions(lowered_query: &str, name: &str) -> bool {
    let lowered_name = name.to_lowercase();
    if lowered_query.contains(lowered_name.trim()) {
        return true;
    }
    // An initial trims to one letter and matches most queries. Every match
    // costs a prediction call of up to the enrichment timeout.
    lowered_name
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|token| !token.is_empty())
        .any(|token| lowered_query.contains(token))
}

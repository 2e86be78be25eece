// Daybook - Relatedness Scorer
// Cheap keyword-overlap ranking used by the detail view's "related"
// section. Deliberately lexical: no stemming, no synonyms, no
// embeddings.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of related items surfaced per detail view
pub const DEFAULT_RELATED_LIMIT: usize = 5;

/// Minimum keyword length kept from the source text
const MIN_KEYWORD_LEN: usize = 4;

/// A candidate item to score against the source. The pool must be
/// same-owner, non-archived, exclude the source, and be pre-sorted by
/// recency: that order is the tiebreaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedCandidate {
    pub id: Uuid,
    pub text: String,
}

/// A ranked match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedMatch {
    pub id: Uuid,
    /// Count of source keywords with at least one bidirectional
    /// substring match in the candidate's tokens
    pub score: usize,
}

/// Lowercase, split on whitespace, strip non-alphanumerics, keep
/// tokens longer than three characters, dedupe.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for token in text.to_lowercase().split_whitespace() {
        let cleaned: String = token.chars().filter(|c| c.is_alphanumeric()).collect();
        if cleaned.len() >= MIN_KEYWORD_LEN && !keywords.contains(&cleaned) {
            keywords.push(cleaned);
        }
    }
    keywords
}

/// Tokenize candidate text the same way but without the length filter.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|t| t.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Count source keywords that match some candidate token in either
/// containment direction. Each keyword counts at most once.
pub fn score_text(keywords: &[String], candidate_text: &str) -> usize {
    let tokens = tokenize(candidate_text);
    keywords
        .iter()
        .filter(|kw| {
            tokens
                .iter()
                .any(|tok| tok.contains(kw.as_str()) || kw.contains(tok.as_str()))
        })
        .count()
}

/// Rank candidates against the source text. Zero-score candidates are
/// dropped; ties preserve the pool's recency order; at most `limit`
/// results. The source itself is never returned.
pub fn rank_related(
    source_id: Uuid,
    source_text: &str,
    pool: &[RelatedCandidate],
    limit: usize,
) -> Vec<RelatedMatch> {
    let keywords = extract_keywords(source_text);
    if keywords.is_empty() {
        return Vec::new();
    }

    let mut matches: Vec<RelatedMatch> = pool
        .iter()
        .filter(|c| c.id != source_id)
        .map(|c| RelatedMatch {
            id: c.id,
            score: score_text(&keywords, &c.text),
        })
        .filter(|m| m.score > 0)
        .collect();

    // Stable sort: equal scores keep the incoming recency order
    matches.sort_by(|a, b| b.score.cmp(&a.score));
    matches.truncate(limit);
    matches
}

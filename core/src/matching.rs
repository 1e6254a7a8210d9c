//! Helpers for picking one Site Record out of many given a free-text query.
//!
//! The network-bound LLM call lives in the runtime; everything here is pure so
//! the ranking rules can be tested directly.

use serde::{Deserialize, Serialize};

use crate::site::{SiteRecord, extract_address};

/// Minimum Jaro-Winkler score for a similarity match to count.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.88;

/// The compact view of a record sent to the LLM.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchCandidate {
    pub id: String,
    pub title: String,
    pub address: String,
}

impl MatchCandidate {
    pub fn from_record(record: &SiteRecord) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            address: extract_address(record).unwrap_or_default(),
        }
    }
}

pub fn build_candidates(records: &[SiteRecord]) -> Vec<MatchCandidate> {
    records.iter().map(MatchCandidate::from_record).collect()
}

/// First record whose title contains the query, case-insensitively.
pub fn title_contains_match<'a>(query: &str, records: &'a [SiteRecord]) -> Option<&'a SiteRecord> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    records
        .iter()
        .find(|record| record.title.to_lowercase().contains(&needle))
}

/// Best Jaro-Winkler match against title or address, if it clears `threshold`.
pub fn similarity_match<'a>(
    query: &str,
    records: &'a [SiteRecord],
    threshold: f64,
) -> Option<(&'a SiteRecord, f64)> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    records
        .iter()
        .map(|record| {
            let title_score = strsim::jaro_winkler(&needle, &record.title.to_lowercase());
            let address_score = extract_address(record)
                .map(|address| strsim::jaro_winkler(&needle, &address.to_lowercase()))
                .unwrap_or(0.0);
            (record, title_score.max(address_score))
        })
        .filter(|(_, score)| *score >= threshold)
        .max_by(|a, b| a.1.total_cmp(&b.1))
}

/// Ranking used when no LLM is configured: substring on title, then similarity.
pub fn rank_by_similarity<'a>(query: &str, records: &'a [SiteRecord]) -> Option<&'a SiteRecord> {
    title_contains_match(query, records).or_else(|| {
        similarity_match(query, records, DEFAULT_SIMILARITY_THRESHOLD).map(|(record, _)| record)
    })
}

pub fn system_prompt() -> &'static str {
    "You are a site record matching assistant. Given a search query (site name or address) \
and a list of candidate Site Records, identify which candidate best matches the query.\n\n\
Consider title similarity, address similarity, abbreviations, and common variations.\n\n\
Return ONLY a JSON object:\n\
{\"matched_id\": \"the ID of the best matching record\", \"reasoning\": \"brief explanation\"}\n\n\
If no good match is found, return:\n\
{\"matched_id\": null, \"reasoning\": \"explanation\"}"
}

pub fn user_prompt(query: &str, candidates: &[MatchCandidate]) -> String {
    let listing = serde_json::to_string_pretty(candidates).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Search query: {query}\n\nCandidate Site Records:\n{listing}\n\n\
Which candidate best matches the search query?"
    )
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MatchDecision {
    #[serde(default)]
    pub matched_id: Option<String>,
    #[serde(default)]
    pub reasoning: String,
}

impl MatchDecision {
    /// Matched id, treating an empty string as no match.
    pub fn matched_id(&self) -> Option<&str> {
        self.matched_id.as_deref().filter(|id| !id.trim().is_empty())
    }
}

pub fn parse_match_response(text: &str) -> Result<MatchDecision, serde_json::Error> {
    serde_json::from_str(text.trim())
}

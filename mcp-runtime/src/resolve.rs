//! Three-tier Site Record resolution: record id, then Wrike permalink, then a
//! ranked scan over every Site Record in the space.

use dd_core::error::{ErrorPayload, codes};
use dd_core::matching::rank_by_similarity;
use dd_core::site::{SiteRecord, looks_like_permalink, looks_like_record_id};

use crate::config::RuntimeSettings;
use crate::openai::OpenAiRanker;

/// Where Site Records come from.
pub(crate) trait SiteDirectory {
    async fn get_record(&self, record_id: &str) -> Result<SiteRecord, ErrorPayload>;
    async fn resolve_permalink(&self, permalink: &str) -> Result<String, ErrorPayload>;
    async fn list_site_records(&self) -> Result<Vec<SiteRecord>, ErrorPayload>;
}

/// Picks the id of the record that best matches a free-text query.
pub(crate) trait CandidateRanker {
    async fn pick(&self, query: &str, records: &[SiteRecord])
    -> Result<Option<String>, ErrorPayload>;
}

/// Offline ranking: title substring, then Jaro-Winkler similarity.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityRanker;

impl CandidateRanker for SimilarityRanker {
    async fn pick(
        &self,
        query: &str,
        records: &[SiteRecord],
    ) -> Result<Option<String>, ErrorPayload> {
        Ok(rank_by_similarity(query, records).map(|record| record.id.clone()))
    }
}

#[derive(Clone)]
pub enum Ranker {
    Llm(OpenAiRanker),
    Similarity(SimilarityRanker),
}

impl Ranker {
    pub fn from_settings(settings: &RuntimeSettings) -> Self {
        match OpenAiRanker::from_settings(settings) {
            Some(llm) => Self::Llm(llm),
            None => Self::Similarity(SimilarityRanker),
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Self::Llm(_) => "llm",
            Self::Similarity(_) => "similarity",
        }
    }
}

impl CandidateRanker for Ranker {
    async fn pick(
        &self,
        query: &str,
        records: &[SiteRecord],
    ) -> Result<Option<String>, ErrorPayload> {
        match self {
            Self::Llm(llm) => llm.pick(query, records).await,
            Self::Similarity(similarity) => similarity.pick(query, records).await,
        }
    }
}

/// Resolve `query` to a Site Record. `Ok(None)` means nothing matched.
pub(crate) async fn find_site_record<D, R>(
    directory: &D,
    ranker: &R,
    query: &str,
) -> Result<Option<SiteRecord>, ErrorPayload>
where
    D: SiteDirectory,
    R: CandidateRanker,
{
    let query = query.trim();
    if query.is_empty() {
        return Ok(None);
    }

    if looks_like_record_id(query) {
        match directory.get_record(query).await {
            Ok(record) => return Ok(Some(record)),
            Err(err) if !is_lookup_miss(&err) => return Err(err),
            Err(err) => {
                tracing::info!(
                    query,
                    error = %err.message,
                    "id lookup failed, falling back to name search"
                );
            }
        }
    }

    if looks_like_permalink(query) {
        let record = match directory.resolve_permalink(query).await {
            Ok(record_id) => directory.get_record(&record_id).await,
            Err(err) => Err(err),
        };
        return match record {
            Ok(record) => Ok(Some(record)),
            Err(err) if is_lookup_miss(&err) => {
                tracing::warn!(query, error = %err.message, "permalink lookup failed");
                Ok(None)
            }
            Err(err) => Err(err),
        };
    }

    let records = directory.list_site_records().await?;
    tracing::info!(query, candidates = records.len(), "ranking site records");
    let Some(matched_id) = ranker.pick(query, &records).await? else {
        return Ok(None);
    };

    let found = records.into_iter().find(|record| record.id == matched_id);
    if found.is_none() {
        tracing::warn!(query, matched_id = %matched_id, "ranker returned an id outside the candidate set");
    }
    Ok(found)
}

/// Wrike answered, but without the record: empty data or an HTTP error
/// status. Transport and configuration failures are not misses.
fn is_lookup_miss(err: &ErrorPayload) -> bool {
    err.error == codes::NOT_FOUND || err.error == codes::UPSTREAM_ERROR
}

//! Preview data providers.
//!
//! A provider returns the ranked participants of a data source (an event, a
//! league table). Results feed [`crate::series`] generation for the live
//! preview; an unavailable provider degrades the preview to placeholders
//! and never blocks editing.

use async_trait::async_trait;
use reqwest::Url;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::document::{SortBy, SortOrder};
use crate::error::ProviderError;
use crate::series::{Record, sort_records};

#[async_trait]
pub trait PreviewDataProvider: Send + Sync {
    async fn fetch_ranked(
        &self,
        source_id: &str,
        sort_by: SortBy,
        sort_order: SortOrder,
    ) -> Result<Vec<Record>, ProviderError>;
}

fn sort_by_param(sort_by: SortBy) -> &'static str {
    match sort_by {
        SortBy::Score => "score",
        SortBy::Name => "name",
        SortBy::Rank => "rank",
    }
}

fn sort_order_param(sort_order: SortOrder) -> &'static str {
    match sort_order {
        SortOrder::Asc => "asc",
        SortOrder::Desc => "desc",
    }
}

// ============================================================================
// STATIC
// ============================================================================

/// Fixed record sets, sorted on request. Unknown sources are unavailable.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    sources: HashMap<String, Vec<Record>>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source_id: impl Into<String>, records: Vec<Record>) -> Self {
        self.sources.insert(source_id.into(), records);
        self
    }
}

#[async_trait]
impl PreviewDataProvider for StaticProvider {
    async fn fetch_ranked(
        &self,
        source_id: &str,
        sort_by: SortBy,
        sort_order: SortOrder,
    ) -> Result<Vec<Record>, ProviderError> {
        let mut records = self
            .sources
            .get(source_id)
            .cloned()
            .ok_or_else(|| ProviderError::Unavailable(format!("unknown source {}", source_id)))?;
        sort_records(&mut records, sort_by, sort_order, None);
        Ok(records)
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// Ranking service over HTTP.
///
/// `GET {base}/sources/{source_id}/ranked?sortBy=..&sortOrder=..` returning a
/// JSON array of records.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpProvider {
    pub fn new(base_url: &str) -> Result<Self, ProviderError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ProviderError::Unavailable(format!("invalid base URL {}: {}", base_url, e)))?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("easel/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("HTTP client error: {}", e)))?;
        Ok(Self { client, base_url })
    }

    /// Request URL for one source.
    pub fn ranked_url(
        &self,
        source_id: &str,
        sort_by: SortBy,
        sort_order: SortOrder,
    ) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::Unavailable(format!("cannot-be-a-base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(["sources", source_id, "ranked"]);
        url.query_pairs_mut()
            .append_pair("sortBy", sort_by_param(sort_by))
            .append_pair("sortOrder", sort_order_param(sort_order));
        Ok(url)
    }
}

#[async_trait]
impl PreviewDataProvider for HttpProvider {
    async fn fetch_ranked(
        &self,
        source_id: &str,
        sort_by: SortBy,
        sort_order: SortOrder,
    ) -> Result<Vec<Record>, ProviderError> {
        let url = self.ranked_url(source_id, sort_by, sort_order)?;
        debug!(%url, "fetching preview records");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("{}: {}", url, e)))?;
        if !response.status().is_success() {
            return Err(ProviderError::Unavailable(format!(
                "{}: HTTP {}",
                url,
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("failed to read response: {}", e)))?;
        serde_json::from_slice(&bytes).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_static_provider_sorts() {
        let provider = StaticProvider::new().with_source(
            "event",
            vec![
                Record::new("a", "Ana", 10.0, 2),
                Record::new("b", "Bo", 30.0, 1),
            ],
        );
        let records = provider
            .fetch_ranked("event", SortBy::Score, SortOrder::Desc)
            .await
            .unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Bo", "Ana"]);
    }

    #[tokio::test]
    async fn test_static_provider_unknown_source() {
        let err = StaticProvider::new()
            .fetch_ranked("nope", SortBy::Rank, SortOrder::Asc)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }

    #[test]
    fn test_ranked_url() {
        let provider = HttpProvider::new("https://scores.example/api/").unwrap();
        let url = provider
            .ranked_url("event 7", SortBy::Score, SortOrder::Desc)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://scores.example/api/sources/event%207/ranked?sortBy=score&sortOrder=desc"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(HttpProvider::new("not a url").is_err());
    }
}

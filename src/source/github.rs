//! GitHub-compatible search client
//!
//! This module talks to the REST search API, including:
//! - Building the HTTP client with a proper user agent string
//! - Translating partitions into range qualifiers (`stars:10..20`)
//! - Paging through results lazily, never past the result window
//! - Reading the rate limit and the public status page
//! - Classifying HTTP failures into transient, per-entity and fatal errors

use crate::config::{Config, QuotaResource, SearchEndpoint, UserAgentConfig};
use crate::partition::{Partition, PartitionKey};
use crate::source::{
    Entity, QueryResult, QuerySource, QuotaObserver, QuotaStatus, ResultCursor, SortOrder,
    SourceError, SourceResult,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;

/// Builds an HTTP client identifying the harvester
///
/// The user agent has the form `Name/Version (+ContactURL; ContactEmail)`.
pub fn build_http_client(config: &UserAgentConfig, timeout: Duration) -> Result<Client, reqwest::Error> {
    let user_agent = format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    );

    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/vnd.github+json"),
    );

    Client::builder()
        .user_agent(user_agent)
        .default_headers(headers)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    total_count: u64,
    #[serde(default)]
    incomplete_results: bool,
    #[serde(default)]
    items: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RateLimitResponse {
    resources: RateLimitResources,
}

#[derive(Debug, Deserialize)]
struct RateLimitResources {
    core: RateBucket,
    search: RateBucket,
}

#[derive(Debug, Deserialize)]
struct RateBucket {
    limit: u64,
    remaining: u64,
}

/// Search client for one configured target
#[derive(Debug, Clone)]
pub struct GithubClient {
    client: Client,
    base_url: String,
    status_url: Option<String>,
    token: Option<String>,
    endpoint: SearchEndpoint,
    field: String,
    sort: String,
    qualifiers: Option<String>,
    page_size: u32,
    window: u64,
    complete_entities: bool,
    quota_resource: QuotaResource,
}

impl GithubClient {
    /// Creates a client for the search described by `config`
    ///
    /// # Arguments
    ///
    /// * `config` - The harvester configuration
    /// * `token` - Optional personal access token
    pub fn new(config: &Config, token: Option<String>) -> Result<Self, reqwest::Error> {
        let client = build_http_client(
            &config.user_agent,
            Duration::from_secs(config.api.timeout_secs),
        )?;

        Ok(Self {
            client,
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            status_url: config.api.status_url.clone(),
            token: token.filter(|t| !t.is_empty()),
            endpoint: config.search.endpoint,
            field: config.search.field.clone(),
            sort: config.search.sort_field().to_string(),
            qualifiers: config.search.qualifiers.clone(),
            page_size: config.api.page_size,
            window: config.search.window,
            complete_entities: config.api.complete_entities,
            quota_resource: config.quota.resource,
        })
    }

    /// Builds the `q` parameter for a partition
    pub fn search_terms<K: PartitionKey>(&self, partition: &Partition<K>) -> String {
        let mut terms = Vec::new();
        if let Some(label) = partition.label() {
            terms.push(format!("label:\"{}\"", label));
        }
        terms.push(format!(
            "{}:{}..{}",
            self.field,
            partition.lower(),
            partition.upper()
        ));
        if let Some(extra) = self.qualifiers.as_deref().filter(|q| !q.trim().is_empty()) {
            terms.push(extra.trim().to_string());
        }
        terms.join(" ")
    }

    async fn fetch_page(&self, terms: &str, order: SortOrder, page: u32) -> SourceResult<SearchPage> {
        let url = format!("{}/search/{}", self.base_url, self.endpoint.as_path());
        let page_size = self.page_size.to_string();
        let page_number = page.to_string();

        tracing::debug!("GET {} q={} order={} page={}", url, terms, order, page);
        let request = self.authorize(self.client.get(&url)).query(&[
            ("q", terms),
            ("sort", self.sort.as_str()),
            ("order", order.as_param()),
            ("per_page", page_size.as_str()),
            ("page", page_number.as_str()),
        ]);

        let response = check_status(request.send().await?).await?;
        let page: SearchPage = response
            .json()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))?;

        if page.incomplete_results {
            tracing::warn!("Search for '{}' reported incomplete results", terms);
        }
        Ok(page)
    }

    /// Fetches the full representation of a search hit from its `url` field
    async fn complete(&self, summary: &Value) -> SourceResult<Entity> {
        let url = summary
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| SourceError::Decode("search item has no 'url' field".to_string()))?;

        let response = check_status(self.authorize(self.client.get(url)).send().await?).await?;
        response
            .json()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl<K: PartitionKey> QuerySource<K> for GithubClient {
    type Cursor = GithubCursor;

    async fn query(
        &mut self,
        partition: &Partition<K>,
        order: SortOrder,
    ) -> SourceResult<QueryResult<GithubCursor>> {
        let terms = self.search_terms(partition);
        let first = self.fetch_page(&terms, order, 1).await?;

        let exhausted = (first.items.len() as u64) < u64::from(self.page_size);
        let cursor = GithubCursor {
            client: self.clone(),
            terms,
            order,
            next_page: 2,
            buffer: first.items.into(),
            read: 0,
            exhausted,
        };

        Ok(QueryResult {
            total_count: first.total_count,
            cursor,
        })
    }
}

#[async_trait]
impl QuotaObserver for GithubClient {
    async fn quota(&mut self) -> SourceResult<QuotaStatus> {
        let url = format!("{}/rate_limit", self.base_url);
        let response = check_status(self.authorize(self.client.get(&url)).send().await?).await?;
        let body: RateLimitResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))?;

        let bucket = match self.quota_resource {
            QuotaResource::Search => body.resources.search,
            QuotaResource::Core => body.resources.core,
        };
        Ok(QuotaStatus {
            remaining: bucket.remaining,
            limit: bucket.limit,
        })
    }

    async fn service_status(&mut self) -> SourceResult<String> {
        let Some(url) = self.status_url.as_deref() else {
            return Ok("unknown".to_string());
        };

        let response = check_status(self.client.get(url).send().await?).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))?;

        let description = body
            .pointer("/status/description")
            .or_else(|| body.get("status"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        Ok(description.to_string())
    }
}

/// Lazy page-by-page cursor over one search
#[derive(Debug)]
pub struct GithubCursor {
    client: GithubClient,
    terms: String,
    order: SortOrder,
    next_page: u32,
    buffer: VecDeque<Value>,
    read: u64,
    exhausted: bool,
}

#[async_trait]
impl ResultCursor for GithubCursor {
    async fn next_entity(&mut self) -> SourceResult<Option<Entity>> {
        loop {
            if self.read >= self.client.window {
                return Ok(None);
            }

            if let Some(front) = self.buffer.front() {
                if !self.client.complete_entities {
                    self.read += 1;
                    return Ok(self.buffer.pop_front());
                }

                return match self.client.complete(front).await {
                    Ok(entity) => {
                        self.buffer.pop_front();
                        self.read += 1;
                        Ok(Some(entity))
                    }
                    Err(e) if e.is_entity_skip() => {
                        self.buffer.pop_front();
                        self.read += 1;
                        Err(e)
                    }
                    // Transient and fatal errors leave the entity in place
                    Err(e) => Err(e),
                };
            }

            if self.exhausted {
                return Ok(None);
            }

            let page = self
                .client
                .fetch_page(&self.terms, self.order, self.next_page)
                .await?;
            self.next_page += 1;
            if (page.items.len() as u64) < u64::from(self.client.page_size) {
                self.exhausted = true;
            }
            if page.items.is_empty() {
                return Ok(None);
            }
            self.buffer.extend(page.items);
        }
    }
}

/// Converts a non-success response into a classified error
async fn check_status(response: Response) -> SourceResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify_failure(status, &body))
}

/// Maps an HTTP failure to the error taxonomy
///
/// | Condition | Error |
/// |-----------|-------|
/// | 403/429 mentioning a block | `Blocked` |
/// | 403/429 otherwise | `RateLimited` |
/// | 451 | `Blocked` |
/// | 410 | `Gone` |
/// | 5xx | `Server` |
/// | anything else | `Unexpected` |
pub fn classify_failure(status: StatusCode, body: &str) -> SourceError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());
    let code = status.as_u16();

    match status {
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            if body.to_ascii_lowercase().contains("block") {
                SourceError::Blocked {
                    status: code,
                    message,
                }
            } else {
                SourceError::RateLimited {
                    status: code,
                    message,
                }
            }
        }
        StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS => SourceError::Blocked {
            status: code,
            message,
        },
        StatusCode::GONE => SourceError::Gone {
            status: code,
            message,
        },
        s if s.is_server_error() => SourceError::Server { status: code },
        _ => SourceError::Unexpected {
            status: code,
            message,
        },
    }
}

use crate::crawler::CrawlSettings;
use serde::Deserialize;

/// Main configuration structure for Bisect-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    pub search: SearchConfig,
    pub output: OutputConfig,
}

/// Search API endpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApiConfig {
    /// Base URL of the REST API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// JSON status page reporting service health (omit to skip)
    #[serde(default = "default_status_url")]
    pub status_url: Option<String>,

    /// Results requested per page (the API allows at most 100)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Fetch each hit's own URL instead of storing the search summary
    #[serde(default)]
    pub complete_entities: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            status_url: default_status_url(),
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
            complete_entities: false,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the harvester
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the harvester
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the harvester
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for harvester-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Which rate limit bucket the quota gate watches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaResource {
    #[default]
    Search,
    Core,
}

/// Quota gate configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct QuotaConfig {
    /// Remaining quota must exceed this before a query is issued
    #[serde(default = "default_threshold")]
    pub threshold: u64,

    /// Seconds to sleep between quota observations
    #[serde(default = "default_wait_secs")]
    pub wait_secs: u64,

    /// Rate limit bucket to observe
    #[serde(default)]
    pub resource: QuotaResource,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            wait_secs: default_wait_secs(),
            resource: QuotaResource::default(),
        }
    }
}

/// Search endpoint to harvest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchEndpoint {
    Repositories,
    Issues,
}

impl SearchEndpoint {
    pub fn as_path(&self) -> &'static str {
        match self {
            Self::Repositories => "repositories",
            Self::Issues => "issues",
        }
    }
}

/// Domain of the partition key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Integer,
    Date,
}

/// What to harvest and how to partition it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SearchConfig {
    pub endpoint: SearchEndpoint,

    /// Qualifier the range applies to (e.g., "stars" or "created")
    pub field: String,

    pub key_type: KeyType,

    /// Inclusive lower bound of the key range
    pub lower: String,

    /// Inclusive upper bound of the key range
    pub upper: String,

    /// Labels crossed with the range; one seed partition per label
    #[serde(default)]
    pub labels: Vec<String>,

    /// Extra qualifiers appended to every query (e.g., "comments:>0")
    #[serde(default)]
    pub qualifiers: Option<String>,

    /// Sort field; defaults to `field`
    #[serde(default)]
    pub sort: Option<String>,

    /// Maximum results the API returns for one query
    #[serde(default = "default_window")]
    pub window: u64,

    /// Recover ranges of up to twice the window with two opposite scans
    #[serde(default = "default_merge_near_fits")]
    pub merge_near_fits: bool,
}

impl SearchConfig {
    pub fn sort_field(&self) -> &str {
        self.sort.as_deref().unwrap_or(&self.field)
    }

    pub fn settings(&self) -> CrawlSettings {
        CrawlSettings {
            window: self.window,
            merge_near_fits: self.merge_near_fits,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Directory receiving the per-run entity files
    pub directory: String,

    /// File name prefix for entity files and the `latest` pointer
    pub prefix: String,

    /// Path of the work queue checkpoint
    pub queue_path: String,

    /// Append logs to this file instead of stderr
    #[serde(default)]
    pub log_path: Option<String>,
}

fn default_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_status_url() -> Option<String> {
    Some("https://www.githubstatus.com/api/v2/status.json".to_string())
}

fn default_page_size() -> u32 {
    100
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_threshold() -> u64 {
    10
}

fn default_wait_secs() -> u64 {
    600
}

fn default_window() -> u64 {
    1000
}

fn default_merge_near_fits() -> bool {
    true
}

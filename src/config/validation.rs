use crate::config::types::{
    ApiConfig, Config, KeyType, OutputConfig, QuotaConfig, SearchConfig, UserAgentConfig,
};
use crate::partition::PartitionKey;
use crate::ConfigError;
use chrono::NaiveDate;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_api_config(&config.api)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_quota_config(&config.quota)?;
    validate_search_config(&config.search)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates API endpoint configuration
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if let Some(status_url) = &config.status_url {
        Url::parse(status_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid status-url: {}", e)))?;
    }

    if config.page_size < 1 || config.page_size > 100 {
        return Err(ConfigError::Validation(format!(
            "page-size must be between 1 and 100, got {}",
            config.page_size
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler-name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact-url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates quota gate configuration
fn validate_quota_config(config: &QuotaConfig) -> Result<(), ConfigError> {
    if config.wait_secs < 1 {
        return Err(ConfigError::Validation(
            "wait-secs must be >= 1".to_string(),
        ));
    }
    Ok(())
}

/// Validates the harvested range and search shape
fn validate_search_config(config: &SearchConfig) -> Result<(), ConfigError> {
    if config.field.trim().is_empty() {
        return Err(ConfigError::Validation("field cannot be empty".to_string()));
    }

    if config.window < 1 {
        return Err(ConfigError::Validation(format!(
            "window must be >= 1, got {}",
            config.window
        )));
    }

    if let Some(label) = config.labels.iter().find(|l| l.trim().is_empty()) {
        return Err(ConfigError::Validation(format!(
            "labels cannot contain blank entries, got '{}'",
            label
        )));
    }

    match config.key_type {
        KeyType::Integer => validate_range::<i64>(&config.lower, &config.upper),
        KeyType::Date => validate_range::<NaiveDate>(&config.lower, &config.upper),
    }
}

/// Checks that both bounds parse in the key domain and are ordered
fn validate_range<K: PartitionKey>(lower: &str, upper: &str) -> Result<(), ConfigError> {
    let parse = |name: &str, value: &str| {
        K::from_checkpoint(value).map_err(|e| {
            ConfigError::Validation(format!("{} is not a valid {} key: {}", name, K::DOMAIN, e))
        })
    };

    let lo = parse("lower", lower)?;
    let hi = parse("upper", upper)?;

    if lo > hi {
        return Err(ConfigError::Validation(format!(
            "lower ({}) must not exceed upper ({})",
            lo, hi
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.directory.is_empty() {
        return Err(ConfigError::Validation(
            "directory cannot be empty".to_string(),
        ));
    }

    if config.prefix.is_empty() || config.prefix.contains(['/', '\\']) {
        return Err(ConfigError::Validation(format!(
            "prefix must be a non-empty file name, got '{}'",
            config.prefix
        )));
    }

    if config.queue_path.is_empty() {
        return Err(ConfigError::Validation(
            "queue-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact-email cannot be empty".to_string(),
        ));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

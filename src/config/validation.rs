use crate::config::types::{
    Config, CrawlConfig, ExtractionConfig, OutputConfig, RenderConfig, RunRequest,
    UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawl_config(&config.crawl)?;
    validate_extraction_config(&config.extraction)?;
    validate_render_config(&config.render)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;

    if config.cache.capacity < 1 {
        return Err(ConfigError::Validation(
            "cache capacity must be >= 1".to_string(),
        ));
    }

    if config.fetch.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "fetch timeout must be >= 1 second".to_string(),
        ));
    }

    Ok(())
}

/// Validates a run request before any fetch happens
pub fn validate_request(request: &RunRequest) -> Result<(), ConfigError> {
    if request.team_id.trim().is_empty() {
        return Err(ConfigError::Validation("team id cannot be empty".to_string()));
    }

    if request.user_id.trim().is_empty() {
        return Err(ConfigError::Validation("user id cannot be empty".to_string()));
    }

    if request.urls.is_empty() {
        return Err(ConfigError::Validation(
            "at least one URL is required".to_string(),
        ));
    }

    for raw in &request.urls {
        let url = Url::parse(raw)
            .map_err(|e| ConfigError::InvalidUrl(format!("'{}': {}", raw, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(format!(
                "'{}' must use http or https",
                raw
            )));
        }
    }

    Ok(())
}

fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if config.max_concurrent < 1 || config.max_concurrent > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent must be between 1 and 100, got {}",
            config.max_concurrent
        )));
    }

    if !config.delay.is_finite() || config.delay < 0.0 {
        return Err(ConfigError::Validation(format!(
            "delay must be a non-negative number of seconds, got {}",
            config.delay
        )));
    }

    for pattern in &config.allowed_hosts {
        validate_host_pattern(pattern)?;
    }

    Ok(())
}

fn validate_extraction_config(config: &ExtractionConfig) -> Result<(), ConfigError> {
    if config.chunk_size < 100 {
        return Err(ConfigError::Validation(format!(
            "chunk_size must be >= 100 characters, got {}",
            config.chunk_size
        )));
    }

    // Overlap must leave room for forward progress in every window
    if config.chunk_overlap * 2 > config.chunk_size {
        return Err(ConfigError::Validation(format!(
            "chunk_overlap ({}) must be at most half of chunk_size ({})",
            config.chunk_overlap, config.chunk_size
        )));
    }

    Ok(())
}

fn validate_render_config(config: &RenderConfig) -> Result<(), ConfigError> {
    if let Some(endpoint) = &config.webdriver_url {
        Url::parse(endpoint)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid webdriver_url: {}", e)))?;
    }
    Ok(())
}

fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    if let Some(contact) = &config.contact_url {
        Url::parse(contact)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "output path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates a host pattern (supports a leading `*.` wildcard)
fn validate_host_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Host pattern cannot be empty".to_string(),
        ));
    }

    let host = pattern.strip_prefix("*.").unwrap_or(pattern);
    validate_host_string(host)
}

fn validate_host_string(host: &str) -> Result<(), ConfigError> {
    if host.is_empty() {
        return Err(ConfigError::InvalidPattern("Host cannot be empty".to_string()));
    }

    if host == "localhost" {
        return Ok(());
    }

    if !host
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' contains invalid characters",
            host
        )));
    }

    if host.starts_with('.') || host.ends_with('.') || host.starts_with('-') || host.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' cannot start or end with '.' or '-'",
            host
        )));
    }

    if host.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' cannot contain consecutive dots",
            host
        )));
    }

    if !host.contains('.') {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' must contain at least one dot (e.g., 'example.com')",
            host
        )));
    }

    Ok(())
}

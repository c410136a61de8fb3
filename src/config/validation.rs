use crate::config::types::{Config, CrawlerConfig, HeaderProfile, SourceConfig};
use crate::ConfigError;
use reqwest::header::HeaderValue;
use url::Url;

const MAX_CONCURRENCY: u32 = 256;
const MAX_TIMEOUT_SECS: u64 = 300;
const MAX_RETRIES: u32 = 10;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_header_profile(&config.headers)?;
    validate_sources(&config.sources)?;
    Ok(())
}

/// Returns the category name a source writes to
///
/// An explicit `category` wins; otherwise the last non-empty path segment of
/// the base URL is percent-decoded (`/tag/%E5%8E%86%E5%8F%B2` gives `历史`).
pub fn category_for(source: &SourceConfig) -> Result<String, ConfigError> {
    if let Some(category) = &source.category {
        let category = category.trim();
        check_category_name(category)?;
        return Ok(category.to_string());
    }

    let url = Url::parse(&source.base)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base URL '{}': {}", source.base, e)))?;

    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .ok_or_else(|| {
            ConfigError::Validation(format!(
                "Cannot derive a category from '{}'; set `category` explicitly",
                source.base
            ))
        })?;

    let decoded = urlencoding::decode(segment).map_err(|e| {
        ConfigError::Validation(format!("Path segment '{}' is not valid UTF-8: {}", segment, e))
    })?;

    check_category_name(&decoded)?;
    Ok(decoded.into_owned())
}

fn check_category_name(category: &str) -> Result<(), ConfigError> {
    if category.is_empty() {
        return Err(ConfigError::Validation(
            "category cannot be empty".to_string(),
        ));
    }

    if category.contains(['/', '\\']) || category == "." || category == ".." {
        return Err(ConfigError::Validation(format!(
            "category '{}' cannot be used as a file name",
            category
        )));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > MAX_CONCURRENCY {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and {}, got {}",
            MAX_CONCURRENCY, config.concurrency
        )));
    }

    if config.timeout_secs < 1 || config.timeout_secs > MAX_TIMEOUT_SECS {
        return Err(ConfigError::Validation(format!(
            "timeout_secs must be between 1 and {}, got {}",
            MAX_TIMEOUT_SECS, config.timeout_secs
        )));
    }

    if config.max_retries > MAX_RETRIES {
        return Err(ConfigError::Validation(format!(
            "max_retries must be <= {}, got {}",
            MAX_RETRIES, config.max_retries
        )));
    }

    if config.deadline_secs == Some(0) {
        return Err(ConfigError::Validation(
            "deadline_secs must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates the request header profile
fn validate_header_profile(profile: &HeaderProfile) -> Result<(), ConfigError> {
    if profile.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    check_header_value("User-Agent", &profile.user_agent)?;
    check_header_value("Referer", &profile.referer)?;
    if let Some(cookie) = &profile.cookie {
        check_header_value("Cookie", cookie)?;
    }

    Ok(())
}

fn check_header_value(name: &str, value: &str) -> Result<(), ConfigError> {
    HeaderValue::from_str(value)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidHeader {
            name: name.to_string(),
            message: e.to_string(),
        })
}

/// Validates source entries
fn validate_sources(sources: &[SourceConfig]) -> Result<(), ConfigError> {
    if sources.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[source]] entry is required".to_string(),
        ));
    }

    for source in sources {
        let url = Url::parse(&source.base).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid base URL '{}': {}", source.base, e))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(format!(
                "Base URL '{}' must use http or https",
                source.base
            )));
        }

        if source.pages < 1 {
            return Err(ConfigError::Validation(format!(
                "pages must be >= 1 for '{}'",
                source.base
            )));
        }

        if source.page_size < 1 {
            return Err(ConfigError::Validation(format!(
                "page_size must be >= 1 for '{}'",
                source.base
            )));
        }

        if source.offset_param().is_empty() {
            return Err(ConfigError::Validation(format!(
                "offset_param cannot be empty for '{}'",
                source.base
            )));
        }

        category_for(source)?;
    }

    Ok(())
}

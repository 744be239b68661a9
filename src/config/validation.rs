use crate::catalog::FacetCatalog;
use crate::config::types::{
    CatalogConfig, CheckpointConfig, Config, CrawlerConfig, DriverConfig, DriverKind,
    SelectorConfig, UserAgentConfig,
};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_catalog_config(&config.catalog)?;
    validate_checkpoint_config(&config.checkpoint)?;
    validate_driver_config(&config.driver)?;
    if let Some(user_agent) = &config.user_agent {
        validate_user_agent_config(user_agent)?;
    }
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_contexts < 1 || config.max_concurrent_contexts > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_contexts must be between 1 and 100, got {}",
            config.max_concurrent_contexts
        )));
    }

    if config.max_retries > 20 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be <= 20, got {}",
            config.max_retries
        )));
    }

    if config.task_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "task_timeout_ms must be >= 100ms, got {}ms",
            config.task_timeout_ms
        )));
    }

    Ok(())
}

/// Validates the catalog root URL and facet list
fn validate_catalog_config(config: &CatalogConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.root_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid root_url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "root_url '{}' must use http or https",
            config.root_url
        )));
    }

    FacetCatalog::new(&config.facets)?;
    Ok(())
}

fn validate_checkpoint_config(config: &CheckpointConfig) -> Result<(), ConfigError> {
    if config.path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "checkpoint path cannot be empty".to_string(),
        ));
    }

    if matches!(&config.resolved_path, Some(p) if p.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "resolved_path cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates that the chosen driver has what it needs
fn validate_driver_config(config: &DriverConfig) -> Result<(), ConfigError> {
    match config.kind {
        DriverKind::Html => {
            let selectors = config.selectors.as_ref().ok_or_else(|| {
                ConfigError::Validation(
                    "driver.selectors is required for the html driver".to_string(),
                )
            })?;
            validate_selectors(selectors)?;

            if config.request_timeout_ms < 100 {
                return Err(ConfigError::Validation(format!(
                    "request_timeout_ms must be >= 100ms, got {}ms",
                    config.request_timeout_ms
                )));
            }
        }
        DriverKind::Fixture => {
            if config.fixture_path.as_deref().map_or(true, |p| p.trim().is_empty()) {
                return Err(ConfigError::Validation(
                    "driver.fixture-path is required for the fixture driver".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// Compiles every selector once so typos fail before the crawl starts
fn validate_selectors(selectors: &SelectorConfig) -> Result<(), ConfigError> {
    let mut all = vec![
        &selectors.facet_group,
        &selectors.facet_title,
        &selectors.facet_option,
        &selectors.option_label,
        &selectors.option_link,
        &selectors.item,
    ];
    if let Some(result_count) = &selectors.result_count {
        all.push(result_count);
    }

    for selector in all {
        Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
            selector: selector.clone(),
            message: format!("{:?}", e),
        })?;
    }

    if selectors.item_data_attribute.trim().is_empty() {
        return Err(ConfigError::Validation(
            "item_data_attribute cannot be empty".to_string(),
        ));
    }

    if selectors.item_id_field.trim().is_empty() {
        return Err(ConfigError::Validation(
            "item_id_field cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
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

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let (local, domain) = email
        .split_once('@')
        .ok_or_else(|| ConfigError::Validation(format!("Invalid email format: '{}'", email)))?;

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

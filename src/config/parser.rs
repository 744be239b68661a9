use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so runs can be matched to the configuration they used.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CheckpointBackend, DriverKind, ExtractAt};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const HTML_CONFIG: &str = r#"
[crawler]
max-concurrent-contexts = 4
max-retries = 2
task-timeout-ms = 60000
extract-at = "leaves-only"

[catalog]
root-url = "https://shop.example.com/men/all"
facets = ["Category", "Color", "Size", "Season"]

[dedup]
volatile-fields = ["product_position"]

[checkpoint]
backend = "sqlite"
path = "./crawl.db"
resolved-path = "./data.json"

[driver]
kind = "html"

[driver.selectors]
facet-group = "ul.filterGroups > li.filterGroup"
facet-title = "div.title"
facet-option = ".refinements > li"
option-label = "a > span.text"
item = "div.product-item"
item-data-attribute = "data-product"
item-id-field = "product_cod10"

[user-agent]
crawler-name = "FacetCrawl"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"
"#;

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(HTML_CONFIG);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.max_concurrent_contexts, 4);
        assert_eq!(config.crawler.max_retries, 2);
        assert_eq!(config.crawler.extract_at, ExtractAt::LeavesOnly);
        assert_eq!(config.catalog.facets.len(), 4);
        assert_eq!(config.checkpoint.backend, CheckpointBackend::Sqlite);
        assert_eq!(config.driver.kind, DriverKind::Html);
        assert_eq!(config.driver.request_timeout_ms, 30_000);

        let selectors = config.driver.selectors.unwrap();
        assert_eq!(selectors.option_link, "a");
        assert_eq!(selectors.disabled_class, "disabled");
        assert!(config.dedup.volatile_fields.contains(&"product_position".to_string()));
    }

    #[test]
    fn test_defaults_for_minimal_fixture_config() {
        let config = parse_config(
            r#"
[catalog]
root-url = "https://shop.example.com/"
facets = ["Category"]

[checkpoint]
path = "./out"

[driver]
kind = "fixture"
fixture-path = "./catalog.json"
"#,
        )
        .unwrap();

        assert_eq!(config.crawler.max_concurrent_contexts, 8);
        assert_eq!(config.crawler.max_retries, 3);
        assert_eq!(config.crawler.extract_at, ExtractAt::EveryLevel);
        assert_eq!(config.checkpoint.backend, CheckpointBackend::Json);
        assert_eq!(config.dedup.volatile_fields, vec!["position".to_string()]);
        assert!(config.user_agent.is_none());
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/crawl.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_duplicate_facet_is_fatal() {
        let result = parse_config(
            r#"
[catalog]
root-url = "https://shop.example.com/"
facets = ["Color", "Size", "Color"]

[checkpoint]
path = "./out"

[driver]
kind = "fixture"
fixture-path = "./catalog.json"
"#,
        );
        assert!(matches!(result, Err(ConfigError::MalformedCatalog(_))));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }
}

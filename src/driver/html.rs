//! Driver for server-rendered catalogs
//!
//! Each refinement in the filter panel is an anchor whose `href` is the
//! filtered listing. Applying an option means following its link, resetting
//! means going back to the unfiltered root listing. Product tiles carry their
//! metadata as a JSON attribute.

use crate::catalog::Locator;
use crate::collector::Item;
use crate::config::{SelectorConfig, UserAgentConfig};
use crate::driver::{DriverFactory, PageDriver, RawFacetOption};
use crate::{DriverError, DriverResult};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Builds an HTTP client with proper configuration
///
/// The user agent has the form `CrawlerName/Version (+ContactURL; ContactEmail)`
/// when a `[user-agent]` section is configured.
pub fn build_http_client(
    user_agent: Option<&UserAgentConfig>,
    request_timeout: Duration,
) -> Result<Client, reqwest::Error> {
    let user_agent = match user_agent {
        Some(config) => format!(
            "{}/{} (+{}; {})",
            config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
        ),
        None => format!("facet-crawl/{}", env!("CARGO_PKG_VERSION")),
    };

    Client::builder()
        .user_agent(user_agent)
        .timeout(request_timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Compiles a selector that was already checked during config validation
fn selector(css: &str) -> DriverResult<Selector> {
    Selector::parse(css).map_err(|e| DriverError::Decode(format!("selector '{}': {:?}", css, e)))
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// One HTTP session over a server-rendered catalog
pub struct HtmlDriver {
    client: Client,
    root_url: Url,
    selectors: SelectorConfig,
    current_url: Option<Url>,
    body: Option<String>,
}

impl HtmlDriver {
    pub fn new(client: Client, root_url: Url, selectors: SelectorConfig) -> Self {
        Self {
            client,
            root_url,
            selectors,
            current_url: None,
            body: None,
        }
    }

    fn page(&self) -> DriverResult<(Html, &Url)> {
        match (&self.body, &self.current_url) {
            (Some(body), Some(url)) => Ok((Html::parse_document(body), url)),
            _ => Err(DriverError::ElementNotFound(
                "no page loaded in this context".to_string(),
            )),
        }
    }

    async fn load(&mut self, url: Url) -> DriverResult<()> {
        tracing::trace!("Loading page... {}", url);
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DriverError::Navigation {
                url: url.to_string(),
                message: format!("HTTP {}", status.as_u16()),
            });
        }

        let final_url = response.url().clone();
        let body = response.text().await?;
        self.current_url = Some(final_url);
        self.body = Some(body);
        tracing::trace!("Loaded page: {}", url);
        Ok(())
    }

    /// Parses the options of one facet group out of the current page
    fn parse_facet_options(&self, facet_title: &str) -> DriverResult<Vec<RawFacetOption>> {
        let (document, base_url) = self.page()?;
        let group_sel = selector(&self.selectors.facet_group)?;
        let title_sel = selector(&self.selectors.facet_title)?;
        let option_sel = selector(&self.selectors.facet_option)?;
        let label_sel = selector(&self.selectors.option_label)?;
        let link_sel = selector(&self.selectors.option_link)?;

        let mut options = Vec::new();
        for group in document.select(&group_sel) {
            let title = group.select(&title_sel).next().map(element_text);
            if title.as_deref() != Some(facet_title) {
                continue;
            }

            for option in group.select(&option_sel) {
                let label = option
                    .select(&label_sel)
                    .next()
                    .map(element_text)
                    .filter(|s| !s.is_empty());
                let href = option
                    .select(&link_sel)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .and_then(|href| base_url.join(href.trim()).ok())
                    .map(|url| url.to_string());
                let disabled = option
                    .value()
                    .classes()
                    .any(|class| class == self.selectors.disabled_class);

                options.push(RawFacetOption::Link {
                    label,
                    href,
                    disabled,
                });
            }
        }

        Ok(options)
    }

    /// Reads product tiles and their JSON metadata from the current page
    fn parse_items(&self) -> DriverResult<Vec<Item>> {
        let (document, url) = self.page()?;
        let item_sel = selector(&self.selectors.item)?;
        let mut items = Vec::new();

        for (idx, tile) in document.select(&item_sel).enumerate() {
            let Some(raw) = tile.value().attr(&self.selectors.item_data_attribute) else {
                tracing::debug!("Product tile #{} on {} has no metadata attribute", idx, url);
                continue;
            };

            let mut fields = match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    tracing::warn!("Product tile #{} on {} has malformed metadata", idx, url);
                    continue;
                }
            };

            let id = match fields.get(&self.selectors.item_id_field) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => {
                    tracing::warn!(
                        "Product tile #{} on {} lacks '{}'",
                        idx,
                        url,
                        self.selectors.item_id_field
                    );
                    continue;
                }
            };
            if self.selectors.item_id_field == "id" {
                fields.remove("id");
            }
            fields
                .entry("position")
                .or_insert_with(|| Value::from(idx + 1));

            items.push(Item::new(id, fields));
        }

        Ok(items)
    }
}

#[async_trait]
impl PageDriver for HtmlDriver {
    async fn navigate(&mut self, url: &str) -> DriverResult<()> {
        let url = Url::parse(url).map_err(|e| DriverError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        self.load(url).await
    }

    async fn reset_filters(&mut self) -> DriverResult<()> {
        tracing::trace!("Resetting filters...");
        self.load(self.root_url.clone()).await
    }

    async fn open_filter_panel(&mut self) -> DriverResult<()> {
        let (document, url) = self.page()?;
        let group_sel = selector(&self.selectors.facet_group)?;
        if document.select(&group_sel).next().is_none() {
            return Err(DriverError::ElementNotFound(format!(
                "filter panel '{}' on {}",
                self.selectors.facet_group, url
            )));
        }
        Ok(())
    }

    async fn list_facet_values(&self, facet_title: &str) -> DriverResult<Vec<RawFacetOption>> {
        self.parse_facet_options(facet_title)
    }

    async fn apply_facet_value(&mut self, locator: &Locator) -> DriverResult<()> {
        match locator {
            Locator::Href { href } => {
                let url = Url::parse(href).map_err(|e| DriverError::Navigation {
                    url: href.clone(),
                    message: e.to_string(),
                })?;
                self.load(url).await
            }
            other => Err(DriverError::UnsupportedLocator(other.to_string())),
        }
    }

    async fn extract_items(&self) -> DriverResult<Vec<Item>> {
        self.parse_items()
    }

    async fn facet_titles(&self) -> DriverResult<Option<Vec<String>>> {
        let (document, _) = self.page()?;
        let group_sel = selector(&self.selectors.facet_group)?;
        let title_sel = selector(&self.selectors.facet_title)?;
        let titles = document
            .select(&group_sel)
            .filter_map(|group| group.select(&title_sel).next().map(element_text))
            .filter(|t| !t.is_empty())
            .collect();
        Ok(Some(titles))
    }

    async fn reported_count(&self) -> DriverResult<Option<usize>> {
        let Some(css) = &self.selectors.result_count else {
            return Ok(None);
        };
        let (document, _) = self.page()?;
        let count_sel = selector(css)?;
        let count = document.select(&count_sel).next().and_then(|el| {
            let digits: String = element_text(el).chars().filter(char::is_ascii_digit).collect();
            digits.parse().ok()
        });
        Ok(count)
    }
}

/// Opens `HtmlDriver` contexts sharing one connection pool
pub struct HtmlDriverFactory {
    client: Client,
    root_url: Url,
    selectors: SelectorConfig,
}

impl HtmlDriverFactory {
    pub fn new(client: Client, root_url: Url, selectors: SelectorConfig) -> Self {
        Self {
            client,
            root_url,
            selectors,
        }
    }
}

#[async_trait]
impl DriverFactory for HtmlDriverFactory {
    async fn open_context(&self) -> DriverResult<Box<dyn PageDriver>> {
        Ok(Box::new(HtmlDriver::new(
            self.client.clone(),
            self.root_url.clone(),
            self.selectors.clone(),
        )))
    }
}

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::models::product::{dedup_by_url, Product};
use crate::services::retry::with_backoff;

const SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";

/// CSS selectors tried in priority order when recovering a missing price
/// from a product page.
const PRICE_SELECTORS: [&str; 6] = [
    r#"meta[itemprop="price"]"#,
    r#"[itemprop="price"]"#,
    ".price-current",
    ".product-price",
    ".product__price",
    ".price",
];

/// Product-search gateway.
#[async_trait]
pub trait ProductSearch: Send + Sync {
    /// Search for products; `num` is clamped to [1, 10].
    async fn search(&self, query: &str, num: u32) -> Result<Vec<Product>, SearchError>;
}

/// Client for the Google Custom Search JSON API.
///
/// Missing credentials degrade to an empty result set with a warning rather
/// than failing the pipeline.
pub struct GoogleCseClient {
    http: Client,
    scrape_http: Client,
    api_key: Option<String>,
    engine_id: Option<String>,
    scrape_prices: bool,
}

#[derive(Deserialize)]
struct CseResponse {
    #[serde(default)]
    items: Vec<CseItem>,
}

#[derive(Deserialize)]
struct CseItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    pagemap: Option<CsePageMap>,
}

#[derive(Deserialize)]
struct CsePageMap {
    #[serde(default)]
    cse_image: Vec<CseImage>,
}

#[derive(Deserialize)]
struct CseImage {
    #[serde(default)]
    src: Option<String>,
}

impl GoogleCseClient {
    pub fn new(
        api_key: Option<String>,
        engine_id: Option<String>,
        scrape_prices: bool,
    ) -> Result<Self, SearchError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(SearchError::Http)?;
        let scrape_http = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("Mozilla/5.0 (compatible; SkinAnalysisBot/1.0)")
            .build()
            .map_err(SearchError::Http)?;
        Ok(Self {
            http,
            scrape_http,
            api_key,
            engine_id,
            scrape_prices,
        })
    }

    async fn search_once(&self, key: &str, cx: &str, query: &str, num: u32) -> Result<Vec<Product>, SearchError> {
        let response = self
            .http
            .get(SEARCH_URL)
            .query(&[
                ("key", key),
                ("cx", cx),
                ("q", query),
                ("num", &num.to_string()),
            ])
            .send()
            .await
            .map_err(SearchError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SearchError::Api(format!("HTTP {status}: {detail}")));
        }

        let parsed: CseResponse = response.json().await.map_err(SearchError::Http)?;
        Ok(map_items(parsed))
    }

    /// Best-effort price recovery for results that came back without one.
    /// Per-item failures are logged and never affect the overall search.
    async fn enrich_prices(&self, products: &mut [Product]) {
        for product in products.iter_mut().filter(|p| p.price.is_none()) {
            match self.scrape_http.get(&product.url).send().await {
                Ok(response) if response.status().is_success() => {
                    match response.text().await {
                        Ok(html) => {
                            if let Some(price) = extract_price(&html) {
                                tracing::debug!(url = %product.url, %price, "recovered price");
                                product.price = Some(price);
                            }
                        }
                        Err(e) => {
                            tracing::debug!(url = %product.url, error = %e, "price scrape read failed");
                        }
                    }
                }
                Ok(response) => {
                    tracing::debug!(url = %product.url, status = %response.status(), "price scrape refused");
                }
                Err(e) => {
                    tracing::debug!(url = %product.url, error = %e, "price scrape failed");
                }
            }
        }
    }
}

#[async_trait]
impl ProductSearch for GoogleCseClient {
    async fn search(&self, query: &str, num: u32) -> Result<Vec<Product>, SearchError> {
        let (Some(key), Some(cx)) = (self.api_key.as_deref(), self.engine_id.as_deref()) else {
            tracing::warn!("search credentials missing; returning empty products");
            return Ok(Vec::new());
        };

        let num = num.clamp(1, 10);
        let results =
            with_backoff("product_search", || self.search_once(key, cx, query, num)).await?;

        let mut products = dedup_by_url(results);
        tracing::info!(query, count = products.len(), "product search complete");

        if self.scrape_prices {
            self.enrich_prices(&mut products).await;
        }

        Ok(products)
    }
}

fn map_items(parsed: CseResponse) -> Vec<Product> {
    parsed
        .items
        .into_iter()
        .map(|item| Product {
            name: item.title.unwrap_or_default(),
            url: item.link.unwrap_or_default(),
            snippet: item.snippet,
            image_url: item
                .pagemap
                .and_then(|pm| pm.cse_image.into_iter().next())
                .and_then(|img| img.src),
            price: None,
            brand: None,
            category: None,
            rating: None,
        })
        .filter(Product::is_valid)
        .collect()
}

/// Extract a price string from product-page HTML.
///
/// Tries the prioritized CSS selectors first, then falls back to JSON-LD
/// (`application/ld+json`) offer data.
pub fn extract_price(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    for pattern in PRICE_SELECTORS {
        let selector = Selector::parse(pattern).expect("valid selector");
        for element in document.select(&selector) {
            let candidate = element
                .value()
                .attr("content")
                .map(str::to_string)
                .unwrap_or_else(|| element.text().collect::<String>());
            if let Some(price) = clean_price(&candidate) {
                return Some(price);
            }
        }
    }

    let jsonld = Selector::parse(r#"script[type="application/ld+json"]"#).expect("valid selector");
    for script in document.select(&jsonld) {
        let raw: String = script.text().collect();
        if let Ok(value) = serde_json::from_str::<Value>(&raw) {
            if let Some(price) = jsonld_price(&value) {
                return Some(price);
            }
        }
    }

    None
}

/// Walk a JSON-LD document looking for `offers.price` (or a bare `price`).
fn jsonld_price(value: &Value) -> Option<String> {
    match value {
        Value::Object(obj) => {
            if let Some(price) = obj.get("price") {
                if let Some(cleaned) = price_value(price) {
                    return Some(cleaned);
                }
            }
            for key in ["offers", "@graph"] {
                if let Some(nested) = obj.get(key) {
                    if let Some(price) = jsonld_price(nested) {
                        return Some(price);
                    }
                }
            }
            None
        }
        Value::Array(items) => items.iter().find_map(jsonld_price),
        _ => None,
    }
}

fn price_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => clean_price(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reject empty or implausibly long candidates; prices are short strings.
fn clean_price(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > 32 {
        return None;
    }
    if !trimmed.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(trimmed.to_string())
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("search API error: {0}")]
    Api(String),

    #[error("search service unavailable: {0}")]
    Unavailable(String),
}

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A product search result.
///
/// `name` and `url` are mandatory; entries missing either are dropped at the
/// search-gateway boundary before anything downstream sees them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
}

impl Product {
    /// A result is usable only when both name and url are present.
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty() && !self.url.is_empty()
    }
}

/// Remove duplicate products by `url`, keeping the first occurrence.
/// Idempotent: applying it twice yields the same list as applying it once.
pub fn dedup_by_url(products: Vec<Product>) -> Vec<Product> {
    let mut seen = HashSet::new();
    products
        .into_iter()
        .filter(|p| seen.insert(p.url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(name: &str, url: &str) -> Product {
        Product {
            name: name.to_string(),
            url: url.to_string(),
            price: None,
            snippet: None,
            image_url: None,
            brand: None,
            category: None,
            rating: None,
        }
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let products = vec![
            product("A", "https://a.example/1"),
            product("B", "https://a.example/2"),
            product("A-dup", "https://a.example/1"),
        ];
        let deduped = dedup_by_url(products);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].name, "A");
        assert_eq!(deduped[1].name, "B");
    }

    #[test]
    fn dedup_is_idempotent() {
        let products = vec![
            product("A", "https://a.example/1"),
            product("B", "https://a.example/2"),
            product("C", "https://a.example/1"),
            product("D", "https://a.example/3"),
        ];
        let once = dedup_by_url(products);
        let twice = dedup_by_url(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn validity_requires_name_and_url() {
        assert!(product("A", "https://a.example/1").is_valid());
        assert!(!product("", "https://a.example/1").is_valid());
        assert!(!product("A", "").is_valid());
    }

    #[test]
    fn optional_fields_default_on_deserialize() {
        let p: Product =
            serde_json::from_str(r#"{"name":"A","url":"https://a.example/1"}"#).unwrap();
        assert!(p.price.is_none());
        assert!(p.rating.is_none());
    }
}

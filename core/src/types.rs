//! Domain DTOs for the shop API.
//!
//! # Design
//! These types mirror the mock-server's schema but are defined independently;
//! integration tests catch any drift. JSON field names are
//! lower_case_with_underscores, which is what the Rust field names already
//! are, so no renaming is needed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decode::{AttributeValue, DateValue};

/// A blog article.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub published_at: DateValue,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One page of articles as shown on the blog screen.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticlePage {
    pub articles: Vec<Article>,
    /// True when the page came back full, so more articles may exist.
    pub has_more: bool,
}

impl ArticlePage {
    pub fn new(articles: Vec<Article>, per_page: u32) -> Self {
        let has_more = per_page > 0 && articles.len() == per_page as usize;
        Self { articles, has_more }
    }
}

/// A `{ attribute_code, value }` pair from a product's custom attributes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomAttribute {
    pub attribute_code: String,
    pub value: AttributeValue,
}

/// A catalog product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: u64,
    pub sku: String,
    pub name: String,
    pub price: f64,
    pub created_at: DateValue,
    pub updated_at: DateValue,
    #[serde(default)]
    pub custom_attributes: Vec<CustomAttribute>,
}

impl Product {
    /// Value of the custom attribute called `code`, if the product has one.
    pub fn attribute(&self, code: &str) -> Option<&AttributeValue> {
        self.custom_attributes
            .iter()
            .find(|a| a.attribute_code == code)
            .map(|a| &a.value)
    }
}

/// A page of products plus the total number of matches on the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductList {
    pub items: Vec<Product>,
    pub total_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(n: u128) -> Article {
        Article {
            id: Uuid::from_u128(n),
            title: format!("Post {n}"),
            content: String::new(),
            author: None,
            image_url: None,
            published_at: crate::decode::parse_date("2020-01-01").unwrap(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn full_page_has_more() {
        let page = ArticlePage::new((0..3).map(article).collect(), 3);
        assert!(page.has_more);
    }

    #[test]
    fn short_page_has_no_more() {
        let page = ArticlePage::new((0..2).map(article).collect(), 3);
        assert!(!page.has_more);
        assert!(!ArticlePage::new(Vec::new(), 0).has_more);
    }

    #[test]
    fn product_decodes_mixed_attributes_and_dates() {
        let raw = r#"{
            "id": 7,
            "sku": "MJ01",
            "name": "Jacket",
            "price": 59.5,
            "created_at": "2017-11-02 14:05:00",
            "updated_at": "2018-01-15T09:00:00Z",
            "custom_attributes": [
                {"attribute_code": "color", "value": "49"},
                {"attribute_code": "size", "value": ["S", "M"]},
                {"attribute_code": "special_price", "value": null}
            ]
        }"#;
        let product: Product = serde_json::from_str(raw).unwrap();
        assert_eq!(product.attribute("color"), Some(&AttributeValue::text("49")));
        assert_eq!(product.attribute("size").unwrap().label().as_deref(), Some("S, M"));
        assert!(product.attribute("special_price").unwrap().is_null());
        assert_eq!(product.attribute("missing"), None);
        assert_eq!(product.updated_at.to_string(), "2018-01-15T09:00:00Z");
    }

    #[test]
    fn article_optional_fields_default() {
        let raw = r#"{
            "id": "00000000-0000-0000-0000-000000000001",
            "title": "Hello",
            "content": "<p>Hi</p>",
            "published_at": "2019-05-04"
        }"#;
        let article: Article = serde_json::from_str(raw).unwrap();
        assert!(article.author.is_none());
        assert!(article.tags.is_empty());
    }
}

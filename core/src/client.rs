//! Request builders and response parsers for the shop API endpoints.
//!
//! # Design
//! `ShopApi` holds only a `base_url` and carries no mutable state between
//! calls. Each endpoint is split into a `build_*` method that produces an
//! `HttpRequest` and a `parse_*` method that consumes an `HttpResponse`.
//! Authentication, caching and retries are applied by `ShopClient` between
//! the two, so this layer stays deterministic and free of I/O.

use uuid::Uuid;

use crate::error::{ApiError, DecodeError};
use crate::http::{HttpRequest, HttpResponse};
use crate::types::{Article, ArticlePage, Product, ProductList};

/// Page size the blog screen asks for.
pub const DEFAULT_PER_PAGE: u32 = 10;

/// Synchronous, stateless builder/parser for the shop API.
#[derive(Debug, Clone)]
pub struct ShopApi {
    base_url: String,
}

impl ShopApi {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_list_articles(&self, per_page: u32) -> HttpRequest {
        json_get(format!("{}/blog/articles?per_page={per_page}", self.base_url))
    }

    pub fn build_get_article(&self, id: Uuid) -> HttpRequest {
        json_get(format!("{}/blog/articles/{id}", self.base_url))
    }

    pub fn build_list_products(&self, page_size: u32, current_page: u32) -> HttpRequest {
        json_get(format!(
            "{}/products?page_size={page_size}&current_page={current_page}",
            self.base_url
        ))
    }

    pub fn build_get_product(&self, sku: &str) -> HttpRequest {
        json_get(format!(
            "{}/products/{}",
            self.base_url,
            urlencoding::encode(sku)
        ))
    }

    pub fn parse_list_articles(
        &self,
        response: HttpResponse,
        per_page: u32,
    ) -> Result<ArticlePage, ApiError> {
        check_status(&response, 200)?;
        let articles: Vec<Article> = decode_body(&response)?;
        Ok(ArticlePage::new(articles, per_page))
    }

    pub fn parse_get_article(&self, response: HttpResponse) -> Result<Article, ApiError> {
        check_status(&response, 200)?;
        decode_body(&response)
    }

    pub fn parse_list_products(&self, response: HttpResponse) -> Result<ProductList, ApiError> {
        check_status(&response, 200)?;
        decode_body(&response)
    }

    pub fn parse_get_product(&self, response: HttpResponse) -> Result<Product, ApiError> {
        check_status(&response, 200)?;
        decode_body(&response)
    }
}

fn json_get(url: String) -> HttpRequest {
    HttpRequest::get(url).with_header("accept", "application/json")
}

fn decode_body<T: serde::de::DeserializeOwned>(response: &HttpResponse) -> Result<T, ApiError> {
    serde_json::from_str(&response.body).map_err(|e| ApiError::Decode(DecodeError::from(e)))
}

/// Map non-success status codes to the appropriate `ApiError` variant.
fn check_status(response: &HttpResponse, expected: u16) -> Result<(), ApiError> {
    if response.status == expected {
        return Ok(());
    }
    if response.status == 404 {
        return Err(ApiError::NotFound);
    }
    Err(ApiError::HttpError {
        status: response.status,
        body: response.body.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;

    fn api() -> ShopApi {
        ShopApi::new("http://localhost:3000")
    }

    fn respond(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    const ARTICLE: &str = r#"{"id":"00000000-0000-0000-0000-000000000001","title":"Spring sale","content":"<p>50% off</p>","published_at":"2018-03-01 09:30:00"}"#;

    #[test]
    fn build_list_articles_produces_correct_request() {
        let req = api().build_list_articles(10);
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.path, "http://localhost:3000/blog/articles?per_page=10");
        assert_eq!(req.header("accept"), Some("application/json"));
        assert!(req.header("authorization").is_none());
        assert!(req.body.is_none());
    }

    #[test]
    fn build_get_article_produces_correct_request() {
        let req = api().build_get_article(Uuid::nil());
        assert_eq!(
            req.path,
            "http://localhost:3000/blog/articles/00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn build_list_products_produces_correct_request() {
        let req = api().build_list_products(20, 2);
        assert_eq!(req.path, "http://localhost:3000/products?page_size=20&current_page=2");
    }

    #[test]
    fn build_get_product_encodes_sku() {
        let req = api().build_get_product("MJ01/red xl");
        assert_eq!(req.path, "http://localhost:3000/products/MJ01%2Fred%20xl");
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let req = ShopApi::new("http://localhost:3000/").build_list_articles(5);
        assert_eq!(req.path, "http://localhost:3000/blog/articles?per_page=5");
    }

    #[test]
    fn parse_list_articles_full_page() {
        let body = format!("[{ARTICLE}]");
        let page = api().parse_list_articles(respond(200, &body), 1).unwrap();
        assert_eq!(page.articles.len(), 1);
        assert_eq!(page.articles[0].title, "Spring sale");
        assert!(page.has_more);
    }

    #[test]
    fn parse_list_articles_short_page() {
        let body = format!("[{ARTICLE}]");
        let page = api().parse_list_articles(respond(200, &body), 10).unwrap();
        assert!(!page.has_more);
    }

    #[test]
    fn parse_get_article_not_found() {
        let err = api().parse_get_article(respond(404, "")).unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }

    #[test]
    fn parse_get_article_unauthorized_is_plain_http_error() {
        let err = api().parse_get_article(respond(401, "invalid token")).unwrap_err();
        assert!(matches!(err, ApiError::HttpError { status: 401, .. }));
    }

    #[test]
    fn parse_get_article_bad_date_is_decode_error() {
        let body = ARTICLE.replace("2018-03-01 09:30:00", "first of March");
        let err = api().parse_get_article(respond(200, &body)).unwrap_err();
        assert!(matches!(err, ApiError::Decode(DecodeError::Shape(_))));
    }

    #[test]
    fn parse_list_products_bad_json() {
        let err = api().parse_list_products(respond(200, "not json")).unwrap_err();
        assert!(matches!(err, ApiError::Decode(DecodeError::Syntax(_))));
    }

    #[test]
    fn parse_get_product_success() {
        let body = r#"{"id":1,"sku":"MJ01","name":"Jacket","price":59.0,
            "created_at":"2017-11-02 14:05:00","updated_at":"2017-11-02 14:05:00",
            "custom_attributes":[{"attribute_code":"size","value":["S","M"]}]}"#;
        let product = api().parse_get_product(respond(200, body)).unwrap();
        assert_eq!(product.sku, "MJ01");
        assert_eq!(product.attribute("size").unwrap().as_list().unwrap().len(), 2);
    }

    #[test]
    fn parse_list_products_server_error() {
        let err = api().parse_list_products(respond(500, "boom")).unwrap_err();
        assert!(matches!(err, ApiError::HttpError { status: 500, .. }));
    }
}

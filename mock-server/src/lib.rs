use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_API_KEY: &str = "test-api-key";

/// Freshness the server grants article and product-list responses.
pub const LIST_MAX_AGE: u64 = 60;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author: Option<String>,
    pub image_url: Option<String>,
    /// Kept as the raw string the backend emits; formats vary per article.
    pub published_at: String,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CustomAttribute {
    pub attribute_code: String,
    pub value: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub sku: String,
    pub name: String,
    pub price: f64,
    pub created_at: String,
    pub updated_at: String,
    pub custom_attributes: Vec<CustomAttribute>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProductList {
    pub items: Vec<Product>,
    pub total_count: u64,
}

#[derive(Deserialize)]
pub struct ArticleQuery {
    pub per_page: Option<usize>,
}

#[derive(Deserialize)]
pub struct ProductQuery {
    pub page_size: Option<usize>,
    pub current_page: Option<usize>,
}

struct ShopData {
    api_key: String,
    articles: Vec<Article>,
    products: BTreeMap<String, Product>,
    hits: AtomicUsize,
}

/// Seeded in-memory shop backend. Clones share the same data and counters.
#[derive(Clone)]
pub struct MockShop {
    data: Arc<ShopData>,
}

impl MockShop {
    pub fn new(api_key: &str) -> Self {
        let products = seed_products()
            .into_iter()
            .map(|p| (p.sku.clone(), p))
            .collect();
        Self {
            data: Arc::new(ShopData {
                api_key: api_key.to_string(),
                articles: seed_articles(),
                products,
                hits: AtomicUsize::new(0),
            }),
        }
    }

    /// Authorized requests that reached a handler.
    pub fn hits(&self) -> usize {
        self.data.hits.load(Ordering::SeqCst)
    }

    pub fn articles(&self) -> &[Article] {
        &self.data.articles
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/blog/articles", get(list_articles))
            .route("/blog/articles/{id}", get(get_article))
            .route("/products", get(list_products))
            .route("/products/{sku}", get(get_product))
            .route_layer(middleware::from_fn_with_state(self.clone(), require_bearer))
            .with_state(self.clone())
    }
}

pub fn app() -> Router {
    MockShop::new(DEFAULT_API_KEY).router()
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with(listener, MockShop::new(DEFAULT_API_KEY)).await
}

pub async fn run_with(listener: TcpListener, shop: MockShop) -> Result<(), std::io::Error> {
    axum::serve(listener, shop.router()).await
}

/// Reject requests without exactly one `Authorization: Bearer <key>` header.
async fn require_bearer(State(shop): State<MockShop>, request: Request, next: Next) -> Response {
    let expected = format!("Bearer {}", shop.data.api_key);
    let (count, authorized) = {
        let values: Vec<_> = request.headers().get_all(header::AUTHORIZATION).iter().collect();
        let authorized = values
            .first()
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == expected);
        (values.len(), authorized)
    };
    if count > 1 {
        return error(StatusCode::BAD_REQUEST, "duplicate Authorization header");
    }
    if !authorized {
        debug!(uri = %request.uri(), "Rejecting request with bad bearer token");
        return error(StatusCode::UNAUTHORIZED, "The consumer isn't authorized to access resource.");
    }
    shop.data.hits.fetch_add(1, Ordering::SeqCst);
    next.run(request).await
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

fn max_age(seconds: u64) -> [(header::HeaderName, String); 1] {
    [(header::CACHE_CONTROL, format!("max-age={seconds}"))]
}

async fn list_articles(State(shop): State<MockShop>, Query(query): Query<ArticleQuery>) -> Response {
    let per_page = query.per_page.unwrap_or(10);
    let page: Vec<Article> = shop.data.articles.iter().take(per_page).cloned().collect();
    (max_age(LIST_MAX_AGE), Json(page)).into_response()
}

async fn get_article(State(shop): State<MockShop>, Path(id): Path<Uuid>) -> Response {
    match shop.data.articles.iter().find(|a| a.id == id) {
        Some(article) => (max_age(LIST_MAX_AGE), Json(article.clone())).into_response(),
        None => error(StatusCode::NOT_FOUND, "Requested article doesn't exist"),
    }
}

async fn list_products(State(shop): State<MockShop>, Query(query): Query<ProductQuery>) -> Response {
    let page_size = query.page_size.unwrap_or(20).max(1);
    let current_page = query.current_page.unwrap_or(1).max(1);
    let items: Vec<Product> = shop
        .data
        .products
        .values()
        .skip((current_page - 1) * page_size)
        .take(page_size)
        .cloned()
        .collect();
    let list = ProductList {
        items,
        total_count: shop.data.products.len() as u64,
    };
    (max_age(LIST_MAX_AGE), Json(list)).into_response()
}

/// Single products are always revalidated: `max-age=0` plus an ETag, and a
/// matching `If-None-Match` gets `304 Not Modified`.
async fn get_product(
    State(shop): State<MockShop>,
    Path(sku): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(product) = shop.data.products.get(&sku) else {
        return error(StatusCode::NOT_FOUND, "Requested product doesn't exist");
    };
    let etag = format!("\"{}-{}\"", product.sku, product.id);
    let cache_headers = [
        (header::ETAG, etag.clone()),
        (header::CACHE_CONTROL, "max-age=0".to_string()),
    ];
    let matches = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == etag);
    if matches {
        return (StatusCode::NOT_MODIFIED, cache_headers).into_response();
    }
    (cache_headers, Json(product.clone())).into_response()
}

fn seed_articles() -> Vec<Article> {
    vec![
        Article {
            id: Uuid::from_u128(1),
            title: "Spring collection is here".to_string(),
            content: "<p>Fresh colors for the new season.</p>".to_string(),
            author: Some("Olena".to_string()),
            image_url: Some("https://cdn.shop.test/blog/spring.jpg".to_string()),
            published_at: "2018-03-01 09:30:00".to_string(),
            tags: vec!["news".to_string(), "collection".to_string()],
        },
        Article {
            id: Uuid::from_u128(2),
            title: "Valentine's gift guide".to_string(),
            content: "<p>Ten gifts under $50.</p>".to_string(),
            author: None,
            image_url: None,
            published_at: "2018-02-14T08:00:00+01:00".to_string(),
            tags: vec!["guide".to_string()],
        },
        Article {
            id: Uuid::from_u128(3),
            title: "How to choose a winter jacket".to_string(),
            content: "<p>Insulation, fit and shell fabrics explained.</p>".to_string(),
            author: Some("Marek".to_string()),
            image_url: None,
            published_at: "2018-01-20".to_string(),
            tags: Vec::new(),
        },
    ]
}

fn attribute(code: &str, value: Value) -> CustomAttribute {
    CustomAttribute {
        attribute_code: code.to_string(),
        value,
    }
}

fn seed_products() -> Vec<Product> {
    vec![
        Product {
            id: 1,
            sku: "MJ01".to_string(),
            name: "Beaumont Summit Kit".to_string(),
            price: 42.0,
            created_at: "2017-11-02 14:05:00".to_string(),
            updated_at: "2018-01-15T09:00:00Z".to_string(),
            custom_attributes: vec![
                attribute("color", json!("49")),
                attribute("size", json!(["S", "M", "L"])),
                attribute("special_price", Value::Null),
                attribute("dimensions", json!({ "width": 30, "height": 40.5 })),
                attribute("featured", json!(true)),
            ],
        },
        Product {
            id: 2,
            sku: "MH02".to_string(),
            name: "Teton Pullover Hoodie".to_string(),
            price: 70.0,
            created_at: "03/04/2018".to_string(),
            updated_at: "2018-04-03 10:00:00".to_string(),
            custom_attributes: vec![attribute("material", json!(["Cotton", "Polyester"]))],
        },
        Product {
            id: 3,
            sku: "WS03".to_string(),
            name: "Iris Workout Top".to_string(),
            price: 29.0,
            created_at: "25/12/2017".to_string(),
            updated_at: "2017-12-25".to_string(),
            custom_attributes: Vec::new(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_serializes_raw_date_string() {
        let article = &seed_articles()[1];
        let json = serde_json::to_value(article).unwrap();
        assert_eq!(json["id"], "00000000-0000-0000-0000-000000000002");
        assert_eq!(json["published_at"], "2018-02-14T08:00:00+01:00");
        assert_eq!(json["author"], Value::Null);
    }

    #[test]
    fn product_attributes_keep_their_json_kinds() {
        let json = serde_json::to_value(&seed_products()[0]).unwrap();
        let attrs = json["custom_attributes"].as_array().unwrap();
        assert!(attrs[0]["value"].is_string());
        assert!(attrs[1]["value"].is_array());
        assert!(attrs[2]["value"].is_null());
        assert!(attrs[3]["value"].is_object());
        assert!(attrs[4]["value"].is_boolean());
    }

    #[test]
    fn seeded_products_have_unique_skus() {
        let shop = MockShop::new("k");
        assert_eq!(shop.data.products.len(), seed_products().len());
        assert_eq!(shop.hits(), 0);
    }
}

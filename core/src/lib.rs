//! API client core for the shop backend.
//!
//! # Overview
//! [`factory::build`] turns a [`ClientConfig`] into a [`ShopClient`] that
//! attaches a bearer token to every request, caches responses on disk with
//! standard HTTP semantics, retries once on connection failure and logs
//! traffic through `tracing`. [`ShopApi`] builds endpoint requests and parses
//! their responses into the DTOs in [`types`].
//!
//! # Design
//! - `ShopApi` is stateless and does no I/O; `ShopClient` runs the pipeline
//!   between its `build_*` and `parse_*` halves.
//! - The network sits behind the [`Transport`] trait so tests can script it.
//! - Polymorphic attribute values and multi-format dates have hand-written
//!   serde visitors in [`decode`].
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod cache;
pub mod card_expiry;
pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod factory;
pub mod http;
mod logging;
pub mod transport;
pub mod types;

pub use cache::{CacheControl, CacheLookup, HttpCache};
pub use client::{ShopApi, DEFAULT_PER_PAGE};
pub use config::{ApiKey, ClientConfig, ClientConfigBuilder, HttpLogLevel};
pub use decode::{decode_attribute_value, decode_date, parse_date, AttributeValue, DateValue, Scalar};
pub use error::{ApiError, CacheError, ConfigError, DecodeError, TransportError};
pub use factory::{build, build_with_transport, ShopClient};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use transport::{Transport, UreqTransport};
pub use types::{Article, ArticlePage, CustomAttribute, Product, ProductList};

//! Remote access for the content and flag feeds.
//!
//! This module provides the `ConditionalFetcher`, which performs ETag
//! conditional GETs with retry and exponential backoff, and classifies the
//! result as unchanged, fetched or failed. The network itself sits behind
//! the `HttpTransport` trait; `ReqwestTransport` is the production client.

pub mod client;
pub mod error;
pub mod transport;

pub use client::{ConditionalFetcher, Connectivity, FetchOutcome, RetryPolicy};
pub use error::FetchError;
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};

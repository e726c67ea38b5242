//! Matrix API client.
//!
//! Async HTTP client for the Matrix model-hosting platform: chunked
//! repository upload, repository lifecycle calls, and model calls with
//! input upload, status polling and result download.

pub mod client;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use client::{Client, ClientOptions, Error, extension_for_mime};

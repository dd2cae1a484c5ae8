//! Remote album metadata lookup.
//!
//! # Architecture
//!
//! - **Domain** (`domain.rs`) - Our error type for the lookup service
//! - **DTOs** (`dto.rs`) - Exact shapes of the Last.fm replies we read
//! - **Client** (`client.rs`) - HTTP client for the Last.fm 2.0 API
//! - **Traits** (`traits.rs`) - The [`LookupApi`] seam, plus mocks for tests
//!
//! The cover fetchers only depend on [`LookupApi`], so the transport can be
//! swapped (or mocked) without touching the fallback chain.

mod client;
pub mod domain;
pub mod dto;
pub mod traits;

pub use client::{DEFAULT_BASE_URL, LastFmClient};
pub use domain::LookupError;
pub use traits::LookupApi;

//! # Data Retrieval Module
//!
//! Clients for the scheduling service's REST boundary. The real-time socket
//! only tells a page that something changed; pages re-read the data itself
//! through these.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: a generic `ApiClient` built on `reqwest` and
//!   `reqwest-middleware`, with exponential-backoff retries and bearer auth.
//! - **`resources`**: typed CRUD over the `/api/v1/` collections.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Generic HTTP API client with retry middleware.
pub mod ky_http;
/// CRUD helpers for the scheduling collections.
pub mod resources;

pub use ky_http::{ApiClient, ApiError, ApiResponse};
pub use resources::{Resource, ResourceClient};

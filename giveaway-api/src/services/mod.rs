//! Service Layer
//!
//! Read-side access to the cache for HTTP handlers. Handlers never touch the
//! controller's lock directly.

mod metrics_service;

pub use metrics_service::*;

//! # Tower Refill
//!
//! `tower-refill` puts a [`refill_limit::RateLimiter`] in front of any
//! [Tower](https://github.com/tower-rs/tower) service.
//!
//! ## Layers
//!
//! - [`RefillLimitLayer`] holds each request in `poll_ready` until the limiter grants a
//!   permit. It can instead fail fast with [`RefillError::RateLimited`], or give up after a
//!   timeout with [`RefillError::Timeout`].
//! - [`ManagedRefillLayer`] is a pre-composed stack for servers. It bounds the wait for a
//!   permit, refuses at once with [`RefillError::RateLimited`] when the limiter's hint lies
//!   beyond that bound, and maps every error into [`RefillError`].
//!
//! The limiter is shared, so several services (or clones of one) draw from the same pool.
//!
//! ## Feature Flags
//!
//! - `axum`: Enables `IntoResponse` for [`RefillError`], allowing automatic conversion
//!   to HTTP status codes (408, 429, 500).

mod error;
mod layer;
mod managed_layer;
mod service;


pub use error::RefillError;
pub use layer::RefillLimitLayer;
pub use managed_layer::ManagedRefillLayer;
pub use service::RefillLimitService;

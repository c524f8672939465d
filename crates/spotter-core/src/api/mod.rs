//! REST API client module for the gym backend.
//!
//! This module provides the `ApiClient`, which turns each configured
//! `TransportMethod` into a transport function for the resource cache.
//!
//! Authenticated endpoints take a bearer token supplied by configuration.

pub mod client;
pub mod error;

pub use client::{ApiClient, TransportMethod};
pub use error::ApiError;

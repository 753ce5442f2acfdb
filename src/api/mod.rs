//! REST API client module for the gasrun backend.
//!
//! This module provides the `ApiClient` for communicating with the
//! driver-facing backend: order listing and detail, delivery
//! confirmation with the casco settlement payload, the container-group
//! catalog, and location telemetry upload.
//!
//! The API uses JWT bearer token authentication obtained through the
//! `/api/login` endpoint; the base URL is supplied by the driver during
//! initial setup.

pub mod client;
pub mod error;

pub use client::{ApiClient, ContactChannel};
pub use error::ApiError;

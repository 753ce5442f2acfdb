//! gasrun-core - core library for the gasrun delivery-driver app.
//!
//! This crate holds everything below the UI: the typed backend client,
//! session handling, the returnable-container ("casco") reconciliation
//! engine, the geocoding resolver with its persistent cache, and the
//! background location sampling coordinator. The app shell owns screens,
//! navigation and notification plumbing and drives these components.

pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod geocode;
pub mod location;
pub mod models;
pub mod reconcile;

//! Project/artifact repository service.
//!
//! Metadata lives in SQLite, payloads in an object store (local disk or
//! S3-compatible); [`services::repository::Repository`] keeps the two in step
//! and [`routes::routes::routes`] exposes everything over HTTP.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod server;
pub mod services;

//! HTTP layer.
//!
//! axum server exposing token verification, health and metrics endpoints.

pub mod handler;

//! Clip Arena Backend Library
//!
//! Exposes core modules for use by the binary and integration tests.

pub mod api;
pub mod credentials;
pub mod engine;
pub mod middleware;
pub mod models;
pub mod platforms;
pub mod store;

//! Logistics API backend
//!
//! A small HTTP service with:
//! - health, banner and readiness endpoints under `/api`
//! - a lazily opened Postgres pool shared by all requests
//! - logo resolution for PDF rendering with text fallbacks

pub mod api;
pub mod assets;
pub mod config;
pub mod database;
pub mod error;
pub mod server;
pub mod state;

pub use error::{Error, Result};
pub use server::build_app;
pub use state::AppState;

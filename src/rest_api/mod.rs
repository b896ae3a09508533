//! HTTP endpoints for probes and scraping
//!
//! Serves `/health` and `/metrics` beside the watch loop.

mod handlers;
mod server;

pub use handlers::HealthResponse;
pub use server::{router, run_server};

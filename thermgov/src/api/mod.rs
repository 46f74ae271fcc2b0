//! HTTP API for the governor.
//!
//! Read-only status plus the tunables surface. Versioned under `/api/v0`,
//! with the OpenAPI document served at `/api-docs/openapi.json`.

pub mod server;
mod v0;

pub use server::{ApiError, SharedState, router, serve};

//! HTTP gateway for the Scrapor pipeline.
//!
//! The externally visible surface: creates jobs (foreground or
//! background), exposes job status and listing, cooperative
//! cancellation, and aggregated downstream health. All handlers return
//! a well-formed job or a JSON error body — never an unhandled fault.

/// Request/response DTOs and route handlers.
pub mod routes;
/// Router construction and shared state.
pub mod server;

pub use server::{AppState, GatewayServer};

//! HTTP API for the local web client.
//!
//! Exposes the extraction pipeline as JSON endpoints nested under `/api/`.
//! `api_router()` returns a composable `Router`; `server` owns the listener
//! lifecycle.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use router::{api_router, api_router_with_context};
pub use server::{start_api_server, ApiServer, ApiSession};
pub use types::ApiContext;

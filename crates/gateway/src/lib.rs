//! Gateway: HTTP API over the sandbox engine.
//!
//! Lifecycle:
//! 1. Build the engine from config (done by the CLI)
//! 2. Bind the listener and mount the REST routes
//! 3. On shutdown, destroy every sandbox still registered
//!
//! Engine errors map onto status codes in `error.rs`.

pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use {
    server::{build_gateway_app, start_gateway},
    state::GatewayState,
};

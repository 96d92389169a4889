//! ldk-daemon library target.
//!
//! Exposes the router and state for integration tests; `main.rs` only wires
//! configuration, the database pool and middleware around them.

pub mod api_types;
pub mod routes;
pub mod state;

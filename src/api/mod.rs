//! Thin HTTP surface over the engine. Routes never contain business
//! logic; they parse inputs, call into [`crate::engine::Engine`] or
//! [`crate::alerts::AlertManager`], and wrap the result in the
//! `{success, data, error, meta}` envelope.

pub mod auth;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_routes;
pub use state::AppState;

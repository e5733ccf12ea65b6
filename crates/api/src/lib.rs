//! HTTP API layer for funnel analytics.

pub mod extractors;
pub mod response;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::{AppState, StateSettings};

//! Shared helpers for the integration test binaries.

pub mod containers;
pub mod fixtures;
pub mod mocks;
pub mod setup;

//! Core types, validation and pure rollup logic for funnel analytics.

pub mod dashboard;
pub mod detail;
pub mod device;
pub mod error;
pub mod events;
pub mod limits;
pub mod location;
pub mod reporting;
pub mod retention;
pub mod rollup;
pub mod session;
pub mod user;

pub use dashboard::*;
pub use detail::*;
pub use device::DeviceSummary;
pub use error::{Error, Result};
pub use events::*;
pub use location::*;
pub use reporting::*;
pub use retention::*;
pub use rollup::*;
pub use session::*;
pub use user::*;

//! Tracking client for marketing pages.
//!
//! [`IdentityResolver`] hands out the visitor and session ids;
//! [`AnalyticsSession`] posts events to `POST /analytics`, tracks scroll,
//! section and form engagement, submits signups, and keeps a small retry
//! queue for posts that failed.

pub mod client;
pub mod identity;

pub use client::{
    AnalyticsSession, TrackPayload, TrackerConfig, LEFT_EARLY_MAX_SCROLL, MAX_RETRY_QUEUE,
};
pub use identity::{
    generate_id, IdentityResolver, KeyValueStorage, MemoryStorage, StorageScope, SESSION_KEY,
    VISITOR_KEY,
};

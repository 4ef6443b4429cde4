//! Data transfer objects exchanged with clients.

use std::time::SystemTime;

use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod dashboard;
pub mod health;
pub mod play;
pub mod session;
pub mod sse;
pub mod validation;

/// Render a [`SystemTime`] as an RFC 3339 string for client payloads.
pub(crate) fn format_system_time(value: SystemTime) -> String {
    OffsetDateTime::from(value)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".to_owned())
}

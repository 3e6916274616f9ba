//! Data models for the forum client.
//!
//! Canonical records as held by the synchronization layer, plus the insert payloads sent to the gateway.

mod profile;
mod question;
mod response;
mod theme;

pub use profile::*;
pub use question::*;
pub use response::*;
pub use theme::*;

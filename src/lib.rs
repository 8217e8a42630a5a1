//! imessage-relay: webhook-to-iMessage delivery service.
//!
//! Accepts JSON webhooks and delivers the message either to an existing
//! group chat (matched by name) or to individual recipients, falling back
//! from the former to the latter when the group cannot be found.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod config;
pub mod delivery;
pub mod logging;
pub mod webhook;

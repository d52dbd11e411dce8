//! IRC transport for the Zubr lounge.
//!
//! Provides line parsing, RPL_ISUPPORT extraction, reconnect backoff and a
//! per-network connection task that reports its lifecycle as events.

pub mod client;
pub mod event;
pub mod irc;
pub mod isupport;
pub mod reconnect;

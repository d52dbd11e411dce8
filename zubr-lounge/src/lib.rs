//! Persistent IRC session core.
//!
//! Each configured network gets a runner that drives its connection
//! lifecycle: registration, server-option negotiation, channel rejoin,
//! away restoration, capability probing and reconnects. Status changes are
//! pushed to whichever viewers happen to be attached.

pub mod api;
pub mod config;
pub mod error;
pub mod ident;
pub mod input;
pub mod network;
pub mod probe;
pub mod runner;
pub mod server_options;
pub mod session;
pub mod status;
pub mod store;
pub mod supervisor;
pub mod viewer;

//! Test harness for placement driver clusters reachable over unix sockets.
//!
//! The crate stands up N cooperating instances, waits until they converge on
//! a leader and drives the control-plane protocol (`Bootstrap`, `PutStore`,
//! `RegionHeartbeat`) against it. A small reference instance ([`Server`])
//! is bundled so the harness has something real to drive.

mod api;
mod config;
mod constants;
mod errors;
mod server;

pub mod harness;
pub mod proto;
pub mod transport;
pub mod utils;

pub use api::*;
pub use config::*;
pub use constants::*;
pub use errors::*;
pub use harness::*;
pub use server::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;

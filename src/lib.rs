//! Concurrent ICMP echo probing of many hosts over one shared socket.
//!
//! A [`Prober`] resolves each address, sends a fixed number of echo requests
//! to every host in parallel and matches replies back to their host by
//! source address. Results come back as one [`ProbeResult`] per address.
//!
//! ## Example
//! Probing a few hosts from the command line (requires permission to open
//! ICMP sockets):
//! ```no_run
#![doc = include_str!("../demos/ping.rs")]
//! ```
//! [`RoomProber`] wraps the same flow for hosts listed by a [`DeviceDirectory`].

pub mod error;
pub mod probe;
pub mod prober;
pub mod resolver;
pub mod room;
pub mod transport;

pub(crate) mod caching;
pub(crate) mod constants;
pub(crate) mod listener;
pub(crate) mod packet;
pub(crate) mod registry;
pub(crate) mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
pub use probe::{ProbeConfig, ProbeResult, ResultSet};
pub use prober::{Prober, ProberConfig, ProberConfigBuilder};
pub use resolver::{resolve, Resolve, SystemResolver};
pub use room::{Device, DeviceDirectory, RoomProber};
pub use transport::{IcmpSocket, SocketKind, Transport};

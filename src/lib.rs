//! tracker-io - Protocol layer for spatial tracking devices
//!
//! Streams position, velocity, acceleration, transform and workspace reports
//! from a tracker server to remote clients over a message connection.
//!
//! ## Layout
//!
//! - [`core`]: report model, `DeviceState`, capability traits
//! - [`protocol`]: fixed-layout wire codec and message catalogue
//! - [`framing`]: serial framing engine and the reference frame driver
//! - [`registry`]: per-kind, per-sensor handler lists and dispatch
//! - [`connection`]: loopback and TCP message connections
//! - [`transport`]: serial byte transports
//! - [`sources`]: null, canned and serial report sources
//! - [`server`] / [`client`]: server-side tracker and client-side proxy
//!
//! ## Features
//!
//! - `serial` (default): `SerialTransport` on top of the `serialport` crate

pub mod client;
pub mod config;
pub mod connection;
pub mod core;
pub mod error;
pub mod framing;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod sources;
pub mod transport;

// Re-export commonly used types
pub use client::TrackerRemote;
pub use config::Config;
pub use error::{Error, Result};
pub use registry::{Handler, SharedRegistry, SubscriptionRegistry};
pub use server::TrackerServer;

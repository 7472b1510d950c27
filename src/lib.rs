//! Server-side implementation of the PixelPusher protocol: a discovery
//! beacon and a pixel-ingest receiver for a pluggable LED output device.
//!
//! Embed this crate by implementing [`device::OutputDevice`] for whatever
//! you want pixels to end up in, then call [`server::start`] with a
//! [`server::PPOptions`] and your device. Call [`server::shutdown`] to stop.
//!
//! This crate does not initialize a logger; it only emits records through
//! the `log` facade, leaving that decision to the embedding binary.

pub mod affinity;
pub mod beacon;
pub mod device;
pub mod error;
pub mod nic;
pub mod receiver;
pub mod server;
pub mod wire;

pub use device::OutputDevice;
pub use error::{NicError, StartError};
pub use server::{shutdown, start, PPOptions};
pub use wire::PixelColor;

//! Typed errors for the two failure surfaces spec.md §7 distinguishes as
//! non-fatal-but-reportable: NIC probing and server startup. Fatal runtime
//! errors (socket/bind/broadcast setup failures inside a running thread)
//! are logged and abort the process per spec.md §7 kind 2, so they have no
//! corresponding `Result` variant here — there is no caller left to hand
//! one back to.

use thiserror::Error;

/// Failure probing a network interface for its hardware and IPv4 address.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NicError {
    #[error("network interface {0:?} not found")]
    InterfaceNotFound(String),

    #[error("network interface {0:?} has no usable hardware or IPv4 address")]
    AddressUnavailable(String),
}

/// Failure starting the PixelPusher server.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("udp_packet_size {size} out of range 200..=65507")]
    PacketSizeOutOfRange { size: u32 },

    #[error(
        "a single strip row ({need} bytes) does not fit in the usable packet size ({usable} bytes); \
         increase udp_packet_size or reduce pixels_per_strip"
    )]
    RowTooLarge { need: usize, usable: usize },

    #[error("network interface {interface:?} never became available after {retries} retries: {source}")]
    NetworkUnavailable {
        interface: String,
        retries: u32,
        #[source]
        source: NicError,
    },

    #[error("a PixelPusher server is already running in this process")]
    AlreadyRunning,

    #[error("fatal I/O error during startup: {0}")]
    Io(#[source] std::io::Error),
}

impl From<std::io::Error> for StartError {
    fn from(err: std::io::Error) -> Self {
        StartError::Io(err)
    }
}

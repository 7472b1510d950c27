//! The pluggable output device contract (spec.md §6, "OutputDevice
//! contract"). This crate never implements a device itself — it's a
//! collaborator supplied by the embedding program (an LED matrix driver,
//! a simulator, whatever the caller wants pixels to end up in).

use crate::wire::PixelColor;

/// A sink for decoded PixelPusher frames.
///
/// `num_strips` and `num_pixel_per_strip` are queried once at server
/// startup and assumed constant for the server's lifetime. For every
/// datagram that parses as a pixel frame, the receiver calls
/// `start_frame`, then one `set_pixel` per pixel in strip order, then
/// `flush_frame` — always in that order, always paired. `strip` indices
/// are **not** validated against `num_strips` (spec.md §9(c)); an
/// implementation must tolerate out-of-range indices itself if it cares.
///
/// Calls are serialized by the receiver's single thread, so an
/// implementation does not need to be internally thread-safe.
pub trait OutputDevice {
    /// Number of addressable strips this device exposes.
    fn num_strips(&self) -> usize;

    /// Number of pixels on each strip.
    fn num_pixel_per_strip(&self) -> usize;

    /// Called once per incoming pixel datagram, before any `set_pixel`
    /// calls for it. `full_update` is a hint: true when the datagram's
    /// strip count equals `num_strips`, i.e. every strip is about to be
    /// rewritten, which a double-buffered device can use to swap buffers
    /// instead of mutating in place.
    fn start_frame(&mut self, full_update: bool) {
        let _ = full_update;
    }

    /// Sets a single pixel decoded from the current datagram.
    fn set_pixel(&mut self, strip: i32, pixel: i32, color: PixelColor);

    /// Called once per incoming pixel datagram, after all of its
    /// `set_pixel` calls.
    fn flush_frame(&mut self);

    /// Called for a datagram recognized as a pusher command (sequence
    /// number + 16-byte magic) rather than a pixel frame. `payload` is
    /// everything after the magic; the server does not interpret it.
    fn handle_pusher_command(&mut self, payload: &[u8]) {
        let _ = payload;
    }
}

//! Discovery beacon (spec.md §4.C): owns the authoritative copy of
//! discovery telemetry and broadcasts it once a second, while accepting
//! concurrent stats updates from the receiver under a mutex.

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{error, info, warn};

use crate::wire::{
    DiscoveryHeader, PixelPusherBase, PixelPusherExt, DISCOVERY_BROADCAST_ADDR,
    DISCOVERY_HEADER_LEN, EXT_LEN, MIN_UPDATE_PERIOD_US,
};

pub(crate) struct Telemetry {
    pub(crate) base: PixelPusherBase,
    /// `-1` until the first `update_stats` call, matching the original's
    /// `previous_sequence_ = -1` sentinel (spec.md §9(b)): the first
    /// reported sequence number is treated as a gap of that size.
    pub(crate) previous_sequence: i64,
}

/// Broadcasts the PixelPusher discovery packet once a second and serves as
/// the single mutex-guarded owner of the mutable telemetry fields
/// (`update_period`, `delta_sequence`, `previous_sequence`) the receiver
/// posts to via `update_stats`.
pub struct Beacon {
    header: DiscoveryHeader,
    ext: PixelPusherExt,
    pub(crate) telemetry: Mutex<Telemetry>,
    packet_len: usize,
    stop: Arc<AtomicBool>,
}

impl Beacon {
    pub fn new(
        header: DiscoveryHeader,
        base: PixelPusherBase,
        ext: PixelPusherExt,
        stop: Arc<AtomicBool>,
    ) -> Arc<Self> {
        let packet_len = DISCOVERY_HEADER_LEN + base.size() + EXT_LEN;
        Arc::new(Beacon {
            header,
            ext,
            telemetry: Mutex::new(Telemetry {
                base,
                previous_sequence: -1,
            }),
            packet_len,
            stop,
        })
    }

    /// Posts the result of processing one pixel datagram. Under the
    /// beacon's mutex: floors `update_period` at `MIN_UPDATE_PERIOD_US`,
    /// and if the gap between `seen_sequence` and the last-seen sequence
    /// is positive, accumulates it into `delta_sequence`.
    pub fn update_stats(&self, seen_sequence: u32, packet_processing_duration_us: u32) {
        let mut telemetry = self.telemetry.lock().unwrap();
        telemetry.base.update_period_us = packet_processing_duration_us.max(MIN_UPDATE_PERIOD_US);

        let gap = seen_sequence as i64 - telemetry.previous_sequence - 1;
        if gap > 0 {
            telemetry.base.delta_sequence = telemetry.base.delta_sequence.saturating_add(gap as u32);
        }
        telemetry.previous_sequence = seen_sequence as i64;
    }

    /// Runs the broadcast loop until `stop` is set. Intended to be the
    /// body of a dedicated thread; does not return until stopped.
    pub fn run(&self) {
        let socket = match UdpSocket::bind("0.0.0.0:0") {
            Ok(socket) => socket,
            Err(e) => {
                error!("beacon: failed to create broadcast socket: {e}");
                std::process::abort();
            }
        };
        if let Err(e) = socket.set_broadcast(true) {
            error!("beacon: failed to enable SO_BROADCAST: {e}");
            std::process::abort();
        }

        info!(
            "beacon: broadcasting discovery packets ({} bytes) to {}",
            self.packet_len, DISCOVERY_BROADCAST_ADDR
        );

        let mut packet = vec![0u8; self.packet_len];
        while !self.stop.load(Ordering::Relaxed) {
            {
                let mut telemetry = self.telemetry.lock().unwrap();
                let base_len = telemetry.base.size();
                let (header_buf, rest) = packet.split_at_mut(DISCOVERY_HEADER_LEN);
                let (base_buf, ext_buf) = rest.split_at_mut(base_len);

                self.header
                    .write_to(header_buf)
                    .expect("header buffer sized from DISCOVERY_HEADER_LEN");
                telemetry
                    .base
                    .write_to(base_buf)
                    .expect("base buffer sized from base.size()");
                self.ext
                    .write_to(ext_buf)
                    .expect("ext buffer sized from EXT_LEN");

                // Delta sequence resets atomically with each transmission.
                telemetry.base.delta_sequence = 0;
            }

            if let Err(e) = socket.send_to(&packet, DISCOVERY_BROADCAST_ADDR) {
                warn!("beacon: broadcast send failed: {e}");
            }

            thread::sleep(Duration::from_secs(1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::DEVICE_TYPE_PIXELPUSHER;
    use hwaddr::HwAddr;
    use std::net::Ipv4Addr;

    fn make_beacon() -> Arc<Beacon> {
        let header = DiscoveryHeader {
            mac_address: HwAddr::from(&[0u8, 1, 2, 3, 4, 5][..]),
            ip_address: Ipv4Addr::new(10, 0, 0, 1),
            device_type: DEVICE_TYPE_PIXELPUSHER,
            protocol_version: 1,
            vendor_id: 3,
            product_id: 0,
            hw_revision: 0,
            sw_revision: 122,
            link_speed: 10_000_000,
        };
        let base = PixelPusherBase::new(1, 2, true);
        let ext = PixelPusherExt {
            segments: 1,
            ..Default::default()
        };
        Beacon::new(header, base, ext, Arc::new(AtomicBool::new(false)))
    }

    #[test]
    fn first_update_reports_gap_equal_to_sequence_number() {
        let beacon = make_beacon();
        beacon.update_stats(1, 100);
        let telemetry = beacon.telemetry.lock().unwrap();
        assert_eq!(telemetry.base.delta_sequence, 1);
        assert_eq!(telemetry.previous_sequence, 1);
    }

    #[test]
    fn gap_accumulates_across_calls_scenario_from_spec() {
        // Mirrors spec.md §8 scenario 2: seq 1, then seq 5.
        let beacon = make_beacon();
        beacon.update_stats(1, 100);
        beacon.update_stats(5, 100);
        let telemetry = beacon.telemetry.lock().unwrap();
        // gap(1) = 1 - (-1) - 1 = 1; gap(5) = 5 - 1 - 1 = 3; total = 4.
        assert_eq!(telemetry.base.delta_sequence, 4);
    }

    #[test]
    fn update_period_floors_at_minimum() {
        let beacon = make_beacon();
        beacon.update_stats(0, 10);
        let telemetry = beacon.telemetry.lock().unwrap();
        assert_eq!(telemetry.base.update_period_us, MIN_UPDATE_PERIOD_US);
    }

    #[test]
    fn update_period_passes_through_when_above_minimum() {
        let beacon = make_beacon();
        beacon.update_stats(0, 5000);
        let telemetry = beacon.telemetry.lock().unwrap();
        assert_eq!(telemetry.base.update_period_us, 5000);
    }

    #[test]
    fn duplicate_or_out_of_order_sequence_does_not_contribute_a_negative_gap() {
        let beacon = make_beacon();
        beacon.update_stats(10, 100);
        beacon.update_stats(3, 100); // out of order: gap would be negative
        let telemetry = beacon.telemetry.lock().unwrap();
        assert_eq!(telemetry.base.delta_sequence, 10); // unchanged by the second call
        assert_eq!(telemetry.previous_sequence, 3);
    }
}

//! Process-wide server façade (spec.md §4.E, §5): `start` spawns the
//! beacon and receiver threads and hands back control immediately;
//! `shutdown` cooperatively stops and joins them. Only one server may run
//! per process, tracked in a single `OnceLock`-guarded slot.

use std::net::Ipv4Addr;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::info;

use crate::beacon::Beacon;
use crate::device::OutputDevice;
use crate::error::StartError;
use crate::nic;
use crate::receiver::Receiver;
use crate::wire::{
    DiscoveryHeader, PixelPusherBase, PixelPusherExt, DEVICE_TYPE_PIXELPUSHER, DISCOVERY_PORT,
    LINK_SPEED_BPS, LISTEN_PORT, SOFTWARE_REVISION,
};

/// Smallest packet `PPOptions::udp_packet_size` may be set to.
pub const MIN_UDP_PACKET_SIZE: u32 = 200;
/// Largest packet `PPOptions::udp_packet_size` may be set to: the maximum
/// possible UDP payload.
pub const MAX_UDP_PACKET_SIZE: u32 = 65_507;

/// How many times `start` retries a NIC probe before giving up, and the
/// delay between retries. Covers the common boot-order race where the
/// network interface isn't configured yet when the server starts
/// (spec.md §11.4).
const NETWORK_PROBE_RETRIES: u32 = 60;
const NETWORK_PROBE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Configuration for a PixelPusher server, mirroring the original's
/// constructor defaults (spec.md §11.3).
#[derive(Debug, Clone)]
pub struct PPOptions {
    /// Network interface to advertise and probe for an address, e.g. `"eth0"`.
    pub network_interface: String,
    /// Target UDP packet size; strip rows are packed to fit under this.
    pub udp_packet_size: u32,
    /// Whether this device's LEDs respond logarithmically, reported to
    /// clients via `strip_flags`.
    pub is_logarithmic: bool,
    /// Group membership ordinal reported in the base record.
    pub group: i32,
    /// Controller ordinal reported in the base record.
    pub controller: i32,
    /// Art-Net universe, or -1 if this device is not Art-Net addressed.
    pub artnet_universe: i32,
    /// Art-Net channel, or -1 if this device is not Art-Net addressed.
    pub artnet_channel: i32,
}

impl Default for PPOptions {
    fn default() -> Self {
        PPOptions {
            network_interface: "eth0".to_string(),
            udp_packet_size: 1460,
            is_logarithmic: true,
            group: 0,
            controller: 0,
            artnet_universe: -1,
            artnet_channel: -1,
        }
    }
}

struct RunningServer {
    stop: Arc<AtomicBool>,
    beacon_thread: Option<JoinHandle<()>>,
    receiver_thread: Option<JoinHandle<()>>,
}

static SERVER: OnceLock<Mutex<Option<RunningServer>>> = OnceLock::new();

fn server_slot() -> &'static Mutex<Option<RunningServer>> {
    SERVER.get_or_init(|| Mutex::new(None))
}

fn probe_with_retry(interface: &str) -> Result<(hwaddr::HwAddr, Ipv4Addr), StartError> {
    let mut last_err = None;
    for attempt in 0..NETWORK_PROBE_RETRIES {
        match nic::probe(interface) {
            Ok(found) => return Ok(found),
            Err(e) => {
                if attempt == 0 {
                    info!("server: waiting for interface {interface:?} to come up: {e}");
                }
                last_err = Some(e);
                thread::sleep(NETWORK_PROBE_RETRY_DELAY);
            }
        }
    }
    Err(StartError::NetworkUnavailable {
        interface: interface.to_string(),
        retries: NETWORK_PROBE_RETRIES,
        source: last_err.expect("loop ran at least once"),
    })
}

/// Starts broadcasting discovery beacons and receiving pixel pushes for
/// `device`. Only one server may run per process; a second call returns
/// `StartError::AlreadyRunning` until `shutdown` is called.
pub fn start(options: PPOptions, device: Box<dyn OutputDevice + Send>) -> Result<(), StartError> {
    if !(MIN_UDP_PACKET_SIZE..=MAX_UDP_PACKET_SIZE).contains(&options.udp_packet_size) {
        return Err(StartError::PacketSizeOutOfRange {
            size: options.udp_packet_size,
        });
    }

    if server_slot().lock().unwrap().is_some() {
        return Err(StartError::AlreadyRunning);
    }

    let num_strips = device.num_strips();
    let pixels_per_strip = device.num_pixel_per_strip();

    let strip_row_bytes = crate::wire::strip_record_len(pixels_per_strip);
    let usable = options.udp_packet_size as usize - 4; // sequence number
    if strip_row_bytes > usable {
        return Err(StartError::RowTooLarge {
            need: strip_row_bytes,
            usable,
        });
    }
    let max_strips_per_packet = (usable / strip_row_bytes)
        .min(num_strips)
        .min(u8::MAX as usize) as u8;

    let (mac_address, ip_address) = probe_with_retry(&options.network_interface)?;

    let header = DiscoveryHeader {
        mac_address,
        ip_address,
        device_type: DEVICE_TYPE_PIXELPUSHER,
        protocol_version: 1,
        vendor_id: 3, // Heroic Robotics
        product_id: 0,
        hw_revision: 0,
        sw_revision: SOFTWARE_REVISION,
        link_speed: LINK_SPEED_BPS,
    };

    let strips_attached = num_strips.min(u8::MAX as usize) as u8;
    let mut base = PixelPusherBase::new(
        strips_attached,
        pixels_per_strip.min(u16::MAX as usize) as u16,
        options.is_logarithmic,
    );
    base.max_strips_per_packet = max_strips_per_packet;
    base.controller_ordinal = options.controller;
    base.group_ordinal = options.group;
    if options.artnet_universe >= 0 && options.artnet_channel >= 0 {
        base.artnet_universe = options.artnet_universe as u16;
        base.artnet_channel = options.artnet_channel as u16;
    }
    base.my_port = LISTEN_PORT;

    let ext = PixelPusherExt {
        segments: 1,
        ..Default::default()
    };

    let stop = Arc::new(AtomicBool::new(false));
    let beacon = Beacon::new(header, base, ext, Arc::clone(&stop));

    let listen_addr = format!("0.0.0.0:{LISTEN_PORT}");
    let receiver = Receiver::bind(&listen_addr, device, Arc::clone(&beacon), Arc::clone(&stop))?;

    let mut guard = server_slot().lock().unwrap();
    if guard.is_some() {
        return Err(StartError::AlreadyRunning);
    }

    let receiver_thread = thread::Builder::new()
        .name("pixelpusher-receiver".to_string())
        .spawn(move || {
            crate::affinity::pin_and_prioritize(1, None);
            receiver.run();
        })?;

    let beacon_for_thread = Arc::clone(&beacon);
    let beacon_thread = thread::Builder::new()
        .name("pixelpusher-beacon".to_string())
        .spawn(move || {
            crate::affinity::pin_and_prioritize(2, Some(5));
            beacon_for_thread.run();
        })?;

    info!(
        "server: started on interface {:?}, {} strips x {} pixels, discovery port {}, listen port {}",
        options.network_interface, num_strips, pixels_per_strip, DISCOVERY_PORT, LISTEN_PORT
    );

    *guard = Some(RunningServer {
        stop,
        beacon_thread: Some(beacon_thread),
        receiver_thread: Some(receiver_thread),
    });

    Ok(())
}

/// Stops a running server and joins its threads. No-op if no server is
/// running. Blocks for up to roughly one second (the beacon's broadcast
/// interval) plus the receiver's 200ms shutdown poll.
pub fn shutdown() {
    let running = server_slot().lock().unwrap().take();
    if let Some(mut running) = running {
        running.stop.store(true, std::sync::atomic::Ordering::Relaxed);
        if let Some(handle) = running.receiver_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = running.beacon_thread.take() {
            let _ = handle.join();
        }
        info!("server: stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_match_original_constructor_defaults() {
        let options = PPOptions::default();
        assert_eq!(options.network_interface, "eth0");
        assert_eq!(options.udp_packet_size, 1460);
        assert!(options.is_logarithmic);
        assert_eq!(options.artnet_universe, -1);
        assert_eq!(options.artnet_channel, -1);
    }

    #[test]
    fn packet_size_bounds_are_enforced() {
        assert_eq!(MIN_UDP_PACKET_SIZE, 200);
        assert_eq!(MAX_UDP_PACKET_SIZE, 65_507);
    }
}

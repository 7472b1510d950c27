//! Pixel-ingest receiver (spec.md §4.D): binds the pixel-push port, and for
//! each datagram classifies it, decodes it, drives the output device under
//! the `StartFrame`/`SetPixel`/`FlushFrame` protocol, and reports stats to
//! the beacon.

use std::io::ErrorKind;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(test)]
use std::sync::Mutex;

use log::{info, trace, warn};

use crate::beacon::Beacon;
use crate::device::OutputDevice;
use crate::wire::{self, PixelColor, COMMAND_MAGIC};

/// Bound on `recvfrom`'s blocking wait before the stop flag is re-checked.
/// `recvfrom` itself is not interruptible, so this is also the crate's
/// documented maximum shutdown latency for the receiver thread (spec.md
/// §9, "Cooperative stop without interruptible I/O").
pub const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Binds the listen socket and drives pixel datagrams into an
/// `OutputDevice`, reporting timing/sequence stats to a `Beacon`.
pub struct Receiver {
    socket: UdpSocket,
    device: Box<dyn OutputDevice + Send>,
    beacon: Arc<Beacon>,
    stop: Arc<AtomicBool>,
    num_strips: usize,
    pixels_per_strip: usize,
}

impl Receiver {
    pub fn bind(
        addr: &str,
        device: Box<dyn OutputDevice + Send>,
        beacon: Arc<Beacon>,
        stop: Arc<AtomicBool>,
    ) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(SHUTDOWN_POLL_INTERVAL))?;
        let num_strips = device.num_strips();
        let pixels_per_strip = device.num_pixel_per_strip();
        Ok(Receiver {
            socket,
            device,
            beacon,
            stop,
            num_strips,
            pixels_per_strip,
        })
    }

    /// Runs the receive loop until `stop` is set. Intended to be the body
    /// of a dedicated thread; does not return until stopped.
    pub fn run(mut self) {
        let mut buf = vec![0u8; 65_507];
        info!(
            "receiver: listening for pixel pushes on {:?}",
            self.socket.local_addr()
        );
        while !self.stop.load(Ordering::Relaxed) {
            match self.socket.recv_from(&mut buf) {
                Ok((len, _src)) => {
                    let start = Instant::now();
                    self.handle_datagram(&buf[..len], start);
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    continue;
                }
                Err(e) => {
                    warn!("receiver: recv failed: {e}");
                    continue;
                }
            }
        }
    }

    fn handle_datagram(&mut self, datagram: &[u8], start: Instant) {
        if datagram.len() < 4 {
            warn!(
                "receiver: datagram too short ({} bytes), no sequence number present",
                datagram.len()
            );
            return;
        }

        let sequence = u32::from_le_bytes(datagram[0..4].try_into().unwrap());
        let rest = &datagram[4..];

        if rest.len() >= COMMAND_MAGIC.len() && rest[..COMMAND_MAGIC.len()] == COMMAND_MAGIC {
            let payload = &rest[COMMAND_MAGIC.len()..];
            trace!("receiver: pusher command, {} byte payload", payload.len());
            self.device.handle_pusher_command(payload);
            return;
        }

        let strip_len = wire::strip_record_len(self.pixels_per_strip);
        if rest.len() % strip_len != 0 {
            warn!(
                "receiver: expecting a multiple of {strip_len} bytes (1 + 3*{}), got {} (remainder {})",
                self.pixels_per_strip,
                rest.len(),
                rest.len() % strip_len
            );
            return;
        }

        let received_strips = rest.len() / strip_len;
        let full_update = received_strips == self.num_strips;

        self.device.start_frame(full_update);
        for record in rest.chunks_exact(strip_len) {
            let strip_index = record[0] as i32;
            for (pixel_index, rgb) in record[1..].chunks_exact(3).enumerate() {
                self.device.set_pixel(
                    strip_index,
                    pixel_index as i32,
                    PixelColor {
                        red: rgb[0],
                        green: rgb[1],
                        blue: rgb[2],
                    },
                );
            }
        }
        self.device.flush_frame();

        let elapsed_us = start.elapsed().as_micros().min(u32::MAX as u128) as u32;
        self.beacon.update_stats(sequence, elapsed_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beacon::Beacon;
    use crate::wire::{DiscoveryHeader, PixelPusherBase, PixelPusherExt, DEVICE_TYPE_PIXELPUSHER};
    use hwaddr::HwAddr;
    use std::net::Ipv4Addr;

    struct RecordingDevice {
        strips: usize,
        pixels_per_strip: usize,
        events: Arc<Mutex<Vec<String>>>,
    }

    impl OutputDevice for RecordingDevice {
        fn num_strips(&self) -> usize {
            self.strips
        }

        fn num_pixel_per_strip(&self) -> usize {
            self.pixels_per_strip
        }

        fn start_frame(&mut self, full_update: bool) {
            self.events.lock().unwrap().push(format!("start({full_update})"));
        }

        fn set_pixel(&mut self, strip: i32, pixel: i32, color: PixelColor) {
            self.events.lock().unwrap().push(format!(
                "pixel({strip},{pixel},{},{},{})",
                color.red, color.green, color.blue
            ));
        }

        fn flush_frame(&mut self) {
            self.events.lock().unwrap().push("flush".to_string());
        }

        fn handle_pusher_command(&mut self, payload: &[u8]) {
            self.events
                .lock()
                .unwrap()
                .push(format!("command({})", payload.len()));
        }
    }

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

    fn make_receiver(
        strips: usize,
        pixels_per_strip: usize,
    ) -> (Receiver, Arc<Beacon>, Arc<Mutex<Vec<String>>>) {
        let beacon = make_beacon();
        let events = Arc::new(Mutex::new(Vec::new()));
        let device = Box::new(RecordingDevice {
            strips,
            pixels_per_strip,
            events: Arc::clone(&events),
        });
        let receiver = Receiver {
            socket: UdpSocket::bind("127.0.0.1:0").unwrap(),
            device,
            beacon: Arc::clone(&beacon),
            stop: Arc::new(AtomicBool::new(false)),
            num_strips: strips,
            pixels_per_strip,
        };
        (receiver, beacon, events)
    }

    #[test]
    fn clean_single_strip_frame_scenario_1() {
        let (mut receiver, beacon, events) = make_receiver(1, 2);
        // seq 1, strip 0, red then green.
        let datagram = [
            0x01, 0x00, 0x00, 0x00, // sequence = 1
            0x00, // strip index 0
            0xFF, 0x00, 0x00, // red
            0x00, 0xFF, 0x00, // green
        ];
        receiver.handle_datagram(&datagram, Instant::now());

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "start(true)",
                "pixel(0,0,255,0,0)",
                "pixel(0,1,0,255,0)",
                "flush",
            ]
        );

        let telemetry = beacon.telemetry.lock().unwrap();
        assert_eq!(telemetry.base.delta_sequence, 1);
    }

    #[test]
    fn gap_detection_scenario_2() {
        let (mut receiver, beacon, _events) = make_receiver(1, 2);
        let frame = |seq: u32| {
            let mut d = seq.to_le_bytes().to_vec();
            d.extend_from_slice(&[0x00, 0xFF, 0x00, 0x00, 0x00, 0xFF, 0x00]);
            d
        };
        receiver.handle_datagram(&frame(1), Instant::now());
        receiver.handle_datagram(&frame(5), Instant::now());
        let telemetry = beacon.telemetry.lock().unwrap();
        assert_eq!(telemetry.base.delta_sequence, 4);
    }

    #[test]
    fn misaligned_payload_scenario_3() {
        let (mut receiver, beacon, events) = make_receiver(1, 2);
        // strip_data_len = 1 + 3*2 = 7; 10 trailing bytes after sequence
        // does not divide evenly.
        let mut datagram = vec![0x00, 0x00, 0x00, 0x00];
        datagram.extend_from_slice(&[0u8; 10]);
        receiver.handle_datagram(&datagram, Instant::now());

        assert!(events.lock().unwrap().is_empty());
        let telemetry = beacon.telemetry.lock().unwrap();
        assert_eq!(telemetry.previous_sequence, -1); // no stats update posted
    }

    #[test]
    fn command_pass_through_scenario_4() {
        let (mut receiver, beacon, events) = make_receiver(1, 2);
        let mut datagram = vec![0x00, 0x00, 0x00, 0x00];
        datagram.extend_from_slice(&COMMAND_MAGIC);
        datagram.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        receiver.handle_datagram(&datagram, Instant::now());

        assert_eq!(*events.lock().unwrap(), vec!["command(4)"]);
        let telemetry = beacon.telemetry.lock().unwrap();
        assert_eq!(telemetry.previous_sequence, -1); // no stats update posted
    }

    #[test]
    fn command_with_empty_payload_scenario_8() {
        let (mut receiver, _beacon, events) = make_receiver(1, 2);
        let mut datagram = vec![0x00, 0x00, 0x00, 0x00];
        datagram.extend_from_slice(&COMMAND_MAGIC);
        receiver.handle_datagram(&datagram, Instant::now());
        assert_eq!(*events.lock().unwrap(), vec!["command(0)"]);
    }

    #[test]
    fn partial_frame_scenario_5() {
        let (mut receiver, _beacon, events) = make_receiver(3, 1);
        let datagram = [
            0x00, 0x00, 0x00, 0x00, // sequence
            0x00, 0x10, 0x20, 0x30, // strip 0
            0x01, 0x11, 0x21, 0x31, // strip 1
        ];
        receiver.handle_datagram(&datagram, Instant::now());

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "start(false)",
                "pixel(0,0,16,32,48)",
                "pixel(1,0,17,33,49)",
                "flush",
            ]
        );
    }

    #[test]
    fn short_datagram_is_dropped() {
        env_logger::try_init().ok();
        let (mut receiver, beacon, events) = make_receiver(1, 2);
        receiver.handle_datagram(&[0x01, 0x02, 0x03], Instant::now());
        assert!(events.lock().unwrap().is_empty());
        let telemetry = beacon.telemetry.lock().unwrap();
        assert_eq!(telemetry.previous_sequence, -1);
    }

    #[test]
    fn strip_index_is_passed_through_unvalidated() {
        // num_strips = 1 but the strip index in the datagram is 9; spec.md
        // §9(c) says this is the device's problem, not the receiver's.
        let (mut receiver, _beacon, events) = make_receiver(1, 1);
        let datagram = [0x00, 0x00, 0x00, 0x00, 0x09, 0xAA, 0xBB, 0xCC];
        receiver.handle_datagram(&datagram, Instant::now());
        assert_eq!(
            *events.lock().unwrap(),
            vec!["start(true)", "pixel(9,0,170,187,204)", "flush"]
        );
    }
}

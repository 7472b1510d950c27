//! Bit-exact, little-endian wire records for the PixelPusher protocol.
//!
//! Every multi-byte field on the wire is little-endian except the IPv4
//! address embedded in the discovery header, which is network byte order
//! (big-endian) — `Ipv4Addr::octets()` already returns bytes in that order,
//! so no explicit swap is needed there. This module assumes a little-endian
//! host, as the original implementation does; a big-endian host would need
//! to byte-swap explicitly rather than rely on in-memory layout, but that
//! case is out of scope (see spec Non-goals).

use std::io::{self, Cursor, Read, Write};
use std::net::Ipv4Addr;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use hwaddr::HwAddr;

/// UDP port PixelPusher discovery beacons are broadcast to.
pub const DISCOVERY_PORT: u16 = 7331;
/// UDP port the receiver binds to for incoming pixel pushes.
pub const LISTEN_PORT: u16 = 5078;
/// Broadcast destination for discovery packets.
pub const DISCOVERY_BROADCAST_ADDR: &str = "255.255.255.255:7331";

/// `device_type` value identifying a PixelPusher in the discovery header.
pub const DEVICE_TYPE_PIXELPUSHER: u8 = 2;
/// Constant software revision this server reports.
pub const SOFTWARE_REVISION: u16 = 122;
/// Constant link speed (bits/sec) this server reports.
pub const LINK_SPEED_BPS: u32 = 10_000_000;

/// `strip_flags` bit for a logarithmic LED response curve.
pub const SFLAG_LOGARITHMIC: u8 = 1 << 2;

/// 60Hz frames delivered in up to 9 packets: `16666 / 9`, truncating like
/// the original's `uint32_t kMinUpdatePeriodUSec = 16666 / 9;`.
pub const MIN_UPDATE_PERIOD_US: u32 = 16_666 / 9;

/// The 16-octet magic that marks a datagram as an in-band pusher command
/// rather than a pixel-strip payload.
pub const COMMAND_MAGIC: [u8; 16] = [
    0x40, 0x09, 0x2D, 0xA6, 0x15, 0xA5, 0xDD, 0xE5, 0x6A, 0x9D, 0x4D, 0x5A, 0xCF, 0x09, 0xAF, 0x50,
];

/// Length in octets of the fixed `DiscoveryHeader`.
pub const DISCOVERY_HEADER_LEN: usize = 24;
/// Length in octets of the `PixelPusherBase` fixed (non-flag) fields.
///
/// The original C struct's non-flag fields (`strips_attached` through the
/// 2 padding octets) sum to 32 bytes; see DESIGN.md for why this differs
/// from spec.md's prose figure of 28.
const BASE_NONFLAG_LEN: usize = 32;
/// Minimum number of `strip_flags` octets always allocated, even for fewer
/// strips, matching the original's `uint8_t strip_flags[8]`.
const BASE_MIN_FLAGS: usize = 8;
/// Length in octets of the fixed `PixelPusherExt`.
pub const EXT_LEN: usize = 20;

/// One RGB LED's color. No alpha channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

/// Number of octets a single datagram strip record occupies: one strip
/// index octet followed by `pixels_per_strip` RGB triples.
pub fn strip_record_len(pixels_per_strip: usize) -> usize {
    1 + 3 * pixels_per_strip
}

/// Total size in octets of a `PixelPusherBase` with `strips_attached`
/// strips: the fixed non-flag fields plus `max(8, strips_attached)` flag
/// bytes.
pub fn base_size(strips_attached: u8) -> usize {
    BASE_NONFLAG_LEN + (strips_attached as usize).max(BASE_MIN_FLAGS)
}

/// The fixed 24-octet Universal Discovery Protocol header.
#[derive(Debug, Clone)]
pub struct DiscoveryHeader {
    pub mac_address: HwAddr,
    pub ip_address: Ipv4Addr,
    pub device_type: u8,
    pub protocol_version: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub hw_revision: u16,
    pub sw_revision: u16,
    pub link_speed: u32,
}

impl DiscoveryHeader {
    pub fn write_to(&self, buf: &mut [u8]) -> io::Result<()> {
        let mut w = Cursor::new(buf);
        w.write_all(&self.mac_address.octets())?;
        w.write_all(&self.ip_address.octets())?;
        w.write_u8(self.device_type)?;
        w.write_u8(self.protocol_version)?;
        w.write_u16::<LittleEndian>(self.vendor_id)?;
        w.write_u16::<LittleEndian>(self.product_id)?;
        w.write_u16::<LittleEndian>(self.hw_revision)?;
        w.write_u16::<LittleEndian>(self.sw_revision)?;
        w.write_u32::<LittleEndian>(self.link_speed)?;
        Ok(())
    }

    pub fn parse(buf: &[u8]) -> io::Result<Self> {
        let mut r = Cursor::new(buf);
        let mut mac = [0u8; 6];
        r.read_exact(&mut mac)?;
        let mut ip = [0u8; 4];
        r.read_exact(&mut ip)?;
        Ok(DiscoveryHeader {
            mac_address: HwAddr::from(&mac[..]),
            ip_address: Ipv4Addr::from(ip),
            device_type: r.read_u8()?,
            protocol_version: r.read_u8()?,
            vendor_id: r.read_u16::<LittleEndian>()?,
            product_id: r.read_u16::<LittleEndian>()?,
            hw_revision: r.read_u16::<LittleEndian>()?,
            sw_revision: r.read_u16::<LittleEndian>()?,
            link_speed: r.read_u32::<LittleEndian>()?,
        })
    }
}

/// The variable-length PixelPusher base record: per-controller telemetry
/// plus a trailing `strip_flags` vector sized `max(8, strips_attached)`.
#[derive(Debug, Clone)]
pub struct PixelPusherBase {
    pub strips_attached: u8,
    pub max_strips_per_packet: u8,
    pub pixels_per_strip: u16,
    pub update_period_us: u32,
    pub power_total: u32,
    pub delta_sequence: u32,
    pub controller_ordinal: i32,
    pub group_ordinal: i32,
    pub artnet_universe: u16,
    pub artnet_channel: u16,
    pub my_port: u16,
    strip_flags: Vec<u8>,
}

impl PixelPusherBase {
    /// Build a base record for a device with `strips_attached` strips of
    /// `pixels_per_strip` pixels. `strip_flags` is zero-filled for every
    /// index, with `SFLAG_LOGARITHMIC` set for `i < strips_attached` when
    /// `logarithmic` is true (trailing padding entries stay zero, per
    /// spec.md §9 open question (a)).
    pub fn new(strips_attached: u8, pixels_per_strip: u16, logarithmic: bool) -> Self {
        let flag_len = (strips_attached as usize).max(BASE_MIN_FLAGS);
        let mut strip_flags = vec![0u8; flag_len];
        if logarithmic {
            for flag in strip_flags.iter_mut().take(strips_attached as usize) {
                *flag = SFLAG_LOGARITHMIC;
            }
        }
        PixelPusherBase {
            strips_attached,
            max_strips_per_packet: 0,
            pixels_per_strip,
            update_period_us: 1000,
            power_total: 1,
            delta_sequence: 0,
            controller_ordinal: 0,
            group_ordinal: 0,
            artnet_universe: 0,
            artnet_channel: 0,
            my_port: 0,
            strip_flags,
        }
    }

    pub fn strip_flags(&self) -> &[u8] {
        &self.strip_flags
    }

    /// Size in octets this record serializes to.
    pub fn size(&self) -> usize {
        base_size(self.strips_attached)
    }

    pub fn write_to(&self, buf: &mut [u8]) -> io::Result<()> {
        let mut w = Cursor::new(buf);
        w.write_u8(self.strips_attached)?;
        w.write_u8(self.max_strips_per_packet)?;
        w.write_u16::<LittleEndian>(self.pixels_per_strip)?;
        w.write_u32::<LittleEndian>(self.update_period_us)?;
        w.write_u32::<LittleEndian>(self.power_total)?;
        w.write_u32::<LittleEndian>(self.delta_sequence)?;
        w.write_i32::<LittleEndian>(self.controller_ordinal)?;
        w.write_i32::<LittleEndian>(self.group_ordinal)?;
        w.write_u16::<LittleEndian>(self.artnet_universe)?;
        w.write_u16::<LittleEndian>(self.artnet_channel)?;
        w.write_u16::<LittleEndian>(self.my_port)?;
        w.write_u16::<LittleEndian>(0)?; // padding1_
        w.write_all(&self.strip_flags)?;
        Ok(())
    }

    pub fn parse(buf: &[u8]) -> io::Result<Self> {
        if buf.len() < BASE_NONFLAG_LEN + BASE_MIN_FLAGS {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "buffer shorter than a minimal PixelPusherBase",
            ));
        }
        let mut r = Cursor::new(buf);
        let strips_attached = r.read_u8()?;
        let max_strips_per_packet = r.read_u8()?;
        let pixels_per_strip = r.read_u16::<LittleEndian>()?;
        let update_period_us = r.read_u32::<LittleEndian>()?;
        let power_total = r.read_u32::<LittleEndian>()?;
        let delta_sequence = r.read_u32::<LittleEndian>()?;
        let controller_ordinal = r.read_i32::<LittleEndian>()?;
        let group_ordinal = r.read_i32::<LittleEndian>()?;
        let artnet_universe = r.read_u16::<LittleEndian>()?;
        let artnet_channel = r.read_u16::<LittleEndian>()?;
        let my_port = r.read_u16::<LittleEndian>()?;
        let _padding1 = r.read_u16::<LittleEndian>()?;
        let flag_len = (strips_attached as usize).max(BASE_MIN_FLAGS);
        let mut strip_flags = vec![0u8; flag_len];
        r.read_exact(&mut strip_flags)?;
        Ok(PixelPusherBase {
            strips_attached,
            max_strips_per_packet,
            pixels_per_strip,
            update_period_us,
            power_total,
            delta_sequence,
            controller_ordinal,
            group_ordinal,
            artnet_universe,
            artnet_channel,
            my_port,
            strip_flags,
        })
    }
}

/// The fixed 20-octet PixelPusher extension record, emitted immediately
/// after the variable-length base.
#[derive(Debug, Clone, Copy, Default)]
pub struct PixelPusherExt {
    pub pusher_flags: u32,
    pub segments: u32,
    pub power_domain: u32,
    pub last_driven_ip: [u8; 4],
    pub last_driven_port: u16,
}

impl PixelPusherExt {
    pub fn write_to(&self, buf: &mut [u8]) -> io::Result<()> {
        let mut w = Cursor::new(buf);
        w.write_u16::<LittleEndian>(0)?; // padding2_
        w.write_u32::<LittleEndian>(self.pusher_flags)?;
        w.write_u32::<LittleEndian>(self.segments)?;
        w.write_u32::<LittleEndian>(self.power_domain)?;
        w.write_all(&self.last_driven_ip)?;
        w.write_u16::<LittleEndian>(self.last_driven_port)?;
        Ok(())
    }

    pub fn parse(buf: &[u8]) -> io::Result<Self> {
        let mut r = Cursor::new(buf);
        let _padding2 = r.read_u16::<LittleEndian>()?;
        let pusher_flags = r.read_u32::<LittleEndian>()?;
        let segments = r.read_u32::<LittleEndian>()?;
        let power_domain = r.read_u32::<LittleEndian>()?;
        let mut last_driven_ip = [0u8; 4];
        r.read_exact(&mut last_driven_ip)?;
        let last_driven_port = r.read_u16::<LittleEndian>()?;
        Ok(PixelPusherExt {
            pusher_flags,
            segments,
            power_domain,
            last_driven_ip,
            last_driven_port,
        })
    }
}

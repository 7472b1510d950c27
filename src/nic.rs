//! NIC probe (spec.md §4.B): given an interface name, return its hardware
//! and IPv4 address. One-shot; the caller (the server façade) is
//! responsible for retrying across init-script races where the interface
//! isn't up yet.

use std::net::{IpAddr, Ipv4Addr};

use hwaddr::HwAddr;

use crate::error::NicError;

/// Looks up the MAC and IPv4 address of `interface_name` (e.g. `"eth0"`).
pub fn probe(interface_name: &str) -> Result<(HwAddr, Ipv4Addr), NicError> {
    let iface = pnet_datalink::interfaces()
        .into_iter()
        .find(|iface| iface.name == interface_name)
        .ok_or_else(|| NicError::InterfaceNotFound(interface_name.to_owned()))?;

    let mac = iface
        .mac
        .ok_or_else(|| NicError::AddressUnavailable(interface_name.to_owned()))?;

    let ipv4 = iface
        .ips
        .iter()
        .find_map(|network| match network.ip() {
            IpAddr::V4(addr) => Some(addr),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| NicError::AddressUnavailable(interface_name.to_owned()))?;

    Ok((HwAddr::from(&mac.octets()[..]), ipv4))
}

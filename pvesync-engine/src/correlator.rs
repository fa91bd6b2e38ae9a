//! Correlation of declared NICs with the guest agent's network report.

use pvesync_hypervisor::{GuestInterface, GuestIpAddress};
use std::net::IpAddr;
use tracing::debug;

use crate::decoder::normalize_mac;
use crate::error::DecodeError;
use crate::model::{IpAddress, IpFamily, NetworkInterface};

/// Enriches declared NICs with guest-side names and addresses.
pub struct NetworkCorrelator;

impl NetworkCorrelator {
    /// Enrich `nics` in place from `report`.
    ///
    /// Matching runs in two passes. First each NIC's MAC is matched against
    /// the report's hardware addresses (case-insensitive, first match wins)
    /// to find the guest interface name. Then the addresses are taken from
    /// the first report entry carrying exactly that name.
    ///
    /// NICs without a match keep `guest_name = None` and no addresses.
    /// Addresses that cannot be parsed are skipped and returned as errors.
    pub fn correlate(nics: &mut [NetworkInterface], report: &[GuestInterface]) -> Vec<DecodeError> {
        for nic in nics.iter_mut() {
            nic.guest_name = report
                .iter()
                .find(|entry| {
                    entry
                        .hardware_address
                        .as_deref()
                        .and_then(normalize_mac)
                        .is_some_and(|mac| mac == nic.mac)
                })
                .map(|entry| entry.name.clone());
        }
        
        let mut errors = Vec::new();
        for nic in nics.iter_mut() {
            let Some(name) = nic.guest_name.as_deref() else {
                debug!(slot = %nic.slot_key, mac = %nic.mac, "No guest interface for NIC");
                continue;
            };
            let Some(entry) = report.iter().find(|entry| entry.name == name) else {
                continue;
            };
            
            let mut addresses = Vec::new();
            for ip in &entry.ip_addresses {
                match convert_address(name, ip) {
                    Ok(Some(address)) => addresses.push(address),
                    Ok(None) => {}
                    Err(e) => errors.push(e),
                }
            }
            nic.ip_addresses = addresses;
        }
        
        errors
    }
}

/// Convert one reported address; link-local addresses yield `None`.
fn convert_address(interface: &str, ip: &GuestIpAddress) -> Result<Option<IpAddress>, DecodeError> {
    let invalid = || DecodeError::InvalidIp {
        interface: interface.to_string(),
        family: ip.ip_address_type.clone(),
        address: ip.ip_address.clone(),
        prefix: ip.prefix,
    };
    
    let parsed: IpAddr = ip.ip_address.trim().parse().map_err(|_| invalid())?;
    let family = match (ip.ip_address_type.as_str(), parsed) {
        ("ipv4", IpAddr::V4(_)) if ip.prefix <= 32 => IpFamily::Ipv4,
        ("ipv6", IpAddr::V6(_)) if ip.prefix <= 128 => IpFamily::Ipv6,
        _ => return Err(invalid()),
    };
    
    if is_link_local(&parsed) {
        debug!(interface = %interface, address = %parsed, "Skipping link-local address");
        return Ok(None);
    }
    
    Ok(Some(IpAddress::new(family, format!("{}/{}", parsed, ip.prefix))))
}

fn is_link_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_link_local(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}

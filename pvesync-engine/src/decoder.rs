//! Decoding of the flat VM configuration map.
//!
//! Proxmox encodes devices as `<slot>: <token>[,<option>=<value>...]`:
//!
//! ```text
//! scsi0: local-lvm:vm-100-disk-0,cache=writeback,size=32G
//! net0:  virtio=BC:24:11:2A:3B:4C,bridge=vmbr0,firewall=1
//! ```
//!
//! The slot key prefix selects the device class. Controller settings share
//! those prefixes (`scsihw`), so a key only names a slot when the prefix is
//! followed by a decimal index.

use pvesync_hypervisor::VmConfig;

use crate::error::DecodeError;
use crate::model::{Disk, NetworkInterface};

/// Storage slot prefixes.
const DISK_PREFIXES: [&str; 4] = ["ide", "scsi", "sata", "virtio"];

/// NIC slot prefix.
const NIC_PREFIX: &str = "net";

/// Defaults Proxmox applies when a key is omitted.
const DEFAULT_MEMORY_MB: u64 = 512;
const DEFAULT_SOCKETS: u32 = 1;
const DEFAULT_CORES: u32 = 1;

/// Class of a configuration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Disk,
    Nic,
}

/// Classify a configuration key, `None` for non-device keys.
pub fn slot_kind(key: &str) -> Option<SlotKind> {
    let indexed = |prefix: &str| {
        key.strip_prefix(prefix)
            .map(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
            .unwrap_or(false)
    };
    
    if DISK_PREFIXES.iter().any(|p| indexed(p)) {
        Some(SlotKind::Disk)
    } else if indexed(NIC_PREFIX) {
        Some(SlotKind::Nic)
    } else {
        None
    }
}

/// CPU and memory sizing of a VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmSizing {
    pub sockets: u32,
    pub cores: u32,
    /// sockets × cores
    pub vcpus: u32,
    pub memory_mb: u64,
}

/// Result of decoding the device slots of one VM.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedDevices {
    /// Disks, in configuration order
    pub disks: Vec<Disk>,
    /// Declared NICs, in configuration order and not yet enriched
    pub nics: Vec<NetworkInterface>,
    /// One entry per slot that could not be decoded
    pub errors: Vec<DecodeError>,
}

/// Turns a raw [`VmConfig`] into structured records.
pub struct ConfigDecoder;

impl ConfigDecoder {
    /// Decode sockets, cores and memory.
    pub fn decode_sizing(config: &VmConfig) -> Result<VmSizing, DecodeError> {
        let sockets = positive_or(config, "sockets", DEFAULT_SOCKETS as u64)?;
        let cores = positive_or(config, "cores", DEFAULT_CORES as u64)?;
        let memory_mb = positive_or(config, "memory", DEFAULT_MEMORY_MB)?;
        
        let to_u32 = |key: &str, v: u64| {
            u32::try_from(v).map_err(|_| DecodeError::InvalidNumber {
                key: key.to_string(),
                value: v.to_string(),
            })
        };
        
        let sockets = to_u32("sockets", sockets)?;
        let cores = to_u32("cores", cores)?;
        let vcpus = sockets.checked_mul(cores).ok_or_else(|| DecodeError::InvalidNumber {
            key: "sockets*cores".to_string(),
            value: format!("{}*{}", sockets, cores),
        })?;
        
        Ok(VmSizing {
            sockets,
            cores,
            vcpus,
            memory_mb,
        })
    }
    
    /// Decode every disk and NIC slot.
    ///
    /// A malformed slot is reported in [`DecodedDevices::errors`] and skipped;
    /// it never prevents its siblings from being decoded.
    pub fn decode_devices(config: &VmConfig) -> DecodedDevices {
        let mut decoded = DecodedDevices::default();
        
        for (key, value) in config.iter() {
            match slot_kind(key) {
                Some(SlotKind::Disk) => match Self::decode_disk(key, value) {
                    Ok(Some(disk)) => decoded.disks.push(disk),
                    Ok(None) => {}
                    Err(e) => decoded.errors.push(e),
                },
                Some(SlotKind::Nic) => match Self::decode_nic(key, value) {
                    Ok(nic) => decoded.nics.push(nic),
                    Err(e) => decoded.errors.push(e),
                },
                None => {}
            }
        }
        
        decoded
    }
    
    /// Decode one storage slot. CD-ROM drives are not disks and yield `None`.
    pub fn decode_disk(key: &str, value: &str) -> Result<Option<Disk>, DecodeError> {
        let mut size = None;
        for option in value.split(',').skip(1) {
            match option.split_once('=') {
                Some(("media", "cdrom")) => return Ok(None),
                Some(("size", s)) => size = Some(s),
                _ => {}
            }
        }
        
        let size = size.ok_or_else(|| DecodeError::MissingSize {
            key: key.to_string(),
            value: value.to_string(),
        })?;
        
        let size_mb = parse_size_mb(size).ok_or_else(|| DecodeError::InvalidSize {
            key: key.to_string(),
            size: size.to_string(),
        })?;
        
        Ok(Some(Disk::new(key, size_mb)))
    }
    
    /// Decode one NIC slot.
    ///
    /// The leading token is `<model>=<MAC>`; an explicit `macaddr=` option
    /// takes precedence. Remaining options (bridge, tag, firewall, ...) are
    /// ignored.
    pub fn decode_nic(key: &str, value: &str) -> Result<NetworkInterface, DecodeError> {
        let mut model = None;
        let mut mac = None;
        let mut explicit_mac = None;
        
        for (index, part) in value.split(',').enumerate() {
            match (index, part.split_once('=')) {
                (_, Some(("macaddr", m))) => explicit_mac = Some(m),
                (_, Some(("model", m))) => model = Some(m),
                (0, Some((m, addr))) => {
                    model = Some(m);
                    mac = Some(addr);
                }
                (0, None) => model = Some(part),
                _ => {}
            }
        }
        
        let raw_mac = explicit_mac.or(mac).ok_or_else(|| DecodeError::MissingMac {
            key: key.to_string(),
            value: value.to_string(),
        })?;
        
        let mac = normalize_mac(raw_mac).ok_or_else(|| DecodeError::InvalidMac {
            key: key.to_string(),
            mac: raw_mac.to_string(),
        })?;
        
        Ok(NetworkInterface::new(key, model.unwrap_or_default(), mac))
    }
}

/// Parse `<integer>[K|M|G|T]` into megabytes. A bare number is gigabytes;
/// kilobytes round up to the next whole megabyte.
pub fn parse_size_mb(size: &str) -> Option<u64> {
    let size = size.trim();
    let split = size
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(size.len());
    let (digits, unit) = size.split_at(split);
    
    if digits.is_empty() {
        return None;
    }
    let value: u64 = digits.parse().ok()?;
    
    match unit.to_ascii_uppercase().as_str() {
        "K" => Some(value.div_ceil(1024)),
        "M" => Some(value),
        "G" | "" => value.checked_mul(1024),
        "T" => value.checked_mul(1024 * 1024),
        _ => None,
    }
}

/// Normalize a MAC address to lower-case, colon-delimited form.
pub fn normalize_mac(mac: &str) -> Option<String> {
    let mac = mac.trim();
    let octets: Vec<&str> = mac.split(|c| c == ':' || c == '-').collect();
    
    if octets.len() != 6
        || !octets
            .iter()
            .all(|o| o.len() == 2 && o.bytes().all(|b| b.is_ascii_hexdigit()))
    {
        return None;
    }
    
    Some(octets.join(":").to_ascii_lowercase())
}

fn positive_or(config: &VmConfig, key: &str, default: u64) -> Result<u64, DecodeError> {
    let Some(raw) = config.get(key) else {
        return Ok(default);
    };
    
    match raw.trim().parse::<u64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(DecodeError::InvalidNumber {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}

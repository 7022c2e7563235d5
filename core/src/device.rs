use crate::FlashError;
use serde::{Deserialize, Serialize};
use std::fmt;

const BYTES_PER_GB: f64 = 1_073_741_824.0;

/// OS drive-type classification of a mounted volume root.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DriveType {
    Unknown,
    NoRootDir,
    Removable,
    Fixed,
    Remote,
    CdRom,
    RamDisk,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeInfo {
    pub label: String,
    pub filesystem: String,
}

/// Cluster geometry as reported by the OS for one volume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskGeometry {
    pub sectors_per_cluster: u64,
    pub bytes_per_sector: u64,
    pub free_clusters: u64,
    pub total_clusters: u64,
}

impl DiskGeometry {
    pub fn total_bytes(&self) -> u64 {
        (self.total_clusters as u128)
            .checked_mul(self.sectors_per_cluster as u128)
            .and_then(|b| b.checked_mul(self.bytes_per_sector as u128))
            .and_then(|b| u64::try_from(b).ok())
            .unwrap_or(u64::MAX)
    }
}

/// Snapshot of one removable volume taken at enumeration time.
///
/// Nothing keeps this in sync with the OS. A volume pulled after enumeration
/// shows up as a failed format, not as a stale descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceDescriptor {
    pub identifier: String,
    pub label: String,
    pub filesystem: String,
    /// Total size in gigabytes (1024^3 bytes), rounded to two decimals.
    pub capacity: f64,
    pub capacity_bytes: u64,
}

impl DeviceDescriptor {
    pub fn new(identifier: String, label: String, filesystem: String, capacity_bytes: u64) -> Self {
        Self {
            identifier,
            label,
            filesystem,
            capacity: capacity_gb(capacity_bytes),
            capacity_bytes,
        }
    }

    pub fn capacity_display(&self) -> String {
        format!("{:.2} GB", self.capacity)
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Drive: {}, Label: {}, Filesystem: {}, Capacity: {}",
            self.identifier,
            self.label,
            self.filesystem,
            self.capacity_display()
        )
    }
}

pub fn capacity_gb(bytes: u64) -> f64 {
    let gb = bytes as f64 / BYTES_PER_GB;
    (gb * 100.0).round() / 100.0
}

/// Brings a volume identifier into drive-root form.
///
/// `e`, `E`, `E:`, `E:\` and `E:/` all become `E:`. Absolute device paths such
/// as `/dev/sdb1` are returned unchanged. Applying it twice is a no-op.
pub fn normalize_identifier(identifier: &str) -> Result<String, FlashError> {
    let trimmed = identifier.trim();

    if trimmed.len() > 1 && trimmed.starts_with('/') {
        return Ok(trimmed.to_string());
    }

    let mut chars = trimmed.chars();
    match (chars.next(), chars.as_str()) {
        (Some(letter), rest)
            if letter.is_ascii_alphabetic() && matches!(rest, "" | ":" | ":\\" | ":/") =>
        {
            Ok(format!("{}:", letter.to_ascii_uppercase()))
        }
        _ => Err(FlashError::InvalidInput(format!(
            "'{}' is neither a drive letter nor a device path",
            identifier
        ))),
    }
}

/// Drive letter of an identifier, if it names a lettered volume.
pub fn drive_letter(identifier: &str) -> Option<char> {
    let normalized = normalize_identifier(identifier).ok()?;
    let mut chars = normalized.chars();
    match (chars.next(), chars.next(), chars.next()) {
        (Some(letter), Some(':'), None) => Some(letter),
        _ => None,
    }
}

/// The OS queries device enumeration is built from.
pub trait VolumeSource {
    /// All mounted volume roots, in OS order.
    fn volume_roots(&self) -> Result<Vec<String>, FlashError>;
    fn drive_type(&self, root: &str) -> DriveType;
    fn volume_info(&self, root: &str) -> Result<VolumeInfo, FlashError>;
    fn geometry(&self, root: &str) -> Result<DiskGeometry, FlashError>;
}

pub struct DeviceEnumerator<S> {
    source: S,
}

impl<S: VolumeSource> DeviceEnumerator<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Lists removable volumes with readable metadata.
    ///
    /// Never fails: a volume whose metadata cannot be read is logged and
    /// skipped, and a failure to list volumes yields an empty list.
    pub fn enumerate(&self) -> Vec<DeviceDescriptor> {
        let roots = match self.source.volume_roots() {
            Ok(roots) => roots,
            Err(e) => {
                log::error!("Failed to list mounted volumes: {}", e);
                return Vec::new();
            }
        };

        let mut devices = Vec::new();
        for root in roots {
            let drive_type = self.source.drive_type(&root);
            if drive_type != DriveType::Removable {
                log::debug!("Ignoring {} ({:?})", root, drive_type);
                continue;
            }

            match self.describe(&root) {
                Ok(device) => devices.push(device),
                Err(e) => log::warn!("Skipping volume {}: {}", root, e),
            }
        }

        log::info!("Found {} removable volume(s)", devices.len());
        devices
    }

    fn describe(&self, root: &str) -> Result<DeviceDescriptor, FlashError> {
        let info = self.source.volume_info(root)?;
        let geometry = self.source.geometry(root)?;
        let identifier = normalize_identifier(root)?;

        Ok(DeviceDescriptor::new(
            identifier,
            info.label,
            info.filesystem,
            geometry.total_bytes(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_letter_gets_separator() {
        assert_eq!(normalize_identifier("E").unwrap(), "E:");
        assert_eq!(normalize_identifier("e").unwrap(), "E:");
    }

    #[test]
    fn test_root_forms_collapse() {
        for input in ["E:", "E:\\", "E:/", "  E:  "] {
            assert_eq!(normalize_identifier(input).unwrap(), "E:", "input {:?}", input);
        }
    }

    #[test]
    fn test_normalization_is_idempotent() {
        for input in ["E", "f:\\", "/dev/sdb1"] {
            let once = normalize_identifier(input).unwrap();
            let twice = normalize_identifier(&once).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_device_paths_pass_through() {
        assert_eq!(normalize_identifier("/dev/sdb1").unwrap(), "/dev/sdb1");
    }

    #[test]
    fn test_malformed_identifiers_rejected() {
        for input in ["", "  ", "/", "EF", "1:", "E:\\foo", "E;"] {
            assert!(
                matches!(normalize_identifier(input), Err(FlashError::InvalidInput(_))),
                "{:?} should be rejected",
                input
            );
        }
    }

    #[test]
    fn test_drive_letter() {
        assert_eq!(drive_letter("e"), Some('E'));
        assert_eq!(drive_letter("G:\\"), Some('G'));
        assert_eq!(drive_letter("/dev/sdb1"), None);
        assert_eq!(drive_letter(""), None);
    }

    #[test]
    fn test_capacity_rounding() {
        assert_eq!(capacity_gb(8 * 1_073_741_824), 8.0);
        assert_eq!(capacity_gb(0), 0.0);
        assert_eq!(capacity_gb(1_610_612_736), 1.5);
        assert_eq!(capacity_gb(15_502_147_584), 14.44);
    }

    #[test]
    fn test_geometry_total_bytes() {
        let geometry = DiskGeometry {
            sectors_per_cluster: 64,
            bytes_per_sector: 512,
            free_clusters: 10,
            total_clusters: 262_144,
        };
        assert_eq!(geometry.total_bytes(), 8 * 1_073_741_824);
    }

    #[test]
    fn test_geometry_saturates() {
        let geometry = DiskGeometry {
            sectors_per_cluster: u64::MAX,
            bytes_per_sector: u64::MAX,
            free_clusters: 0,
            total_clusters: 2,
        };
        assert_eq!(geometry.total_bytes(), u64::MAX);
    }

    #[test]
    fn test_geometry_saturates_past_u128() {
        let geometry = DiskGeometry {
            sectors_per_cluster: u64::MAX,
            bytes_per_sector: u64::MAX,
            free_clusters: 0,
            total_clusters: u64::MAX,
        };
        assert_eq!(geometry.total_bytes(), u64::MAX);
    }

    #[test]
    fn test_geometry_exact_product() {
        let geometry = DiskGeometry {
            sectors_per_cluster: 8,
            bytes_per_sector: 512,
            free_clusters: 0,
            total_clusters: 3_784_704,
        };
        assert_eq!(geometry.total_bytes(), 3_784_704 * 8 * 512);
    }

    #[test]
    fn test_descriptor_display() {
        let device = DeviceDescriptor::new(
            "E:".to_string(),
            "DATA".to_string(),
            "FAT32".to_string(),
            8 * 1_073_741_824,
        );
        assert_eq!(device.capacity_display(), "8.00 GB");
        assert_eq!(
            device.to_string(),
            "Drive: E:, Label: DATA, Filesystem: FAT32, Capacity: 8.00 GB"
        );
    }
}

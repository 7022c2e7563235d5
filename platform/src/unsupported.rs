use flashfmt_core::{DiskGeometry, DriveType, FlashError, VolumeInfo, VolumeSource};

/// Stand-in for hosts without volume support. Lists nothing.
#[derive(Debug, Default)]
pub struct UnsupportedVolumeSource;

impl VolumeSource for UnsupportedVolumeSource {
    fn volume_roots(&self) -> Result<Vec<String>, FlashError> {
        Err(FlashError::NotSupported(
            "volume enumeration is only available on Windows and Linux".to_string(),
        ))
    }

    fn drive_type(&self, _root: &str) -> DriveType {
        DriveType::Unknown
    }

    fn volume_info(&self, root: &str) -> Result<VolumeInfo, FlashError> {
        Err(FlashError::NotSupported(root.to_string()))
    }

    fn geometry(&self, root: &str) -> Result<DiskGeometry, FlashError> {
        Err(FlashError::NotSupported(root.to_string()))
    }
}

pub fn unmount(identifier: &str) {
    log::warn!("Cannot unmount {}: not supported on this platform", identifier);
}

pub fn release(identifier: &str) -> Result<(), FlashError> {
    Err(FlashError::NotSupported(format!(
        "cannot release {}: unmounting is only available on Windows and Linux",
        identifier
    )))
}

pub fn is_elevated() -> bool {
    false
}

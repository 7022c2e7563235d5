use flashfmt_core::{DeviceDescriptor, DeviceEnumerator};

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
pub mod unsupported;

#[cfg(target_os = "linux")]
pub use linux::{is_elevated, release, unmount, LinuxVolumeSource as PlatformVolumeSource};

#[cfg(target_os = "windows")]
pub use windows::{is_elevated, unmount, WindowsVolumeSource as PlatformVolumeSource};

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
pub use unsupported::{is_elevated, release, unmount, UnsupportedVolumeSource as PlatformVolumeSource};

/// Removable volumes currently attached to this host.
pub fn enumerate() -> Vec<DeviceDescriptor> {
    DeviceEnumerator::new(PlatformVolumeSource::default()).enumerate()
}

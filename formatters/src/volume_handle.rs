// Raw volume access through a device handle

use crate::result_identifier;
use flashfmt_core::{drive_letter, normalize_identifier, FlashError, FormatResult, VolumeFormatter};

/// Takes a volume offline so no filesystem driver writes to it.
pub trait VolumeControl {
    /// On Windows, opens `device_path` (e.g. `\\.\E:`), locks and dismounts
    /// the volume, keeping its drive letter. The handle is closed before this
    /// returns, on every path. Elsewhere `device_path` is a device node, and
    /// every mount point of it is unmounted.
    fn dismount(&self, device_path: &str) -> Result<(), FlashError>;
}

impl<C: VolumeControl + ?Sized> VolumeControl for &C {
    fn dismount(&self, device_path: &str) -> Result<(), FlashError> {
        (**self).dismount(device_path)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemVolumeControl;

#[cfg(target_os = "windows")]
mod win {
    use flashfmt_core::FlashError;
    use std::ffi::OsStr;
    use std::io;
    use std::os::windows::ffi::OsStrExt;
    use std::ptr::null_mut;
    use winapi::shared::minwindef::{DWORD, FALSE};
    use winapi::um::fileapi::{CreateFileW, OPEN_EXISTING};
    use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
    use winapi::um::ioapiset::DeviceIoControl;
    use winapi::um::winioctl::{FSCTL_DISMOUNT_VOLUME, FSCTL_LOCK_VOLUME};
    use winapi::um::winnt::{FILE_SHARE_READ, FILE_SHARE_WRITE, GENERIC_READ, GENERIC_WRITE, HANDLE};

    /// Open volume handle, closed on drop.
    pub struct VolumeHandle {
        handle: HANDLE,
        path: String,
    }

    impl VolumeHandle {
        pub fn open(path: &str) -> Result<Self, FlashError> {
            let wide: Vec<u16> = OsStr::new(path)
                .encode_wide()
                .chain(std::iter::once(0))
                .collect();

            let handle = unsafe {
                CreateFileW(
                    wide.as_ptr(),
                    GENERIC_READ | GENERIC_WRITE,
                    FILE_SHARE_READ | FILE_SHARE_WRITE,
                    null_mut(),
                    OPEN_EXISTING,
                    0,
                    null_mut(),
                )
            };

            if handle == INVALID_HANDLE_VALUE {
                return Err(FlashError::External(format!(
                    "Failed to open {}: {}",
                    path,
                    io::Error::last_os_error()
                )));
            }

            Ok(Self {
                handle,
                path: path.to_string(),
            })
        }

        fn control(&self, code: DWORD) -> io::Result<()> {
            let mut bytes_returned: DWORD = 0;
            let result = unsafe {
                DeviceIoControl(
                    self.handle,
                    code,
                    null_mut(),
                    0,
                    null_mut(),
                    0,
                    &mut bytes_returned,
                    null_mut(),
                )
            };
            if result == FALSE {
                Err(io::Error::last_os_error())
            } else {
                Ok(())
            }
        }

        pub fn lock(&self) -> io::Result<()> {
            self.control(FSCTL_LOCK_VOLUME)
        }

        pub fn dismount(&self) -> io::Result<()> {
            self.control(FSCTL_DISMOUNT_VOLUME)
        }
    }

    impl Drop for VolumeHandle {
        fn drop(&mut self) {
            if unsafe { CloseHandle(self.handle) } == FALSE {
                log::warn!(
                    "Failed to close handle for {}: {}",
                    self.path,
                    io::Error::last_os_error()
                );
            }
        }
    }
}

#[cfg(target_os = "windows")]
impl VolumeControl for SystemVolumeControl {
    fn dismount(&self, device_path: &str) -> Result<(), FlashError> {
        let handle = win::VolumeHandle::open(device_path)?;

        // Dismounting still works on an unlocked volume, just less safely
        if let Err(e) = handle.lock() {
            log::warn!("Could not lock {}: {}, continuing", device_path, e);
        }

        handle.dismount().map_err(|e| {
            FlashError::External(format!("Failed to dismount {}: {}", device_path, e))
        })?;
        log::info!("Dismounted {}", device_path);
        Ok(())
    }
}

#[cfg(not(target_os = "windows"))]
impl VolumeControl for SystemVolumeControl {
    fn dismount(&self, device_path: &str) -> Result<(), FlashError> {
        flashfmt_platform::release(device_path)
    }
}

/// Takes a volume offline ahead of a format. On Windows this is a handle
/// dismount of `\\.\E:`, which keeps the drive letter so letter-addressed
/// tools still find the volume afterwards. Elsewhere the device node is
/// unmounted.
pub fn release_volume<C: VolumeControl>(control: &C, identifier: &str) -> Result<(), FlashError> {
    let target = normalize_identifier(identifier)?;
    if !cfg!(target_os = "windows") {
        return control.dismount(&target);
    }

    let letter = drive_letter(&target)
        .ok_or_else(|| FlashError::InvalidInput(format!("{} has no drive letter", target)))?;
    control.dismount(&format!("\\\\.\\{}:", letter))
}

/// Dismounts the volume through a raw handle.
///
/// This strategy does not format. It never reports success: after a
/// successful dismount it returns a failed result saying no filesystem was
/// written.
pub struct VolumeHandleStrategy<C = SystemVolumeControl> {
    control: C,
}

impl VolumeHandleStrategy<SystemVolumeControl> {
    pub fn new() -> Self {
        Self::with_control(SystemVolumeControl)
    }
}

impl Default for VolumeHandleStrategy<SystemVolumeControl> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: VolumeControl> VolumeHandleStrategy<C> {
    pub fn with_control(control: C) -> Self {
        Self { control }
    }

    fn try_format(&self, identifier: &str) -> Result<FormatResult, FlashError> {
        let target = normalize_identifier(identifier)?;
        let letter = drive_letter(&target).ok_or_else(|| {
            FlashError::InvalidInput(format!("{} has no drive letter", target))
        })?;

        self.control.dismount(&format!("\\\\.\\{}:", letter))?;

        log::warn!("{} dismounted; low-level formatting is not implemented", target);
        Ok(FormatResult::failure(
            target.clone(),
            format!(
                "{} was dismounted but not formatted: low-level formatting is not implemented. \
                 Use the command or diskpart strategy.",
                target
            ),
        ))
    }
}

impl<C: VolumeControl> VolumeFormatter for VolumeHandleStrategy<C> {
    fn name(&self) -> &'static str {
        "handle"
    }

    fn format(&self, identifier: &str) -> FormatResult {
        self.try_format(identifier).unwrap_or_else(|e| {
            FormatResult::failure(result_identifier(identifier), e.to_string())
        })
    }
}

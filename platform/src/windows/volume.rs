use flashfmt_core::{
    normalize_identifier, DiskGeometry, DriveType, FlashError, VolumeInfo, VolumeSource,
};
use std::ffi::OsStr;
use std::io;
use std::os::windows::ffi::OsStrExt;
use std::ptr::null_mut;
use winapi::shared::minwindef::{DWORD, MAX_PATH};
use winapi::um::fileapi::{
    DeleteVolumeMountPointW, GetDiskFreeSpaceW, GetDriveTypeW, GetLogicalDriveStringsW,
    GetVolumeInformationW,
};
use winapi::um::winbase::{
    DRIVE_CDROM, DRIVE_FIXED, DRIVE_NO_ROOT_DIR, DRIVE_RAMDISK, DRIVE_REMOTE, DRIVE_REMOVABLE,
};

fn to_wide(s: &str) -> Vec<u16> {
    OsStr::new(s)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

fn from_wide(buffer: &[u16]) -> String {
    let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
    String::from_utf16_lossy(&buffer[..len])
}

/// Splits the `A:\<NUL>C:\<NUL><NUL>` list returned by GetLogicalDriveStringsW.
fn split_drive_strings(buffer: &[u16]) -> Vec<String> {
    buffer
        .split(|&c| c == 0)
        .filter(|s| !s.is_empty())
        .map(String::from_utf16_lossy)
        .collect()
}

/// Drive letters, drive types, and volume details from the Win32 volume APIs.
#[derive(Debug, Default)]
pub struct WindowsVolumeSource;

impl VolumeSource for WindowsVolumeSource {
    fn volume_roots(&self) -> Result<Vec<String>, FlashError> {
        let mut buffer = vec![0u16; 256];
        loop {
            let len = unsafe { GetLogicalDriveStringsW(buffer.len() as DWORD, buffer.as_mut_ptr()) }
                as usize;
            if len == 0 {
                return Err(io::Error::last_os_error().into());
            }
            if len > buffer.len() {
                // Return value is the required size when the buffer is too small
                buffer.resize(len + 1, 0);
                continue;
            }
            return Ok(split_drive_strings(&buffer[..len]));
        }
    }

    fn drive_type(&self, root: &str) -> DriveType {
        let wide = to_wide(root);
        match unsafe { GetDriveTypeW(wide.as_ptr()) } {
            DRIVE_REMOVABLE => DriveType::Removable,
            DRIVE_FIXED => DriveType::Fixed,
            DRIVE_REMOTE => DriveType::Remote,
            DRIVE_CDROM => DriveType::CdRom,
            DRIVE_RAMDISK => DriveType::RamDisk,
            DRIVE_NO_ROOT_DIR => DriveType::NoRootDir,
            _ => DriveType::Unknown,
        }
    }

    fn volume_info(&self, root: &str) -> Result<VolumeInfo, FlashError> {
        let wide = to_wide(root);
        let mut label = vec![0u16; MAX_PATH + 1];
        let mut filesystem = vec![0u16; MAX_PATH + 1];

        let ok = unsafe {
            GetVolumeInformationW(
                wide.as_ptr(),
                label.as_mut_ptr(),
                label.len() as DWORD,
                null_mut(),
                null_mut(),
                null_mut(),
                filesystem.as_mut_ptr(),
                filesystem.len() as DWORD,
            )
        };
        if ok == 0 {
            return Err(FlashError::metadata(root, io::Error::last_os_error()));
        }

        Ok(VolumeInfo {
            label: from_wide(&label),
            filesystem: from_wide(&filesystem),
        })
    }

    fn geometry(&self, root: &str) -> Result<DiskGeometry, FlashError> {
        let wide = to_wide(root);
        let mut sectors_per_cluster: DWORD = 0;
        let mut bytes_per_sector: DWORD = 0;
        let mut free_clusters: DWORD = 0;
        let mut total_clusters: DWORD = 0;

        let ok = unsafe {
            GetDiskFreeSpaceW(
                wide.as_ptr(),
                &mut sectors_per_cluster,
                &mut bytes_per_sector,
                &mut free_clusters,
                &mut total_clusters,
            )
        };
        if ok == 0 {
            return Err(FlashError::metadata(root, io::Error::last_os_error()));
        }

        Ok(DiskGeometry {
            sectors_per_cluster: sectors_per_cluster as u64,
            bytes_per_sector: bytes_per_sector as u64,
            free_clusters: free_clusters as u64,
            total_clusters: total_clusters as u64,
        })
    }
}

/// Removes the drive-letter mount point of a volume. Best effort: failures
/// are logged and the caller carries on.
pub fn unmount(identifier: &str) {
    let drive = match normalize_identifier(identifier) {
        Ok(drive) => drive,
        Err(e) => {
            log::warn!("Cannot unmount {}: {}", identifier, e);
            return;
        }
    };

    let mount_point = to_wide(&format!("{}\\", drive));
    let ok = unsafe { DeleteVolumeMountPointW(mount_point.as_ptr()) };
    if ok == 0 {
        log::warn!(
            "Failed to unmount {}: {}",
            drive,
            io::Error::last_os_error()
        );
    } else {
        log::info!("Unmounted {}", drive);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wide(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    #[test]
    fn test_split_drive_strings() {
        let buffer = wide("C:\\\0E:\\\0F:\\\0\0");
        assert_eq!(split_drive_strings(&buffer), vec!["C:\\", "E:\\", "F:\\"]);
    }

    #[test]
    fn test_from_wide_stops_at_nul() {
        let mut buffer = wide("DATA");
        buffer.extend([0, 'X' as u16]);
        assert_eq!(from_wide(&buffer), "DATA");
    }
}

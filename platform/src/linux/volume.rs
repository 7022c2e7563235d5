use super::mounts::{parse_mounts, unescape_hex, MountEntry};
use flashfmt_core::{
    normalize_identifier, DiskGeometry, DriveType, FlashError, VolumeInfo, VolumeSource,
};
use std::fs;
use std::path::{Path, PathBuf};

/// Mounted block devices from `/proc/mounts`, classified through sysfs.
///
/// Volume roots are device nodes such as `/dev/sdb1`. Labels come from the
/// udev `/dev/disk/by-label` links and capacity from `statvfs` on the mount
/// point, with the fragment size standing in for the sector size and one
/// sector per cluster.
#[derive(Debug, Clone)]
pub struct LinuxVolumeSource {
    mounts_path: PathBuf,
    sys_block_dir: PathBuf,
    by_label_dir: PathBuf,
}

impl Default for LinuxVolumeSource {
    fn default() -> Self {
        Self::with_paths("/proc/mounts", "/sys/class/block", "/dev/disk/by-label")
    }
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn same_device(a: &str, b: &str) -> bool {
    a == b || canonical(Path::new(a)) == canonical(Path::new(b))
}

impl LinuxVolumeSource {
    pub fn with_paths(
        mounts_path: impl Into<PathBuf>,
        sys_block_dir: impl Into<PathBuf>,
        by_label_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            mounts_path: mounts_path.into(),
            sys_block_dir: sys_block_dir.into(),
            by_label_dir: by_label_dir.into(),
        }
    }

    fn mounts(&self) -> Result<Vec<MountEntry>, FlashError> {
        let contents = fs::read_to_string(&self.mounts_path)?;
        Ok(parse_mounts(&contents))
    }

    fn mount_entry(&self, device: &str) -> Result<MountEntry, FlashError> {
        self.mounts()?
            .into_iter()
            .find(|entry| same_device(&entry.device, device))
            .ok_or_else(|| FlashError::metadata(device, "volume is not mounted"))
    }

    /// Every place the device is currently mounted.
    pub fn mount_points(&self, device: &str) -> Result<Vec<PathBuf>, FlashError> {
        Ok(self
            .mounts()?
            .into_iter()
            .filter(|entry| same_device(&entry.device, device))
            .map(|entry| entry.mount_point)
            .collect())
    }

    fn removable_flag(&self, device: &str) -> Option<bool> {
        let name = canonical(Path::new(device)).file_name()?.to_owned();
        let dir = self.sys_block_dir.join(name);
        if !dir.exists() {
            return None;
        }

        // Partitions carry no flag of their own; the parent disk does.
        let flag = if dir.join("partition").exists() {
            dir.join("..").join("removable")
        } else {
            dir.join("removable")
        };

        match fs::read_to_string(&flag) {
            Ok(content) => Some(content.trim() == "1"),
            Err(e) => {
                log::debug!("Cannot read {}: {}", flag.display(), e);
                None
            }
        }
    }

    fn label(&self, device: &str) -> String {
        let entries = match fs::read_dir(&self.by_label_dir) {
            Ok(entries) => entries,
            Err(_) => return String::new(),
        };

        let target = canonical(Path::new(device));
        entries
            .flatten()
            .find(|entry| canonical(&entry.path()) == target)
            .map(|entry| unescape_hex(&entry.file_name().to_string_lossy()))
            .unwrap_or_default()
    }
}

impl VolumeSource for LinuxVolumeSource {
    fn volume_roots(&self) -> Result<Vec<String>, FlashError> {
        let mut roots: Vec<String> = Vec::new();
        for entry in self.mounts()? {
            if !roots.contains(&entry.device) {
                roots.push(entry.device);
            }
        }
        Ok(roots)
    }

    fn drive_type(&self, root: &str) -> DriveType {
        match self.removable_flag(root) {
            Some(true) => DriveType::Removable,
            Some(false) => DriveType::Fixed,
            None => DriveType::Unknown,
        }
    }

    fn volume_info(&self, root: &str) -> Result<VolumeInfo, FlashError> {
        let entry = self.mount_entry(root)?;
        Ok(VolumeInfo {
            label: self.label(root),
            filesystem: entry.fstype,
        })
    }

    fn geometry(&self, root: &str) -> Result<DiskGeometry, FlashError> {
        let entry = self.mount_entry(root)?;
        let stats = nix::sys::statvfs::statvfs(entry.mount_point.as_path())
            .map_err(|e| FlashError::metadata(root, e))?;

        Ok(DiskGeometry {
            sectors_per_cluster: 1,
            bytes_per_sector: stats.fragment_size() as u64,
            free_clusters: stats.blocks_free() as u64,
            total_clusters: stats.blocks() as u64,
        })
    }
}

/// Unmounts every mount point of a device. Best effort: failures are logged
/// and the caller carries on.
pub fn unmount(identifier: &str) {
    unmount_with(&LinuxVolumeSource::default(), identifier)
}

pub(crate) fn unmount_with(source: &LinuxVolumeSource, identifier: &str) {
    if let Err(e) = release_with(source, identifier) {
        log::warn!("{}", e);
    }
}

/// Unmounts every mount point of a device and checks the mount table again.
/// Fails while any mount point remains, so nothing writes to the old
/// filesystem once a new one is laid down.
pub fn release(identifier: &str) -> Result<(), FlashError> {
    release_with(&LinuxVolumeSource::default(), identifier)
}

pub(crate) fn release_with(source: &LinuxVolumeSource, identifier: &str) -> Result<(), FlashError> {
    let device = normalize_identifier(identifier)?;
    let mount_points = source.mount_points(&device)?;
    if mount_points.is_empty() {
        log::debug!("{} is not mounted", device);
        return Ok(());
    }

    for mount_point in &mount_points {
        match nix::mount::umount(mount_point.as_path()) {
            Ok(()) => log::info!("Unmounted {} from {}", device, mount_point.display()),
            Err(e) => log::warn!(
                "Failed to unmount {} from {}: {}",
                device,
                mount_point.display(),
                e
            ),
        }
    }

    let remaining = source.mount_points(&device)?;
    if remaining.is_empty() {
        return Ok(());
    }
    let points: Vec<String> = remaining.iter().map(|p| p.display().to_string()).collect();
    Err(FlashError::External(format!(
        "{} is still mounted at {}",
        device,
        points.join(", ")
    )))
}

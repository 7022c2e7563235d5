use std::path::PathBuf;

/// One block-device line of `/proc/mounts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    pub mount_point: PathBuf,
    pub fstype: String,
}

/// Parses mount table text, keeping only entries backed by a device path.
///
/// Pseudo filesystems (`proc`, `tmpfs`, `overlay`, ...) have no absolute
/// source and are dropped.
pub fn parse_mounts(contents: &str) -> Vec<MountEntry> {
    contents
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?;
            let mount_point = fields.next()?;
            let fstype = fields.next()?;
            if !device.starts_with('/') {
                return None;
            }
            Some(MountEntry {
                device: unescape_octal(device),
                mount_point: PathBuf::from(unescape_octal(mount_point)),
                fstype: fstype.to_string(),
            })
        })
        .collect()
}

/// Undoes the `\040`-style escaping the kernel applies to mount fields.
pub fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && is_octal(&bytes[i + 1..i + 4]) {
            let value = (bytes[i + 1] - b'0') * 64 + (bytes[i + 2] - b'0') * 8 + (bytes[i + 3] - b'0');
            out.push(value);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn is_octal(digits: &[u8]) -> bool {
    digits.len() == 3 && digits[0] <= b'3' && digits.iter().all(|d| (b'0'..=b'7').contains(d))
}

/// Undoes the `\x20`-style escaping udev applies to `/dev/disk/by-label` names.
pub fn unescape_hex(name: &str) -> String {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && bytes.get(i + 1) == Some(&b'x') {
            if let Some(value) = bytes
                .get(i + 2..i + 4)
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
sysfs /sys sysfs rw,nosuid,nodev,noexec,relatime 0 0
proc /proc proc rw,nosuid,nodev,noexec,relatime 0 0
/dev/nvme0n1p2 / ext4 rw,relatime 0 0
tmpfs /run tmpfs rw,nosuid,nodev,size=3247660k,mode=755 0 0
/dev/sdb1 /media/user/MY\\040STICK vfat rw,nosuid,nodev,relatime,uid=1000 0 0
";

    #[test]
    fn test_parse_mounts_keeps_block_devices() {
        let entries = parse_mounts(SAMPLE);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].device, "/dev/nvme0n1p2");
        assert_eq!(entries[0].fstype, "ext4");
        assert_eq!(entries[1].device, "/dev/sdb1");
        assert_eq!(entries[1].mount_point, PathBuf::from("/media/user/MY STICK"));
        assert_eq!(entries[1].fstype, "vfat");
    }

    #[test]
    fn test_parse_mounts_ignores_short_lines() {
        assert!(parse_mounts("/dev/sda1 /mnt\n\n").is_empty());
    }

    #[test]
    fn test_unescape_octal() {
        assert_eq!(unescape_octal("a\\040b\\011c"), "a b\tc");
        assert_eq!(unescape_octal("trailing\\04"), "trailing\\04");
        assert_eq!(unescape_octal("plain"), "plain");
    }

    #[test]
    fn test_unescape_hex() {
        assert_eq!(unescape_hex("MY\\x20STICK"), "MY STICK");
        assert_eq!(unescape_hex("bad\\xZZ"), "bad\\xZZ");
        assert_eq!(unescape_hex("DATA"), "DATA");
    }
}

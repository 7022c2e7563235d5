use crate::{DeviceDescriptor, FlashError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetFilesystem {
    #[default]
    Ntfs,
    Fat32,
    ExFat,
}

impl TargetFilesystem {
    /// Spelling used by `format.com /FS:`.
    pub fn format_com_name(&self) -> &'static str {
        match self {
            TargetFilesystem::Ntfs => "NTFS",
            TargetFilesystem::Fat32 => "FAT32",
            TargetFilesystem::ExFat => "exFAT",
        }
    }

    /// Spelling used by diskpart's `format fs=`.
    pub fn diskpart_name(&self) -> &'static str {
        match self {
            TargetFilesystem::Ntfs => "ntfs",
            TargetFilesystem::Fat32 => "fat32",
            TargetFilesystem::ExFat => "exfat",
        }
    }

    pub fn max_label_length(&self) -> usize {
        match self {
            TargetFilesystem::Ntfs => 32,
            TargetFilesystem::Fat32 => 11,
            TargetFilesystem::ExFat => 15,
        }
    }
}

impl fmt::Display for TargetFilesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.format_com_name())
    }
}

impl FromStr for TargetFilesystem {
    type Err = FlashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ntfs" => Ok(TargetFilesystem::Ntfs),
            "fat32" | "vfat" => Ok(TargetFilesystem::Fat32),
            "exfat" => Ok(TargetFilesystem::ExFat),
            other => Err(FlashError::InvalidInput(format!(
                "Unsupported filesystem type: {}",
                other
            ))),
        }
    }
}

/// What a format strategy writes. The default is a quick NTFS format
/// without a label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormatOptions {
    pub filesystem: TargetFilesystem,
    pub quick: bool,
    pub label: Option<String>,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            filesystem: TargetFilesystem::Ntfs,
            quick: true,
            label: None,
        }
    }
}

impl FormatOptions {
    pub fn validate(&self) -> Result<(), FlashError> {
        if let Some(ref label) = self.label {
            let max = self.filesystem.max_label_length();
            if label.chars().count() > max {
                return Err(FlashError::InvalidInput(format!(
                    "{} label must be {} characters or less",
                    self.filesystem, max
                )));
            }
            if label.contains(&['"', '\n', '\r'][..]) {
                return Err(FlashError::InvalidInput(
                    "Label must not contain quotes or line breaks".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Outcome of formatting one device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormatResult {
    pub identifier: String,
    pub succeeded: bool,
    pub message: String,
}

impl FormatResult {
    pub fn success(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            succeeded: true,
            message: message.into(),
        }
    }

    pub fn failure(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            identifier: identifier.into(),
            succeeded: false,
            message: if message.trim().is_empty() {
                "unknown error".to_string()
            } else {
                message
            },
        }
    }
}

impl fmt::Display for FormatResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.succeeded {
            write!(f, "[OK]   {} formatted successfully", self.identifier)
        } else {
            write!(f, "[FAIL] {} could not be formatted: {}", self.identifier, self.message)
        }
    }
}

/// One way of formatting a volume. Implementations never panic or return
/// errors; every outcome comes back as a [`FormatResult`].
pub trait VolumeFormatter {
    fn name(&self) -> &'static str;
    fn format(&self, identifier: &str) -> FormatResult;
}

impl<F: VolumeFormatter + ?Sized> VolumeFormatter for Box<F> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn format(&self, identifier: &str) -> FormatResult {
        (**self).format(identifier)
    }
}

/// Formats each device in turn and reports one result per device, in order.
pub fn format_all<F: VolumeFormatter + ?Sized>(
    formatter: &F,
    devices: &[DeviceDescriptor],
) -> Vec<FormatResult> {
    devices
        .iter()
        .map(|device| {
            log::info!("Formatting {} with {} strategy", device.identifier, formatter.name());
            let result = formatter.format(&device.identifier);
            if result.succeeded {
                log::info!("{}", result);
            } else {
                log::error!("{}", result);
            }
            result
        })
        .collect()
}

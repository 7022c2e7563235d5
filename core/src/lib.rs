pub mod device;
pub mod error;
pub mod format;
pub mod process;

pub use device::{
    capacity_gb, drive_letter, normalize_identifier, DeviceDescriptor, DeviceEnumerator,
    DiskGeometry, DriveType, VolumeInfo, VolumeSource,
};
pub use error::FlashError;
pub use format::{format_all, FormatOptions, FormatResult, TargetFilesystem, VolumeFormatter};
pub use process::{CommandOutput, CommandRunner, Invocation, SystemRunner};

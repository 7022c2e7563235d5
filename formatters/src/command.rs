use crate::volume_handle::{release_volume, SystemVolumeControl, VolumeControl};
use crate::result_identifier;
use flashfmt_core::{
    normalize_identifier, CommandRunner, FlashError, FormatOptions, FormatResult, Invocation,
    SystemRunner, TargetFilesystem, VolumeFormatter,
};

/// `format.com E: /FS:NTFS /Q /Y`, with a newline on stdin to answer the
/// volume label prompt.
pub fn format_com_invocation(target: &str, options: &FormatOptions) -> Invocation {
    let mut invocation = Invocation::new("format.com")
        .arg(target)
        .arg(format!("/FS:{}", options.filesystem.format_com_name()));

    if options.quick {
        invocation = invocation.arg("/Q");
    }
    if let Some(ref label) = options.label {
        invocation = invocation.arg(format!("/V:{}", label));
    }

    invocation.arg("/Y").stdin("\r\n")
}

/// The `mkfs.*` equivalent used on hosts without `format.com`.
///
/// `mkfs.exfat` has no full-format mode, so a full exFAT format is refused
/// rather than quietly run as a quick one.
pub fn mkfs_invocation(target: &str, options: &FormatOptions) -> Result<Invocation, FlashError> {
    let invocation = match options.filesystem {
        TargetFilesystem::Ntfs => {
            let mut inv = Invocation::new("mkfs.ntfs");
            if options.quick {
                inv = inv.arg("-Q");
            }
            inv = inv.arg("-F");
            if let Some(ref label) = options.label {
                inv = inv.args(["-L", label.as_str()]);
            }
            inv
        }
        TargetFilesystem::Fat32 => {
            let mut inv = Invocation::new("mkfs.vfat").args(["-F", "32"]);
            if !options.quick {
                inv = inv.arg("-c");
            }
            if let Some(ref label) = options.label {
                inv = inv.args(["-n", label.as_str()]);
            }
            inv
        }
        TargetFilesystem::ExFat => {
            if !options.quick {
                return Err(FlashError::NotSupported(
                    "mkfs.exfat cannot run a full format; drop --full".to_string(),
                ));
            }
            let mut inv = Invocation::new("mkfs.exfat");
            if let Some(ref label) = options.label {
                inv = inv.args(["-L", label.as_str()]);
            }
            inv
        }
    };
    Ok(invocation.arg(target))
}

/// Formats through the OS format utility, non-interactively.
///
/// `format.com` dismounts the volume itself. `mkfs.*` does not, so on other
/// hosts every mount point is released first and the format is abandoned if
/// the device stays mounted.
pub struct FormatUtilityStrategy<R = SystemRunner, C = SystemVolumeControl> {
    runner: R,
    control: C,
    options: FormatOptions,
}

impl FormatUtilityStrategy<SystemRunner> {
    pub fn new(options: FormatOptions) -> Self {
        Self::with_runner(SystemRunner, options)
    }
}

impl<R: CommandRunner> FormatUtilityStrategy<R> {
    pub fn with_runner(runner: R, options: FormatOptions) -> Self {
        Self {
            runner,
            control: SystemVolumeControl,
            options,
        }
    }
}

impl<R: CommandRunner, C: VolumeControl> FormatUtilityStrategy<R, C> {
    pub fn with_control<D: VolumeControl>(self, control: D) -> FormatUtilityStrategy<R, D> {
        FormatUtilityStrategy {
            runner: self.runner,
            control,
            options: self.options,
        }
    }

    pub fn invocation(&self, target: &str) -> Result<Invocation, FlashError> {
        if cfg!(target_os = "windows") {
            Ok(format_com_invocation(target, &self.options))
        } else {
            mkfs_invocation(target, &self.options)
        }
    }

    fn try_format(&self, identifier: &str) -> Result<FormatResult, FlashError> {
        let target = normalize_identifier(identifier)?;
        self.options.validate()?;

        let invocation = self.invocation(&target)?;
        if !cfg!(target_os = "windows") {
            release_volume(&self.control, &target)?;
        }
        log::info!("Formatting {} as {}", target, self.options.filesystem);
        log::debug!("Command: {}", invocation.command_line());

        let output = self.runner.run(&invocation)?;
        if !output.success {
            return Ok(FormatResult::failure(target, output.diagnostic()));
        }

        let stdout = output.stdout.trim();
        let message = if stdout.is_empty() {
            format!("Formatted {} as {}", target, self.options.filesystem)
        } else {
            stdout.to_string()
        };
        Ok(FormatResult::success(target, message))
    }
}

impl<R: CommandRunner, C: VolumeControl> VolumeFormatter for FormatUtilityStrategy<R, C> {
    fn name(&self) -> &'static str {
        "command"
    }

    fn format(&self, identifier: &str) -> FormatResult {
        self.try_format(identifier).unwrap_or_else(|e| {
            FormatResult::failure(result_identifier(identifier), e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_com_defaults() {
        let invocation = format_com_invocation("E:", &FormatOptions::default());
        assert_eq!(invocation.program, "format.com");
        assert_eq!(invocation.args, vec!["E:", "/FS:NTFS", "/Q", "/Y"]);
        assert!(invocation.stdin.is_some(), "label prompt must be answered");
    }

    #[test]
    fn test_format_com_full_with_label() {
        let options = FormatOptions {
            filesystem: TargetFilesystem::ExFat,
            quick: false,
            label: Some("BACKUP".to_string()),
        };
        let invocation = format_com_invocation("F:", &options);
        assert_eq!(invocation.args, vec!["F:", "/FS:exFAT", "/V:BACKUP", "/Y"]);
    }

    #[test]
    fn test_mkfs_ntfs_quick() {
        let invocation = mkfs_invocation("/dev/sdb1", &FormatOptions::default()).unwrap();
        assert_eq!(invocation.program, "mkfs.ntfs");
        assert_eq!(invocation.args, vec!["-Q", "-F", "/dev/sdb1"]);
    }

    #[test]
    fn test_mkfs_fat32_label() {
        let options = FormatOptions {
            filesystem: TargetFilesystem::Fat32,
            quick: true,
            label: Some("STICK".to_string()),
        };
        let invocation = mkfs_invocation("/dev/sdc1", &options).unwrap();
        assert_eq!(invocation.program, "mkfs.vfat");
        assert_eq!(invocation.args, vec!["-F", "32", "-n", "STICK", "/dev/sdc1"]);
    }

    #[test]
    fn test_mkfs_exfat() {
        let options = FormatOptions {
            filesystem: TargetFilesystem::ExFat,
            ..FormatOptions::default()
        };
        let invocation = mkfs_invocation("/dev/sdc1", &options).unwrap();
        assert_eq!(invocation.program, "mkfs.exfat");
        assert_eq!(invocation.args, vec!["/dev/sdc1"]);
    }

    #[test]
    fn test_mkfs_exfat_refuses_full_format() {
        let options = FormatOptions {
            filesystem: TargetFilesystem::ExFat,
            quick: false,
            label: None,
        };
        let result = mkfs_invocation("/dev/sdc1", &options);
        assert!(matches!(result, Err(FlashError::NotSupported(_))));
    }
}

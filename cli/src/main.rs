use anyhow::{anyhow, bail};
use clap::{ArgAction, Parser, Subcommand};
use flashfmt_core::{format_all, normalize_identifier, DeviceDescriptor, FormatOptions, TargetFilesystem};
use flashfmt_formatters::{
    build_formatter, release_volume, StrategyKind, SystemVolumeControl, VolumeControl,
};
use std::io::{self, BufRead, Write};

#[derive(Parser)]
#[command(name = "flashfmt")]
#[command(about = "Lists and formats removable drives", long_about = None)]
struct Cli {
    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List removable drives
    List {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Format removable drives. ERASES ALL DATA on them
    Format {
        /// Drives to format, e.g. E: or /dev/sdb1
        devices: Vec<String>,
        /// Format every listed removable drive
        #[arg(long, conflicts_with = "devices")]
        all: bool,
        /// Format strategy: command, diskpart or handle (defaults to diskpart on Windows, command elsewhere)
        #[arg(short, long)]
        strategy: Option<StrategyKind>,
        /// Target filesystem: ntfs, fat32 or exfat
        #[arg(short, long, default_value = "ntfs")]
        filesystem: TargetFilesystem,
        /// Full format instead of quick
        #[arg(long)]
        full: bool,
        /// Volume label for the new filesystem
        #[arg(short, long)]
        label: Option<String>,
        /// Dismount each drive before formatting (the drive letter is kept)
        #[arg(long)]
        unmount: bool,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Unmount a drive (best effort)
    Unmount {
        /// Drive to unmount, e.g. E: or /dev/sdb1
        device: String,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn print_devices(devices: &[DeviceDescriptor]) {
    if devices.is_empty() {
        println!("No removable drives detected.");
        return;
    }
    for device in devices {
        println!("{}", device);
    }
}

/// Picks the drives to format from the current enumeration.
fn select_devices(
    available: &[DeviceDescriptor],
    requested: &[String],
    all: bool,
) -> anyhow::Result<Vec<DeviceDescriptor>> {
    if all {
        return Ok(available.to_vec());
    }
    if requested.is_empty() {
        bail!("Name the drives to format, or pass --all");
    }

    let mut selected: Vec<DeviceDescriptor> = Vec::new();
    for id in requested {
        let normalized = normalize_identifier(id)?;
        if selected.iter().any(|d| d.identifier == normalized) {
            continue;
        }
        let device = available
            .iter()
            .find(|d| d.identifier == normalized)
            .ok_or_else(|| anyhow!("Not a listed removable drive: {}", normalized))?;
        selected.push(device.clone());
    }
    Ok(selected)
}

/// Takes every target offline before formatting. Best effort: a drive that
/// cannot be released is logged and still handed to the formatter.
fn release_targets<C: VolumeControl>(control: &C, targets: &[DeviceDescriptor]) {
    for device in targets {
        if let Err(e) = release_volume(control, &device.identifier) {
            log::warn!("Could not dismount {}: {}", device.identifier, e);
        }
    }
}

/// Prompts on stderr; stdout is reserved for `--json` output.
fn confirm(count: usize) -> anyhow::Result<bool> {
    eprintln!("\nWARNING: This will ERASE ALL DATA on {} drive(s)!", count);
    eprint!("Type 'yes' to continue: ");
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim() == "yes")
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::List { json } => {
            let devices = flashfmt_platform::enumerate();
            if json {
                println!("{}", serde_json::to_string_pretty(&devices)?);
            } else {
                print_devices(&devices);
            }
        }
        Commands::Format {
            devices,
            all,
            strategy,
            filesystem,
            full,
            label,
            unmount,
            yes,
            json,
        } => {
            let options = FormatOptions {
                filesystem,
                quick: !full,
                label,
            };
            options.validate()?;
            let strategy = strategy.unwrap_or_default();

            let available = flashfmt_platform::enumerate();
            if available.is_empty() {
                println!("No removable drives available.");
                return Ok(());
            }
            let targets = select_devices(&available, &devices, all)?;

            if !flashfmt_platform::is_elevated() {
                log::warn!("Not running with administrator/root privileges; formatting will likely fail");
            }

            if !json {
                println!("Drives to format ({} strategy, {}{}):", strategy, filesystem, if full { "" } else { ", quick" });
                print_devices(&targets);
            }

            if !yes && !confirm(targets.len())? {
                eprintln!("Format cancelled.");
                return Ok(());
            }

            if unmount {
                release_targets(&SystemVolumeControl, &targets);
            }

            let formatter = build_formatter(strategy, options);
            let results = format_all(&formatter, &targets);
            let refreshed = flashfmt_platform::enumerate();

            if json {
                let report = serde_json::json!({
                    "results": results,
                    "devices": refreshed,
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!();
                for result in &results {
                    println!("{}", result);
                }
                println!("\nRemovable drives now:");
                print_devices(&refreshed);
            }

            let failed = results.iter().filter(|r| !r.succeeded).count();
            if failed > 0 {
                bail!("{} of {} drive(s) failed to format", failed, results.len());
            }
        }
        Commands::Unmount { device } => {
            flashfmt_platform::unmount(&device);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn device(id: &str) -> DeviceDescriptor {
        DeviceDescriptor::new(id.to_string(), "DATA".to_string(), "FAT32".to_string(), 1 << 30)
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_format_flags() {
        let cli = Cli::parse_from([
            "flashfmt", "format", "E", "F:", "--strategy", "command", "-f", "fat32", "--full", "-y",
        ]);
        match cli.command {
            Commands::Format { devices, strategy, filesystem, full, yes, .. } => {
                assert_eq!(devices, vec!["E", "F:"]);
                assert_eq!(strategy, Some(StrategyKind::Command));
                assert_eq!(filesystem, TargetFilesystem::Fat32);
                assert!(full);
                assert!(yes);
            }
            _ => panic!("expected format command"),
        }
    }

    #[test]
    fn test_all_conflicts_with_named_devices() {
        assert!(Cli::try_parse_from(["flashfmt", "format", "E:", "--all"]).is_err());
    }

    #[test]
    fn test_select_all() {
        let available = vec![device("E:"), device("F:")];
        let selected = select_devices(&available, &[], true).unwrap();
        assert_eq!(selected, available);
    }

    #[test]
    fn test_select_normalizes_requested() {
        let available = vec![device("E:"), device("F:")];
        let selected = select_devices(&available, &["f".to_string()], false).unwrap();
        assert_eq!(selected, vec![device("F:")]);
    }

    #[test]
    fn test_select_drops_duplicate_requests() {
        let available = vec![device("E:"), device("F:")];
        let requested = ["E".to_string(), "e:\\".to_string(), "F:".to_string(), "E:".to_string()];
        let selected = select_devices(&available, &requested, false).unwrap();
        assert_eq!(selected, vec![device("E:"), device("F:")]);
    }

    struct RecordingControl {
        paths: RefCell<Vec<String>>,
    }

    impl VolumeControl for RecordingControl {
        fn dismount(&self, device_path: &str) -> Result<(), flashfmt_core::FlashError> {
            self.paths.borrow_mut().push(device_path.to_string());
            Err(flashfmt_core::FlashError::External("busy".to_string()))
        }
    }

    #[test]
    fn test_release_targets_continues_past_failures() {
        let control = RecordingControl { paths: RefCell::new(Vec::new()) };
        let targets = if cfg!(target_os = "windows") {
            vec![device("E:"), device("F:")]
        } else {
            vec![device("/dev/sdb1"), device("/dev/sdc1")]
        };

        release_targets(&control, &targets);

        let expected: Vec<String> = if cfg!(target_os = "windows") {
            vec![r"\\.\E:".to_string(), r"\\.\F:".to_string()]
        } else {
            vec!["/dev/sdb1".to_string(), "/dev/sdc1".to_string()]
        };
        assert_eq!(*control.paths.borrow(), expected);
    }

    #[test]
    fn test_select_rejects_unlisted_drive() {
        let available = vec![device("E:")];
        assert!(select_devices(&available, &["C:".to_string()], false).is_err());
        assert!(select_devices(&available, &[], false).is_err());
    }
}

pub mod command;
pub mod diskpart;
pub mod volume_handle;

use flashfmt_core::{normalize_identifier, FlashError, FormatOptions, VolumeFormatter};
use std::fmt;
use std::str::FromStr;

// Re-export strategies
pub use command::FormatUtilityStrategy;
pub use diskpart::DiskpartStrategy;
pub use volume_handle::{
    release_volume, SystemVolumeControl, VolumeControl, VolumeHandleStrategy,
};

/// Which format strategy to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// The OS format utility (`format.com`, or `mkfs.*` elsewhere).
    Command,
    /// A diskpart script.
    Diskpart,
    /// Raw volume handle. Dismounts only; never formats.
    Handle,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [StrategyKind::Command, StrategyKind::Diskpart, StrategyKind::Handle];

    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::Command => "command",
            StrategyKind::Diskpart => "diskpart",
            StrategyKind::Handle => "handle",
        }
    }
}

/// diskpart on Windows, the format utility everywhere else.
impl Default for StrategyKind {
    fn default() -> Self {
        if cfg!(target_os = "windows") {
            StrategyKind::Diskpart
        } else {
            StrategyKind::Command
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StrategyKind {
    type Err = FlashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "command" | "format" => Ok(StrategyKind::Command),
            "diskpart" | "script" => Ok(StrategyKind::Diskpart),
            "handle" => Ok(StrategyKind::Handle),
            other => Err(FlashError::InvalidInput(format!(
                "Unknown strategy '{}' (expected command, diskpart or handle)",
                other
            ))),
        }
    }
}

/// Builds the formatter for `kind`, bound to the real system.
pub fn build_formatter(kind: StrategyKind, options: FormatOptions) -> Box<dyn VolumeFormatter> {
    match kind {
        StrategyKind::Command => Box::new(FormatUtilityStrategy::new(options)),
        StrategyKind::Diskpart => Box::new(DiskpartStrategy::new(options)),
        StrategyKind::Handle => Box::new(VolumeHandleStrategy::new()),
    }
}

/// Identifier to report in a result when the strategy bailed out early.
pub(crate) fn result_identifier(identifier: &str) -> String {
    normalize_identifier(identifier).unwrap_or_else(|_| identifier.to_string())
}

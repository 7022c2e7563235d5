use crate::result_identifier;
use flashfmt_core::{
    drive_letter, normalize_identifier, CommandRunner, FlashError, FormatOptions, FormatResult,
    Invocation, SystemRunner, VolumeFormatter,
};
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempPath;

/// Script body: one selection directive, one format directive, one exit.
pub fn render_script(letter: char, options: &FormatOptions) -> String {
    let mut format = format!("format fs={}", options.filesystem.diskpart_name());
    if options.quick {
        format.push_str(" quick");
    }
    if let Some(ref label) = options.label {
        format.push_str(&format!(" label=\"{}\"", label));
    }

    format!("select volume {}\n{}\nexit\n", letter, format)
}

/// Formats through a diskpart script written to a temporary file.
///
/// The script file is removed on every exit path, whether diskpart succeeds,
/// fails, or cannot be started.
pub struct DiskpartStrategy<R = SystemRunner> {
    runner: R,
    options: FormatOptions,
    script_dir: Option<PathBuf>,
}

impl DiskpartStrategy<SystemRunner> {
    pub fn new(options: FormatOptions) -> Self {
        Self::with_runner(SystemRunner, options)
    }
}

impl<R: CommandRunner> DiskpartStrategy<R> {
    pub fn with_runner(runner: R, options: FormatOptions) -> Self {
        Self {
            runner,
            options,
            script_dir: None,
        }
    }

    /// Writes scripts into `dir` instead of the system temp directory.
    pub fn script_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.script_dir = Some(dir.into());
        self
    }

    fn write_script(&self, script: &str) -> Result<TempPath, FlashError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("flashfmt-diskpart-").suffix(".txt");

        let mut file = match self.script_dir {
            Some(ref dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(script.as_bytes())?;
        file.flush()?;

        // Close our handle so diskpart can open the file; the path still
        // deletes itself on drop.
        Ok(file.into_temp_path())
    }

    fn try_format(&self, identifier: &str) -> Result<FormatResult, FlashError> {
        let target = normalize_identifier(identifier)?;
        let letter = drive_letter(&target).ok_or_else(|| {
            FlashError::InvalidInput(format!(
                "{} has no drive letter; diskpart selects volumes by letter",
                target
            ))
        })?;
        self.options.validate()?;

        let script = self.write_script(&render_script(letter, &self.options))?;
        log::info!("Formatting {} as {} via diskpart", target, self.options.filesystem);
        log::debug!("diskpart script at {}", script.display());

        let invocation = Invocation::new("diskpart")
            .arg("/s")
            .arg(script.to_string_lossy());
        let outcome = self.runner.run(&invocation);

        let script_path = script.to_path_buf();
        if let Err(e) = script.close() {
            log::warn!("Failed to remove {}: {}", script_path.display(), e);
        }

        let output = outcome?;
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

impl<R: CommandRunner> VolumeFormatter for DiskpartStrategy<R> {
    fn name(&self) -> &'static str {
        "diskpart"
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
    use flashfmt_core::TargetFilesystem;

    #[test]
    fn test_default_script() {
        assert_eq!(
            render_script('E', &FormatOptions::default()),
            "select volume E\nformat fs=ntfs quick\nexit\n"
        );
    }

    #[test]
    fn test_script_with_label_and_full_format() {
        let options = FormatOptions {
            filesystem: TargetFilesystem::Fat32,
            quick: false,
            label: Some("CAMERA".to_string()),
        };
        assert_eq!(
            render_script('G', &options),
            "select volume G\nformat fs=fat32 label=\"CAMERA\"\nexit\n"
        );
    }

    #[test]
    fn test_script_has_three_directives() {
        let script = render_script('E', &FormatOptions::default());
        let lines: Vec<_> = script.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("select volume"));
        assert!(lines[1].starts_with("format"));
        assert_eq!(lines[2], "exit");
    }
}

use crate::FlashError;
use std::io::Write;
use std::process::{Command, Stdio};

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;

/// One external command: program, arguments, and optional text fed to stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// The most useful text for a failure report: stderr, then stdout, then
    /// the exit status.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.code {
            Some(code) => format!("exited with status {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs an external command to completion and captures its output.
pub trait CommandRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, FlashError>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, FlashError> {
        (**self).run(invocation)
    }
}

/// Spawns real processes. Blocks until the child exits; there is no timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, FlashError> {
        let program = which::which(&invocation.program)
            .map_err(|_| FlashError::ToolNotFound(invocation.program.clone()))?;

        log::debug!("Running: {}", invocation.command_line());

        let mut cmd = Command::new(program);
        cmd.args(&invocation.args)
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(target_os = "windows")]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let mut child = cmd.spawn().map_err(|e| {
            FlashError::External(format!("Failed to execute {}: {}", invocation.program, e))
        })?;

        if let Some(ref input) = invocation.stdin {
            if let Some(mut pipe) = child.stdin.take() {
                // The child may exit without reading; a broken pipe is not an error here.
                if let Err(e) = pipe.write_all(input.as_bytes()) {
                    log::debug!("Could not write stdin of {}: {}", invocation.program, e);
                }
            }
        }

        let output = child.wait_with_output()?;
        let result = CommandOutput {
            code: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        log::debug!("{} stdout: {}", invocation.program, result.stdout.trim());
        log::debug!("{} stderr: {}", invocation.program, result.stderr.trim());
        Ok(result)
    }
}

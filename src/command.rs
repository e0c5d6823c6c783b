//! Running external commands with their standard output redirected into a writer.
//!
//! The [CommandRunner] trait is the seam between the backup logic and the
//! operating system, so tests can substitute a fake dump command.

use std::fmt;
use std::io::{self, Write};
use std::process::{Command, Stdio};

/// A fully described external command.
///
/// Environment variables are only set on the child process. Their values are
/// never printed by the [Debug] or [Display](fmt::Display) implementations.
#[derive(Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets an environment variable scoped to the child process.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn envs(&self) -> &[(String, String)] {
        &self.envs
    }

    /// Value of a child environment variable, if set.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.envs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, _) in &self.envs {
            write!(f, "{key}=*** ")?;
        }
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<_> = self.envs.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("Invocation")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env_keys", &env_keys)
            .finish()
    }
}

/// How an external command terminated.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Finished {
    /// Exit code, [None] if the process was terminated by a signal.
    pub code: Option<i32>,
}

impl Finished {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for Finished {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "terminated by signal"),
        }
    }
}

/// Runs an [Invocation] to completion.
pub trait CommandRunner {
    /// Runs the command, copies everything it writes to stdout into `stdout`
    /// and blocks until it terminates.
    ///
    /// An [Err] means the command could not be launched or its output could
    /// not be transferred. A command that ran but failed is reported through
    /// [Finished].
    fn run(&self, invocation: &Invocation, stdout: &mut dyn Write) -> io::Result<Finished>;
}

/// Runs commands as real child processes.
///
/// Standard error of the child is inherited so diagnostics of the dump tool
/// end up next to our own log output.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation, stdout: &mut dyn Write) -> io::Result<Finished> {
        log::trace!(target: "command", "Running: {invocation}");

        let mut child = Command::new(invocation.program())
            .args(invocation.args())
            .envs(invocation.envs().iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let copied = match child.stdout.take() {
            Some(mut child_stdout) => io::copy(&mut child_stdout, stdout),
            None => Err(io::Error::other("stdout of child process not captured")),
        };

        // reap the child even if the copy failed
        let status = child.wait()?;
        let bytes = copied?;
        log::trace!(target: "command", "{} finished with {status}, {bytes} bytes on stdout", invocation.program());

        Ok(Finished {
            code: status.code(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_redacts_environment_values() {
        let invocation = Invocation::new("docker")
            .arg("exec")
            .env("PGPASSWORD", "hunter2");

        let shown = format!("{invocation} {invocation:?}");
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("PGPASSWORD"));
        assert_eq!(invocation.env_value("PGPASSWORD"), Some("hunter2"));
    }

    #[test]
    fn finished_is_success_only_for_zero() {
        assert!(Finished { code: Some(0) }.success());
        assert!(!Finished { code: Some(1) }.success());
        assert!(!Finished { code: None }.success());
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_captures_stdout_and_scopes_env() {
        let invocation = Invocation::new("sh")
            .arg("-c")
            .arg("printf '%s' \"$DB_BACKUP_TEST_SECRET\"")
            .env("DB_BACKUP_TEST_SECRET", "SELECT 1;");

        let mut out = Vec::new();
        let finished = SystemRunner.run(&invocation, &mut out).unwrap();

        assert!(finished.success());
        assert_eq!(out, b"SELECT 1;");
        assert!(std::env::var("DB_BACKUP_TEST_SECRET").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_reports_non_zero_exit() {
        let invocation = Invocation::new("sh").arg("-c").arg("exit 3");

        let finished = SystemRunner.run(&invocation, &mut io::sink()).unwrap();

        assert_eq!(finished.code, Some(3));
    }

    #[test]
    fn system_runner_fails_to_launch_missing_program() {
        let invocation = Invocation::new("db-backup-this-program-does-not-exist");

        assert!(SystemRunner.run(&invocation, &mut io::sink()).is_err());
    }
}

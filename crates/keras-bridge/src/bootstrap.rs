//! Repairing a broken runtime installation.
//!
//! When the first import of the root module fails, the
//! [`RuntimeHandle`](crate::RuntimeHandle) calls its [`Bootstrap`] exactly
//! once and then retries the import. The bootstrap is the only piece of the
//! bridge allowed to touch the installation.

use std::process::Command;

use tracing::{debug, info};

use crate::config::RuntimeConfig;

/// Something that can try to fix the runtime installation.
pub trait Bootstrap {
    /// Attempt a repair. The error is diagnostic text folded into
    /// [`BridgeError::InitializationFailed`](crate::BridgeError::InitializationFailed).
    fn repair(&self, config: &RuntimeConfig) -> Result<(), String>;
}

/// A bootstrap that never repairs anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRepair;

impl Bootstrap for NoRepair {
    fn repair(&self, _config: &RuntimeConfig) -> Result<(), String> {
        Err("no repair strategy configured".to_string())
    }
}

impl<F> Bootstrap for F
where
    F: Fn(&RuntimeConfig) -> Result<(), String>,
{
    fn repair(&self, config: &RuntimeConfig) -> Result<(), String> {
        self(config)
    }
}

/// Force-reinstalls the configured packages with pip.
///
/// Runs `<python_executable> -m pip install --force-reinstall <packages...>`.
#[derive(Debug, Clone, Default)]
pub struct PipBootstrap {
    extra_args: Vec<String>,
}

impl PipBootstrap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extra arguments appended after the package list (e.g. `--user`).
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    fn command(&self, config: &RuntimeConfig) -> Command {
        let mut cmd = Command::new(&config.python_executable);
        cmd.args(["-m", "pip", "install", "--force-reinstall"])
            .args(&config.repair_packages)
            .args(&self.extra_args);
        cmd
    }
}

impl Bootstrap for PipBootstrap {
    fn repair(&self, config: &RuntimeConfig) -> Result<(), String> {
        if config.repair_packages.is_empty() {
            return Err("no repair packages configured".to_string());
        }

        info!(
            python = %config.python_executable,
            packages = ?config.repair_packages,
            "Reinstalling runtime packages"
        );

        let output = self
            .command(config)
            .output()
            .map_err(|e| format!("failed to run {}: {e}", config.python_executable))?;

        if output.status.success() {
            debug!("pip reinstall finished");
            Ok(())
        } else {
            Err(format!(
                "pip exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_no_repair_fails() {
        assert!(NoRepair.repair(&RuntimeConfig::default()).is_err());
    }

    #[test]
    fn test_closure_bootstrap() {
        let calls = Cell::new(0);
        let bootstrap = |_: &RuntimeConfig| {
            calls.set(calls.get() + 1);
            Ok::<(), String>(())
        };
        assert!(bootstrap.repair(&RuntimeConfig::default()).is_ok());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_pip_command_line() {
        let config = RuntimeConfig::builder()
            .python_executable("python3.12")
            .repair_packages(["tensorflow"])
            .build()
            .unwrap();
        let cmd = PipBootstrap::new().arg("--user").command(&config);
        assert_eq!(cmd.get_program(), "python3.12");
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec!["-m", "pip", "install", "--force-reinstall", "tensorflow", "--user"]
        );
    }

    #[test]
    fn test_pip_without_packages() {
        let config = RuntimeConfig::builder()
            .repair_packages(Vec::<String>::new())
            .build()
            .unwrap();
        let err = PipBootstrap::new().repair(&config).unwrap_err();
        assert!(err.contains("no repair packages"));
    }

    #[test]
    fn test_pip_missing_interpreter() {
        let config = RuntimeConfig::builder()
            .python_executable("definitely-not-a-python-binary")
            .build()
            .unwrap();
        let err = PipBootstrap::new().repair(&config).unwrap_err();
        assert!(err.contains("failed to run"));
    }
}

//! Runtime configuration.
//!
//! This module provides [`RuntimeConfig`] and its builder. The configuration
//! names the root module to import, the optional modules imported next to it,
//! and what the [`Bootstrap`](crate::Bootstrap) should reinstall when the
//! first import fails.
//!
//! # Example
//!
//! ```
//! use keras_bridge::RuntimeConfig;
//!
//! let config = RuntimeConfig::builder()
//!     .root_module("keras")
//!     .optional_module("numpy")
//!     .capture_output(true)
//!     .build()
//!     .expect("valid config");
//! assert_eq!(config.root_module, "keras");
//! ```
//!
//! # Environment
//!
//! [`RuntimeConfig::from_env`] starts from the defaults and applies:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `KERAS_BRIDGE_MODULE` | `root_module` |
//! | `KERAS_BRIDGE_PYTHON` | `python_executable` |
//! | `KERAS_BRIDGE_CAPTURE_OUTPUT` | `capture_output` (`1`, `true`, `yes`, `on`) |

use std::env;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Default root module.
pub const DEFAULT_ROOT_MODULE: &str = "tensorflow.keras";

/// Configuration for a [`RuntimeHandle`](crate::RuntimeHandle).
///
/// Use [`RuntimeConfig::builder()`] to construct a validated configuration.
/// A configuration loaded through serde should be checked with
/// [`validate`](Self::validate) before use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Dotted name of the module every call target is resolved against
    /// (default: `tensorflow.keras`).
    pub root_module: String,

    /// Modules imported after the root. A failure here only logs a warning
    /// (default: `["numpy"]`).
    pub optional_modules: Vec<String>,

    /// Interpreter used by the pip repair step (default: `python3`).
    pub python_executable: String,

    /// Packages force-reinstalled by the pip repair step
    /// (default: `["tensorflow", "numpy"]`).
    pub repair_packages: Vec<String>,

    /// Redirect the runtime's stdout and stderr into buffers readable through
    /// the lock token (default: false).
    pub capture_output: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            root_module: DEFAULT_ROOT_MODULE.to_string(),
            optional_modules: vec!["numpy".to_string()],
            python_executable: "python3".to_string(),
            repair_packages: vec!["tensorflow".to_string(), "numpy".to_string()],
            capture_output: false,
        }
    }
}

impl RuntimeConfig {
    /// Create a new builder seeded with the defaults.
    #[must_use]
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    /// Defaults overlaid with the `KERAS_BRIDGE_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InitializationFailed`] if the result does not
    /// validate.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::builder();
        if let Ok(module) = env::var("KERAS_BRIDGE_MODULE") {
            builder = builder.root_module(module);
        }
        if let Ok(python) = env::var("KERAS_BRIDGE_PYTHON") {
            builder = builder.python_executable(python);
        }
        if let Ok(flag) = env::var("KERAS_BRIDGE_CAPTURE_OUTPUT") {
            builder = builder.capture_output(parse_flag(&flag));
        }
        builder.build()
    }

    /// Check the invariants the builder enforces.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InitializationFailed`] if:
    /// - `root_module` or an optional module is not a dotted identifier path
    /// - `python_executable` is blank
    pub fn validate(&self) -> Result<()> {
        if !is_module_path(&self.root_module) {
            return Err(BridgeError::InitializationFailed(format!(
                "root_module must be a dotted module path, got '{}'",
                self.root_module
            )));
        }

        if let Some(bad) = self.optional_modules.iter().find(|m| !is_module_path(m)) {
            return Err(BridgeError::InitializationFailed(format!(
                "optional_modules entry '{bad}' is not a dotted module path"
            )));
        }

        if self.python_executable.trim().is_empty() {
            return Err(BridgeError::InitializationFailed(
                "python_executable must not be blank".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// `a.b_c.d` style paths: non-empty segments of identifier characters, not
/// starting with a digit.
fn is_module_path(path: &str) -> bool {
    !path.is_empty()
        && path.split('.').all(|segment| {
            let mut chars = segment.chars();
            matches!(chars.next(), Some(c) if c == '_' || c.is_alphabetic())
                && chars.all(|c| c == '_' || c.is_alphanumeric())
        })
}

/// Builder for [`RuntimeConfig`].
///
/// Created via [`RuntimeConfig::builder()`]. All setters return `self` to allow
/// method chaining.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfigBuilder {
    config: RuntimeConfig,
}

impl RuntimeConfigBuilder {
    /// Set the root module.
    #[must_use]
    pub fn root_module(mut self, module: impl Into<String>) -> Self {
        self.config.root_module = module.into();
        self
    }

    /// Append an optional module.
    #[must_use]
    pub fn optional_module(mut self, module: impl Into<String>) -> Self {
        let module = module.into();
        if !self.config.optional_modules.contains(&module) {
            self.config.optional_modules.push(module);
        }
        self
    }

    /// Replace the optional module list.
    #[must_use]
    pub fn optional_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.optional_modules = modules.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn python_executable(mut self, python: impl Into<String>) -> Self {
        self.config.python_executable = python.into();
        self
    }

    #[must_use]
    pub fn repair_packages<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.repair_packages = packages.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn capture_output(mut self, capture: bool) -> Self {
        self.config.capture_output = capture;
        self
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// See [`RuntimeConfig::validate`].
    pub fn build(self) -> Result<RuntimeConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.root_module, "tensorflow.keras");
        assert_eq!(config.optional_modules, vec!["numpy"]);
        assert_eq!(config.python_executable, "python3");
        assert!(!config.capture_output);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = RuntimeConfig::builder()
            .root_module("keras")
            .optional_modules(["numpy", "tensorflowjs"])
            .optional_module("numpy")
            .repair_packages(["keras"])
            .capture_output(true)
            .build()
            .unwrap();

        assert_eq!(config.root_module, "keras");
        assert_eq!(config.optional_modules, vec!["numpy", "tensorflowjs"]);
        assert_eq!(config.repair_packages, vec!["keras"]);
        assert!(config.capture_output);
    }

    #[test]
    fn test_invalid_root_module() {
        for bad in ["", "  ", "tensorflow..keras", "1keras", "keras-nightly", ".keras"] {
            let result = RuntimeConfig::builder().root_module(bad).build();
            let err = result.unwrap_err();
            assert!(err.is_fatal());
            assert!(err.to_string().contains("root_module"), "{bad}: {err}");
        }
    }

    #[test]
    fn test_invalid_optional_module() {
        let err = RuntimeConfig::builder()
            .optional_module("not a module")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("optional_modules"));
    }

    #[test]
    fn test_blank_python_executable() {
        let err = RuntimeConfig::builder()
            .python_executable(" ")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("python_executable"));
    }

    #[test]
    fn test_module_path() {
        assert!(is_module_path("tensorflow.keras"));
        assert!(is_module_path("_private.mod2"));
        assert!(!is_module_path("tensorflow."));
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag(" TRUE "));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("nope"));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{"root_module": "keras", "capture_output": true}"#).unwrap();
        assert_eq!(config.root_module, "keras");
        assert!(config.capture_output);
        assert_eq!(config.optional_modules, vec!["numpy"]);
    }
}

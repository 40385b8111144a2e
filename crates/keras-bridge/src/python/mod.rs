//! Python interop.
//!
//! This module holds the pyo3 backend and the conversion layer between
//! [`ForeignValue`](crate::value::ForeignValue) and Python objects. It is only
//! compiled with the `python` feature (on by default).
//!
//! [`runtime`] builds the usual production handle: a [`PythonBackend`] with
//! the pip [`PipBootstrap`](crate::PipBootstrap) as its repair strategy and
//! the process-wide serialization lock.
//!
//! ```rust,ignore
//! use keras_bridge::{InvocationDispatcher, ParameterSet, RuntimeConfig, CallTarget};
//!
//! let runtime = keras_bridge::python::runtime(RuntimeConfig::from_env()?)?;
//! let token = runtime.acquire()?;
//! let dispatcher = InvocationDispatcher::new(token);
//! let dense = dispatcher.invoke_constructor(
//!     &CallTarget::module("layers.Dense"),
//!     &ParameterSet::new().with("units", 64).with("activation", "relu"),
//! )?;
//! ```

pub mod backend;
pub mod conversion;

pub use backend::PythonBackend;

use crate::bootstrap::PipBootstrap;
use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::runtime::RuntimeHandle;

/// A Python-backed [`RuntimeHandle`] that repairs with pip.
///
/// # Errors
///
/// Returns [`BridgeError::InitializationFailed`](crate::BridgeError::InitializationFailed)
/// if `config` does not validate. The runtime itself starts on the first
/// [`acquire`](RuntimeHandle::acquire).
pub fn runtime(config: RuntimeConfig) -> Result<RuntimeHandle<PythonBackend>> {
    RuntimeHandle::builder(PythonBackend::new())
        .config(config)
        .bootstrap(PipBootstrap::new())
        .build()
}

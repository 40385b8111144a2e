//! The interface capability the bridge drives.
//!
//! A [`Backend`] is everything the bridge needs from an embedded runtime:
//! start it, import modules, walk attributes, call objects, and move values
//! across in both directions. The bridge itself never touches a runtime
//! directly, which is what lets the whole stack run against
//! [`MemoryBackend`] in tests.
//!
//! | Backend | Feature | Runtime |
//! |---------|---------|---------|
//! | [`PythonBackend`](crate::python::PythonBackend) | `python` | CPython through pyo3 |
//! | [`MemoryBackend`] | always | scripted in-process object graph |

pub mod memory;

pub use memory::{CallRecord, MemoryBackend, MemoryObject};

use std::sync::Arc;

use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::value::{ForeignHandle, ForeignValue};

/// Arguments of one foreign call.
///
/// A call either passes nothing, or exactly one positional argument plus a
/// (possibly empty) ordered keyword list.
#[derive(Debug, Clone, PartialEq)]
pub enum CallArgs<O> {
    Empty,
    Positional {
        positional: O,
        keywords: Vec<(String, O)>,
    },
}

impl<O> CallArgs<O> {
    pub fn keyword_count(&self) -> usize {
        match self {
            CallArgs::Empty => 0,
            CallArgs::Positional { keywords, .. } => keywords.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CallArgs::Empty)
    }
}

/// Which redirected stream to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// An embedded runtime.
///
/// `start` and `import` report failures as plain diagnostic text because they
/// only feed [`RuntimeHandle`](crate::RuntimeHandle)'s initialization, which
/// folds them into [`BridgeError::InitializationFailed`](crate::BridgeError).
/// Everything else returns typed errors.
pub trait Backend {
    /// A runtime object reference, cheap to clone.
    type Object: Clone + Send + Sync + 'static;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Bring the runtime up. Called before every import attempt, so it must
    /// tolerate being called again after a successful start.
    fn start(&self, config: &RuntimeConfig) -> std::result::Result<(), String>;

    /// Import a module by dotted name.
    fn import(&self, module: &str) -> std::result::Result<Self::Object, String>;

    /// Look up an attribute. A missing attribute is `Ok(None)`; other runtime
    /// failures are errors.
    fn getattr(&self, object: &Self::Object, name: &str) -> Result<Option<Self::Object>>;

    fn setattr(&self, object: &Self::Object, name: &str, value: &Self::Object) -> Result<()>;

    fn call(&self, callee: &Self::Object, args: CallArgs<Self::Object>) -> Result<Self::Object>;

    /// Convert a host value into a runtime object.
    ///
    /// Heterogeneous arrays and handles from another backend fail with
    /// [`BridgeError::ConversionError`](crate::BridgeError::ConversionError).
    fn encode(&self, value: &ForeignValue) -> Result<Self::Object>;

    /// Convert a runtime object into a host value. Objects outside the closed
    /// value set come back as handles.
    fn decode(&self, object: &Self::Object) -> Result<ForeignValue>;

    fn wrap(&self, object: Self::Object) -> ForeignHandle;

    fn unwrap(&self, handle: &ForeignHandle) -> Result<Self::Object>;

    /// The runtime's type name for an object.
    fn describe(&self, object: &Self::Object) -> String;

    /// Output the runtime wrote while capture was enabled. Backends that do
    /// not capture return an empty string.
    fn captured_output(&self, _stream: OutputStream) -> String {
        String::new()
    }
}

/// A shared backend, so tests and embedders can keep a reference to the
/// backend a [`RuntimeHandle`](crate::RuntimeHandle) owns.
impl<B: Backend + ?Sized> Backend for Arc<B> {
    type Object = B::Object;

    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn start(&self, config: &RuntimeConfig) -> std::result::Result<(), String> {
        (**self).start(config)
    }

    fn import(&self, module: &str) -> std::result::Result<Self::Object, String> {
        (**self).import(module)
    }

    fn getattr(&self, object: &Self::Object, name: &str) -> Result<Option<Self::Object>> {
        (**self).getattr(object, name)
    }

    fn setattr(&self, object: &Self::Object, name: &str, value: &Self::Object) -> Result<()> {
        (**self).setattr(object, name, value)
    }

    fn call(&self, callee: &Self::Object, args: CallArgs<Self::Object>) -> Result<Self::Object> {
        (**self).call(callee, args)
    }

    fn encode(&self, value: &ForeignValue) -> Result<Self::Object> {
        (**self).encode(value)
    }

    fn decode(&self, object: &Self::Object) -> Result<ForeignValue> {
        (**self).decode(object)
    }

    fn wrap(&self, object: Self::Object) -> ForeignHandle {
        (**self).wrap(object)
    }

    fn unwrap(&self, handle: &ForeignHandle) -> Result<Self::Object> {
        (**self).unwrap(handle)
    }

    fn describe(&self, object: &Self::Object) -> String {
        (**self).describe(object)
    }

    fn captured_output(&self, stream: OutputStream) -> String {
        (**self).captured_output(stream)
    }
}

//! The pyo3 [`Backend`].

use std::sync::Arc;

use parking_lot::Mutex;
use pyo3::exceptions::{PyAttributeError, PyImportError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyModule, PyTuple};
use tracing::debug;

use super::conversion::{from_python, handle_object, to_python, type_label, wrap_object};
use crate::backend::{Backend, CallArgs, OutputStream};
use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::value::{ForeignHandle, ForeignValue};

/// `io.StringIO` buffers installed as `sys.stdout` / `sys.stderr`.
#[derive(Debug)]
struct Capture {
    stdout: Py<PyAny>,
    stderr: Py<PyAny>,
}

/// CPython embedded through pyo3.
///
/// Objects are shared `Py<PyAny>` references; every operation attaches to the
/// interpreter for its own duration.
#[derive(Debug, Default)]
pub struct PythonBackend {
    capture: Mutex<Option<Capture>>,
}

impl PythonBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn install_capture(&self, py: Python<'_>) -> PyResult<()> {
        let mut capture = self.capture.lock();
        if capture.is_some() {
            return Ok(());
        }

        let string_io = py.import("io")?.getattr("StringIO")?;
        let stdout = string_io.call0()?;
        let stderr = string_io.call0()?;
        let sys = py.import("sys")?;
        sys.setattr("stdout", &stdout)?;
        sys.setattr("stderr", &stderr)?;
        debug!("Redirected sys.stdout and sys.stderr");

        *capture = Some(Capture {
            stdout: stdout.unbind(),
            stderr: stderr.unbind(),
        });
        Ok(())
    }
}

impl Backend for PythonBackend {
    type Object = Arc<Py<PyAny>>;

    fn name(&self) -> &'static str {
        "python"
    }

    fn start(&self, config: &RuntimeConfig) -> std::result::Result<(), String> {
        Python::initialize();
        if config.capture_output {
            Python::attach(|py| self.install_capture(py))
                .map_err(|e| format!("failed to redirect output: {e}"))?;
        }
        Ok(())
    }

    fn import(&self, module: &str) -> std::result::Result<Self::Object, String> {
        Python::attach(|py| {
            py.import(module)
                .map(|m| Arc::new(m.into_any().unbind()))
                .map_err(|e| e.to_string())
        })
    }

    /// Attribute lookup. On a module, a missing attribute falls back to
    /// importing `module.name`, since submodules are not always bound on
    /// their parent until imported.
    fn getattr(&self, object: &Self::Object, name: &str) -> Result<Option<Self::Object>> {
        Python::attach(|py| {
            let obj = object.bind(py);
            match obj.getattr(name) {
                Ok(value) => Ok(Some(Arc::new(value.unbind()))),
                Err(err) if err.is_instance_of::<PyAttributeError>(py) => {
                    if !obj.is_instance_of::<PyModule>() {
                        return Ok(None);
                    }
                    let parent: String = obj.getattr("__name__")?.extract()?;
                    match py.import(format!("{parent}.{name}")) {
                        Ok(module) => Ok(Some(Arc::new(module.into_any().unbind()))),
                        Err(e) if e.is_instance_of::<PyImportError>(py) => Ok(None),
                        Err(e) => Err(e.into()),
                    }
                }
                Err(err) => Err(err.into()),
            }
        })
    }

    fn setattr(&self, object: &Self::Object, name: &str, value: &Self::Object) -> Result<()> {
        Python::attach(|py| {
            object.bind(py).setattr(name, value.bind(py))?;
            Ok(())
        })
    }

    fn call(&self, callee: &Self::Object, args: CallArgs<Self::Object>) -> Result<Self::Object> {
        Python::attach(|py| {
            let callee = callee.bind(py);
            let out = match args {
                CallArgs::Empty => callee.call0()?,
                CallArgs::Positional {
                    positional,
                    keywords,
                } => {
                    let kwargs = PyDict::new(py);
                    for (name, value) in &keywords {
                        kwargs.set_item(name, value.bind(py))?;
                    }
                    let positional = PyTuple::new(py, [positional.bind(py)])?;
                    callee.call(positional, Some(&kwargs))?
                }
            };
            Ok(Arc::new(out.unbind()))
        })
    }

    fn encode(&self, value: &ForeignValue) -> Result<Self::Object> {
        Python::attach(|py| to_python(py, value).map(|obj| Arc::new(obj.unbind())))
    }

    fn decode(&self, object: &Self::Object) -> Result<ForeignValue> {
        Python::attach(|py| from_python(object.bind(py)))
    }

    fn wrap(&self, object: Self::Object) -> ForeignHandle {
        Python::attach(|py| wrap_object(object, py))
    }

    fn unwrap(&self, handle: &ForeignHandle) -> Result<Self::Object> {
        handle_object(handle)
    }

    fn describe(&self, object: &Self::Object) -> String {
        Python::attach(|py| type_label(object.bind(py)))
    }

    fn captured_output(&self, stream: OutputStream) -> String {
        let capture = self.capture.lock();
        let Some(capture) = capture.as_ref() else {
            return String::new();
        };
        Python::attach(|py| {
            let buffer = match stream {
                OutputStream::Stdout => capture.stdout.bind(py),
                OutputStream::Stderr => capture.stderr.bind(py),
            };
            buffer
                .call_method0("getvalue")
                .and_then(|v| v.extract::<String>())
                .unwrap_or_default()
        })
    }
}

//! Conversion between [`ForeignValue`] and Python objects.
//!
//! # Supported Types
//!
//! | Foreign value | Python type |
//! |---------------|-------------|
//! | `None` | `None` |
//! | `Bool` | `bool` |
//! | `Int` | `int` |
//! | `Float` | `float` |
//! | `Str` | `str` |
//! | `Array` | `list` (recursive) |
//! | `Tuple` | `tuple` (recursive) |
//! | `Slice` | `slice` |
//! | `Handle` | the wrapped object itself |
//!
//! Decoding goes the other way. A `list` decodes to `Array` when its elements
//! agree on a kind and to `Tuple` otherwise. numpy scalars and 0-d arrays are
//! unboxed through `.item()`. Every other object comes back as a handle.
//!
//! # Note
//!
//! Booleans are checked before integers because in Python `bool` is a
//! subclass of `int`.

use std::sync::Arc;

use pyo3::prelude::*;
use pyo3::types::{PyBool, PyFloat, PyInt, PyList, PyModule, PySlice, PyString, PyTuple};

use crate::error::{BridgeError, Result};
use crate::value::{ForeignHandle, ForeignValue, Slice};

/// Borrow the Python object behind a handle.
///
/// # Errors
///
/// Returns [`BridgeError::ConversionError`] if the handle was not produced by
/// the Python backend.
pub fn handle_object(handle: &ForeignHandle) -> Result<Arc<Py<PyAny>>> {
    handle.downcast_arc::<Py<PyAny>>().ok_or_else(|| {
        BridgeError::conversion(
            "python object",
            format!("handle '{}' from another backend", handle.label()),
        )
    })
}

/// The Python type name of `obj`, as used for handle labels.
pub fn type_label(obj: &Bound<'_, PyAny>) -> String {
    if obj.is_instance_of::<PyModule>()
        && let Some(name) = obj
            .getattr("__name__")
            .ok()
            .and_then(|n| n.extract::<String>().ok())
    {
        return name;
    }
    obj.get_type()
        .qualname()
        .map(|s| s.to_string())
        .unwrap_or_else(|_| "object".to_string())
}

/// Wrap a Python object as a [`ForeignHandle`].
pub fn wrap_object(obj: Arc<Py<PyAny>>, py: Python<'_>) -> ForeignHandle {
    let label = type_label(obj.bind(py));
    ForeignHandle::from_arc(obj, label)
}

/// Convert a [`ForeignValue`] to a Python object.
///
/// # Errors
///
/// Returns [`BridgeError::ConversionError`] for a heterogeneous `Array` or a
/// handle from another backend, and
/// [`BridgeError::ForeignInvocationError`] if Python fails to build an object.
pub fn to_python<'py>(py: Python<'py>, value: &ForeignValue) -> Result<Bound<'py, PyAny>> {
    match value {
        ForeignValue::None => Ok(py.None().into_bound(py)),
        ForeignValue::Bool(b) => Ok(b.into_pyobject(py)?.to_owned().into_any()),
        ForeignValue::Int(i) => Ok((*i).into_pyobject(py)?.into_any()),
        ForeignValue::Float(f) => Ok((*f).into_pyobject(py)?.into_any()),
        ForeignValue::Str(s) => Ok(PyString::new(py, s).into_any()),
        ForeignValue::Array(items) => {
            ForeignValue::element_kind(items)?;
            let converted = items
                .iter()
                .map(|item| to_python(py, item))
                .collect::<Result<Vec<_>>>()?;
            Ok(PyList::new(py, converted)?.into_any())
        }
        ForeignValue::Tuple(items) => {
            let converted = items
                .iter()
                .map(|item| to_python(py, item))
                .collect::<Result<Vec<_>>>()?;
            Ok(PyTuple::new(py, converted)?.into_any())
        }
        ForeignValue::Slice(s) => {
            let slice = py
                .import("builtins")?
                .getattr("slice")?
                .call1((s.start, s.stop, s.step))?;
            Ok(slice)
        }
        ForeignValue::Handle(h) => Ok(handle_object(h)?.bind(py).clone()),
    }
}

/// Convert a Python object to a [`ForeignValue`].
///
/// # Errors
///
/// Returns [`BridgeError::ConversionError`] for an `int` outside the `i64`
/// range and [`BridgeError::ForeignInvocationError`] if inspecting the object
/// raises.
pub fn from_python(obj: &Bound<'_, PyAny>) -> Result<ForeignValue> {
    let py = obj.py();

    if obj.is_none() {
        return Ok(ForeignValue::None);
    }

    if obj.is_instance_of::<PyBool>() {
        return Ok(ForeignValue::Bool(obj.extract::<bool>()?));
    }

    if obj.is_instance_of::<PyInt>() {
        return obj.extract::<i64>().map(ForeignValue::Int).map_err(|_| {
            BridgeError::conversion("int within i64 range", obj.to_string())
        });
    }

    if obj.is_instance_of::<PyFloat>() {
        return Ok(ForeignValue::Float(obj.extract::<f64>()?));
    }

    if obj.is_instance_of::<PyString>() {
        return Ok(ForeignValue::Str(obj.extract::<String>()?));
    }

    if obj.is_instance_of::<PyTuple>() {
        let items = obj
            .try_iter()?
            .map(|item| from_python(&item?))
            .collect::<Result<Vec<_>>>()?;
        return Ok(ForeignValue::Tuple(items));
    }

    if obj.is_instance_of::<PyList>() {
        let items = obj
            .try_iter()?
            .map(|item| from_python(&item?))
            .collect::<Result<Vec<_>>>()?;
        return Ok(ForeignValue::sequence(items));
    }

    if obj.is_instance_of::<PySlice>() {
        return Ok(ForeignValue::Slice(Slice {
            start: obj.getattr("start")?.extract()?,
            stop: obj.getattr("stop")?.extract()?,
            step: obj.getattr("step")?.extract()?,
        }));
    }

    if is_numpy_scalar(obj) {
        return from_python(&obj.call_method0("item")?);
    }

    let owned = Arc::new(obj.clone().unbind());
    Ok(ForeignValue::Handle(wrap_object(owned, py)))
}

/// numpy scalars and 0-d arrays: `ndim == 0` and an `item()` method.
fn is_numpy_scalar(obj: &Bound<'_, PyAny>) -> bool {
    obj.hasattr("item").unwrap_or(false)
        && obj
            .getattr("ndim")
            .ok()
            .and_then(|n| n.extract::<i64>().ok())
            == Some(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    #[ignore = "Requires Python runtime"]
    fn test_scalar_roundtrip() {
        Python::attach(|py| {
            for value in [
                ForeignValue::None,
                ForeignValue::Bool(true),
                ForeignValue::Int(-3),
                ForeignValue::Float(0.5),
                ForeignValue::Str("relu".to_string()),
            ] {
                let obj = to_python(py, &value).unwrap();
                assert_eq!(from_python(&obj).unwrap(), value);
            }
        });
    }

    #[test]
    #[ignore = "Requires Python runtime"]
    fn test_tuple_and_list() {
        Python::attach(|py| {
            let value = ForeignValue::Tuple(vec![
                ForeignValue::Array(vec![ForeignValue::Int(1), ForeignValue::Int(2)]),
                ForeignValue::Str("x".to_string()),
            ]);
            let obj = to_python(py, &value).unwrap();
            assert!(obj.is_instance_of::<PyTuple>());
            assert_eq!(from_python(&obj).unwrap(), value);
        });
    }

    #[test]
    #[ignore = "Requires Python runtime"]
    fn test_mixed_list_decodes_as_tuple() {
        Python::attach(|py| {
            let obj = py.eval(c"[1, 'a']", None, None).unwrap();
            assert_eq!(
                from_python(&obj).unwrap(),
                ForeignValue::Tuple(vec![ForeignValue::Int(1), ForeignValue::Str("a".into())])
            );
        });
    }

    #[test]
    #[ignore = "Requires Python runtime"]
    fn test_slice_roundtrip() {
        Python::attach(|py| {
            let value = ForeignValue::Slice(Slice::new(Some(1), None).with_step(2));
            let obj = to_python(py, &value).unwrap();
            assert!(obj.is_instance_of::<PySlice>());
            assert_eq!(from_python(&obj).unwrap(), value);
        });
    }

    #[test]
    #[ignore = "Requires Python runtime"]
    fn test_big_int_fails() {
        Python::attach(|py| {
            let obj = py.eval(c"2 ** 80", None, None).unwrap();
            assert!(matches!(
                from_python(&obj).unwrap_err(),
                BridgeError::ConversionError { .. }
            ));
        });
    }

    #[test]
    #[ignore = "Requires Python runtime"]
    fn test_other_objects_become_handles() {
        Python::attach(|py| {
            let obj = py.eval(c"object()", None, None).unwrap();
            let value = from_python(&obj).unwrap();
            let handle = value.as_handle().unwrap();
            assert_eq!(handle.label(), "object");
            let back = to_python(py, &value).unwrap();
            assert!(back.is(&obj));
        });
    }

    #[test]
    fn test_alien_handle_rejected() {
        let alien = ForeignHandle::new(7_u8, "u8");
        assert!(matches!(
            handle_object(&alien).unwrap_err(),
            BridgeError::ConversionError { .. }
        ));
    }
}

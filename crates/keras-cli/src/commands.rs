//! Subcommand implementations.
//!
//! Commands are generic over the backend so they can be exercised against
//! the in-memory backend in tests.

use anyhow::{Context, Result, anyhow};
use keras_bridge::backend::Backend;
use keras_bridge::keras::datasets::load_data;
use keras_bridge::{
    BridgeError, CallTarget, ForeignValue, InvocationDispatcher, ParameterSet, Shape,
};
use serde::Serialize;
use tracing::{debug, info};

/// Result of `probe`.
#[derive(Debug, Serialize)]
pub struct ProbeReport {
    pub backend: String,
    pub root_module: String,
    pub version: Option<String>,
    pub modules: Vec<String>,
}

/// Result of `dataset`: the shapes of the four arrays.
#[derive(Debug, Serialize)]
pub struct DatasetReport {
    pub name: String,
    pub x_train: Vec<Option<usize>>,
    pub y_train: Vec<Option<usize>>,
    pub x_test: Vec<Option<usize>>,
    pub y_test: Vec<Option<usize>>,
}

pub fn probe<B: Backend>(d: &InvocationDispatcher<'_, B>) -> Result<ProbeReport> {
    let token = d.token();
    let version = match d.get_attribute(&CallTarget::module("__version__")) {
        Ok(ForeignValue::Str(v)) => Some(v),
        Ok(other) => Some(other.to_string()),
        Err(BridgeError::AttributeNotFound { .. }) => None,
        Err(e) => return Err(e.into()),
    };

    Ok(ProbeReport {
        backend: token.backend().name().to_string(),
        root_module: token.root_module().to_string(),
        version,
        modules: token.modules().map(str::to_string).collect(),
    })
}

/// Parse `name=JSON`. A value that is not valid JSON is taken as a string,
/// so `-p activation=relu` works without quoting.
pub fn parse_param(raw: &str) -> Result<(String, ForeignValue)> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("parameter '{raw}' must look like name=value"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("parameter '{raw}' has an empty name"));
    }

    let value = match serde_json::from_str::<serde_json::Value>(value) {
        Ok(json) => ForeignValue::from_json(&json)
            .with_context(|| format!("parameter '{name}'"))?,
        Err(_) => ForeignValue::Str(value.to_string()),
    };
    Ok((name.to_string(), value))
}

/// Invoke `path` below the root module (or `method` on what it names).
pub fn call<B: Backend>(
    d: &InvocationDispatcher<'_, B>,
    path: &str,
    method: Option<&str>,
    raw_params: &[String],
) -> Result<ForeignValue> {
    let mut params = ParameterSet::new();
    for raw in raw_params {
        let (name, value) = parse_param(raw)?;
        params.set(name, value);
    }

    let mut target = CallTarget::module(path);
    if let Some(method) = method {
        target = target.method(method);
    }

    debug!(target = %target, params = ?params, "Invoking");
    let result = d.invoke_static(&target, &params)?;
    info!(kind = %result.kind(), "Call returned");
    Ok(result)
}

pub fn dataset<B: Backend>(d: &InvocationDispatcher<'_, B>, name: &str) -> Result<DatasetReport> {
    let ((x_train, y_train), (x_test, y_test)) = load_data(d, name, &ParameterSet::new())?;
    let dims = |shape: Shape| shape.dims().to_vec();

    Ok(DatasetReport {
        name: name.to_string(),
        x_train: dims(x_train.shape(d)?),
        y_train: dims(y_train.shape(d)?),
        x_test: dims(x_test.shape(d)?),
        y_test: dims(y_test.shape(d)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use keras_bridge::backend::{MemoryBackend, MemoryObject};
    use keras_bridge::{RuntimeConfig, RuntimeHandle, SerializationLock};
    use pretty_assertions::assert_eq;

    fn runtime() -> RuntimeHandle<MemoryBackend> {
        let keras = MemoryObject::namespace("keras")
            .with("__version__", MemoryObject::value(ForeignValue::Str("3.4.1".into())))
            .with(
                "activations.get",
                MemoryObject::function("get", |args| {
                    Ok(args.positional.clone().unwrap_or(ForeignValue::None))
                }),
            );
        let backend = MemoryBackend::new()
            .with_module("keras", keras)
            .with_module("numpy", MemoryObject::namespace("numpy"));
        RuntimeHandle::builder(backend)
            .config(RuntimeConfig::builder().root_module("keras").build().unwrap())
            .lock(SerializationLock::new())
            .build()
            .unwrap()
    }

    #[test]
    fn test_parse_param_json_and_bare() {
        assert_eq!(parse_param("units=32").unwrap(), ("units".to_string(), ForeignValue::Int(32)));
        assert_eq!(
            parse_param("activation=relu").unwrap(),
            ("activation".to_string(), ForeignValue::Str("relu".into()))
        );
        assert_eq!(
            parse_param("shape=[28, 28]").unwrap().1,
            ForeignValue::Array(vec![ForeignValue::Int(28), ForeignValue::Int(28)])
        );
        assert_eq!(parse_param("name=").unwrap().1, ForeignValue::Str(String::new()));
    }

    #[test]
    fn test_parse_param_errors() {
        assert!(parse_param("units").is_err());
        assert!(parse_param("=3").is_err());
        assert!(parse_param(r#"cfg={"a": 1}"#).is_err());
    }

    #[test]
    fn test_probe() {
        let rt = runtime();
        let d = InvocationDispatcher::new(rt.acquire().unwrap());
        let report = probe(&d).unwrap();
        assert_eq!(report.backend, "memory");
        assert_eq!(report.root_module, "keras");
        assert_eq!(report.version.as_deref(), Some("3.4.1"));
        assert_eq!(report.modules, vec!["numpy"]);
    }

    #[test]
    fn test_call_in_argument_order() {
        let rt = runtime();
        let d = InvocationDispatcher::new(rt.acquire().unwrap());
        let out = call(
            &d,
            "activations.get",
            None,
            &["identifier=\"tanh\"".to_string(), "extra=null".to_string()],
        )
        .unwrap();
        assert_eq!(out, ForeignValue::Str("tanh".into()));

        let (_, record) = rt.backend().last_call().unwrap();
        assert!(record.keywords.is_empty());
    }

    #[test]
    fn test_call_missing_path() {
        let rt = runtime();
        let d = InvocationDispatcher::new(rt.acquire().unwrap());
        let err = call(&d, "layers.Dense", None, &[]).unwrap_err();
        let bridge = err.downcast_ref::<BridgeError>().unwrap();
        assert_eq!(bridge.code(), "ATTRIBUTE_NOT_FOUND");
    }
}

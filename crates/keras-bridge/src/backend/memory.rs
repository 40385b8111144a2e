//! A scripted, in-process backend.
//!
//! [`MemoryBackend`] stands in for the embedded runtime wherever a real
//! interpreter is unavailable or unwanted. Modules are trees of
//! [`MemoryObject`]s: namespaces hold attributes, callables run Rust closures,
//! and values hold a [`ForeignValue`]. Every call is recorded, every import is
//! counted, and imports can be made to fail on demand.
//!
//! ```
//! use keras_bridge::backend::{MemoryBackend, MemoryObject};
//! use keras_bridge::value::ForeignValue;
//!
//! let keras = MemoryObject::namespace("keras").with(
//!     "layers.Dense",
//!     MemoryObject::function("Dense", |args| Ok(args.positional.clone().unwrap_or(ForeignValue::None))),
//! );
//! let backend = MemoryBackend::new().with_module("keras", keras);
//! assert_eq!(backend.import_count("keras"), 0);
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use super::{Backend, CallArgs, OutputStream};
use crate::config::RuntimeConfig;
use crate::error::{BridgeError, Result};
use crate::value::{ForeignHandle, ForeignValue};

type NativeFn = dyn Fn(&CallRecord) -> Result<Arc<MemoryObject>> + Send + Sync;

/// The decoded arguments of one call into a [`MemoryObject::Callable`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallRecord {
    pub positional: Option<ForeignValue>,
    pub keywords: IndexMap<String, ForeignValue>,
}

impl CallRecord {
    pub fn keyword(&self, name: &str) -> Option<&ForeignValue> {
        self.keywords.get(name)
    }

    /// True when the call passed no arguments at all.
    pub fn is_empty(&self) -> bool {
        self.positional.is_none() && self.keywords.is_empty()
    }
}

/// A node of the scripted object graph.
pub enum MemoryObject {
    Namespace {
        name: String,
        attrs: RwLock<IndexMap<String, Arc<MemoryObject>>>,
    },
    Callable {
        name: String,
        func: Box<NativeFn>,
    },
    Value(ForeignValue),
}

impl MemoryObject {
    pub fn namespace(name: impl Into<String>) -> Arc<Self> {
        Arc::new(MemoryObject::Namespace {
            name: name.into(),
            attrs: RwLock::new(IndexMap::new()),
        })
    }

    /// A callable returning an arbitrary object, typically a fresh namespace
    /// standing in for a constructed instance.
    pub fn factory<F>(name: impl Into<String>, func: F) -> Arc<Self>
    where
        F: Fn(&CallRecord) -> Result<Arc<MemoryObject>> + Send + Sync + 'static,
    {
        Arc::new(MemoryObject::Callable {
            name: name.into(),
            func: Box::new(func),
        })
    }

    /// A callable returning a plain value. A returned handle is unwrapped back
    /// to the object it refers to.
    pub fn function<F>(name: impl Into<String>, func: F) -> Arc<Self>
    where
        F: Fn(&CallRecord) -> Result<ForeignValue> + Send + Sync + 'static,
    {
        Self::factory(name, move |args| func(args).map(MemoryObject::from_value))
    }

    pub fn value(value: ForeignValue) -> Arc<Self> {
        Arc::new(MemoryObject::Value(value))
    }

    fn from_value(value: ForeignValue) -> Arc<Self> {
        if let ForeignValue::Handle(handle) = &value
            && let Some(object) = handle.downcast_arc::<MemoryObject>()
        {
            return object;
        }
        Self::value(value)
    }

    pub fn name(&self) -> &str {
        match self {
            MemoryObject::Namespace { name, .. } | MemoryObject::Callable { name, .. } => name,
            MemoryObject::Value(v) => v.type_name(),
        }
    }

    pub fn get_attr(&self, name: &str) -> Option<Arc<MemoryObject>> {
        match self {
            MemoryObject::Namespace { attrs, .. } => attrs.read().get(name).cloned(),
            _ => None,
        }
    }

    /// Set an attribute. Only namespaces hold attributes; returns false for
    /// any other node.
    pub fn set_attr(&self, name: impl Into<String>, value: Arc<MemoryObject>) -> bool {
        match self {
            MemoryObject::Namespace { attrs, .. } => {
                attrs.write().insert(name.into(), value);
                true
            }
            _ => false,
        }
    }

    /// Place `value` at a dotted path, creating intermediate namespaces.
    #[must_use]
    pub fn with(self: Arc<Self>, path: &str, value: Arc<MemoryObject>) -> Arc<Self> {
        let segments: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = segments.split_last() else {
            return self;
        };

        let mut current = Arc::clone(&self);
        for segment in parents {
            let next = match current.get_attr(segment) {
                Some(existing) => existing,
                None => {
                    let created = MemoryObject::namespace(*segment);
                    current.set_attr(*segment, Arc::clone(&created));
                    created
                }
            };
            current = next;
        }
        current.set_attr(*last, value);
        self
    }
}

impl fmt::Debug for MemoryObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryObject::Namespace { name, attrs } => f
                .debug_struct("Namespace")
                .field("name", name)
                .field("attrs", &attrs.read().keys().collect::<Vec<_>>())
                .finish(),
            MemoryObject::Callable { name, .. } => {
                f.debug_struct("Callable").field("name", name).finish()
            }
            MemoryObject::Value(v) => f.debug_tuple("Value").field(v).finish(),
        }
    }
}

/// In-process [`Backend`] over a scripted object graph.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    modules: RwLock<IndexMap<String, Arc<MemoryObject>>>,
    import_counts: Mutex<IndexMap<String, usize>>,
    start_count: AtomicUsize,
    pending_failures: AtomicUsize,
    calls: Mutex<Vec<(String, CallRecord)>>,
    capture: AtomicBool,
    stdout: Mutex<String>,
    stderr: Mutex<String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_module(self, name: impl Into<String>, module: Arc<MemoryObject>) -> Self {
        self.add_module(name, module);
        self
    }

    pub fn add_module(&self, name: impl Into<String>, module: Arc<MemoryObject>) {
        self.modules.write().insert(name.into(), module);
    }

    /// Make the next `count` imports fail regardless of module.
    pub fn fail_imports(&self, count: usize) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    pub fn import_count(&self, module: &str) -> usize {
        self.import_counts.lock().get(module).copied().unwrap_or(0)
    }

    pub fn start_count(&self) -> usize {
        self.start_count.load(Ordering::SeqCst)
    }

    /// Every call so far as `(callable name, arguments)`.
    pub fn calls(&self) -> Vec<(String, CallRecord)> {
        self.calls.lock().clone()
    }

    pub fn last_call(&self) -> Option<(String, CallRecord)> {
        self.calls.lock().last().cloned()
    }

    /// Append to a captured stream. Ignored unless capture was enabled at start.
    pub fn write_output(&self, stream: OutputStream, text: &str) {
        if !self.capture.load(Ordering::SeqCst) {
            return;
        }
        match stream {
            OutputStream::Stdout => self.stdout.lock().push_str(text),
            OutputStream::Stderr => self.stderr.lock().push_str(text),
        }
    }

    fn check_encodable(&self, value: &ForeignValue) -> Result<()> {
        match value {
            ForeignValue::Array(items) => {
                ForeignValue::element_kind(items)?;
                items.iter().try_for_each(|v| self.check_encodable(v))
            }
            ForeignValue::Tuple(items) => items.iter().try_for_each(|v| self.check_encodable(v)),
            ForeignValue::Handle(h) => self.unwrap(h).map(|_| ()),
            _ => Ok(()),
        }
    }
}

impl Backend for MemoryBackend {
    type Object = Arc<MemoryObject>;

    fn name(&self) -> &'static str {
        "memory"
    }

    fn start(&self, config: &RuntimeConfig) -> std::result::Result<(), String> {
        self.start_count.fetch_add(1, Ordering::SeqCst);
        self.capture.store(config.capture_output, Ordering::SeqCst);
        Ok(())
    }

    fn import(&self, module: &str) -> std::result::Result<Self::Object, String> {
        *self
            .import_counts
            .lock()
            .entry(module.to_string())
            .or_insert(0) += 1;

        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(format!("ImportError: injected failure importing '{module}'"));
        }

        self.modules
            .read()
            .get(module)
            .cloned()
            .ok_or_else(|| format!("ModuleNotFoundError: No module named '{module}'"))
    }

    fn getattr(&self, object: &Self::Object, name: &str) -> Result<Option<Self::Object>> {
        Ok(object.get_attr(name))
    }

    fn setattr(&self, object: &Self::Object, name: &str, value: &Self::Object) -> Result<()> {
        if object.set_attr(name, Arc::clone(value)) {
            Ok(())
        } else {
            Err(BridgeError::ForeignInvocationError(format!(
                "AttributeError: '{}' object attribute '{name}' is read-only",
                object.name()
            )))
        }
    }

    fn call(&self, callee: &Self::Object, args: CallArgs<Self::Object>) -> Result<Self::Object> {
        let MemoryObject::Callable { name, func } = callee.as_ref() else {
            return Err(BridgeError::ForeignInvocationError(format!(
                "TypeError: '{}' object is not callable",
                callee.name()
            )));
        };

        let record = match args {
            CallArgs::Empty => CallRecord::default(),
            CallArgs::Positional {
                positional,
                keywords,
            } => CallRecord {
                positional: Some(self.decode(&positional)?),
                keywords: keywords
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.decode(v)?)))
                    .collect::<Result<_>>()?,
            },
        };

        self.calls.lock().push((name.clone(), record.clone()));
        func(&record)
    }

    fn encode(&self, value: &ForeignValue) -> Result<Self::Object> {
        if let ForeignValue::Handle(h) = value {
            return self.unwrap(h);
        }
        self.check_encodable(value)?;
        Ok(MemoryObject::value(value.clone()))
    }

    fn decode(&self, object: &Self::Object) -> Result<ForeignValue> {
        match object.as_ref() {
            MemoryObject::Value(v) => Ok(v.clone()),
            _ => Ok(ForeignValue::Handle(self.wrap(Arc::clone(object)))),
        }
    }

    fn wrap(&self, object: Self::Object) -> ForeignHandle {
        let label = object.name().to_string();
        ForeignHandle::from_arc(object, label)
    }

    fn unwrap(&self, handle: &ForeignHandle) -> Result<Self::Object> {
        handle.downcast_arc::<MemoryObject>().ok_or_else(|| {
            BridgeError::conversion(
                "memory backend object",
                format!("handle '{}' from another backend", handle.label()),
            )
        })
    }

    fn describe(&self, object: &Self::Object) -> String {
        object.name().to_string()
    }

    fn captured_output(&self, stream: OutputStream) -> String {
        match stream {
            OutputStream::Stdout => self.stdout.lock().clone(),
            OutputStream::Stderr => self.stderr.lock().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn echo() -> Arc<MemoryObject> {
        MemoryObject::function("echo", |args| {
            Ok(args.positional.clone().unwrap_or(ForeignValue::None))
        })
    }

    #[test]
    fn test_dotted_with_creates_namespaces() {
        let root = MemoryObject::namespace("keras").with("layers.core.Dense", echo());
        let layers = root.get_attr("layers").unwrap();
        let core = layers.get_attr("core").unwrap();
        assert_eq!(core.get_attr("Dense").unwrap().name(), "echo");
    }

    #[test]
    fn test_import_counts_and_failures() {
        let backend = MemoryBackend::new().with_module("keras", MemoryObject::namespace("keras"));
        backend.fail_imports(1);
        assert!(backend.import("keras").is_err());
        assert!(backend.import("keras").is_ok());
        assert_eq!(backend.import_count("keras"), 2);

        let err = backend.import("missing").unwrap_err();
        assert!(err.contains("No module named 'missing'"));
    }

    #[test]
    fn test_call_records_arguments() {
        let backend = MemoryBackend::new();
        let f = echo();
        let args = CallArgs::Positional {
            positional: backend.encode(&ForeignValue::Int(3)).unwrap(),
            keywords: vec![(
                "activation".to_string(),
                backend.encode(&ForeignValue::Str("relu".into())).unwrap(),
            )],
        };
        let out = backend.call(&f, args).unwrap();
        assert_eq!(backend.decode(&out).unwrap(), ForeignValue::Int(3));

        let (name, record) = backend.last_call().unwrap();
        assert_eq!(name, "echo");
        assert_eq!(record.keyword("activation"), Some(&ForeignValue::Str("relu".into())));
    }

    #[test]
    fn test_call_non_callable() {
        let backend = MemoryBackend::new();
        let err = backend
            .call(&MemoryObject::namespace("layers"), CallArgs::Empty)
            .unwrap_err();
        assert!(err.to_string().contains("not callable"));
    }

    #[test]
    fn test_handle_roundtrip_identity() {
        let backend = MemoryBackend::new();
        let ns = MemoryObject::namespace("Sequential");
        let h1 = backend.wrap(Arc::clone(&ns));
        let h2 = backend.wrap(Arc::clone(&ns));
        assert_eq!(h1, h2);
        assert!(Arc::ptr_eq(&backend.unwrap(&h1).unwrap(), &ns));
        assert_eq!(h1.label(), "Sequential");
    }

    #[test]
    fn test_foreign_handle_rejected() {
        let backend = MemoryBackend::new();
        let alien = ForeignHandle::new(42_u32, "int");
        let err = backend.encode(&ForeignValue::Handle(alien)).unwrap_err();
        assert!(matches!(err, BridgeError::ConversionError { .. }));
    }

    #[test]
    fn test_heterogeneous_array_rejected() {
        let backend = MemoryBackend::new();
        let bad = ForeignValue::Array(vec![ForeignValue::Int(1), ForeignValue::Str("a".into())]);
        assert!(matches!(
            backend.encode(&bad).unwrap_err(),
            BridgeError::ConversionError { .. }
        ));
    }

    #[test]
    fn test_output_capture() {
        let backend = MemoryBackend::new();
        backend.write_output(OutputStream::Stdout, "ignored");
        let config = RuntimeConfig::builder().capture_output(true).build().unwrap();
        backend.start(&config).unwrap();
        backend.write_output(OutputStream::Stdout, "Epoch 1/1\n");
        assert_eq!(backend.captured_output(OutputStream::Stdout), "Epoch 1/1\n");
        assert_eq!(backend.captured_output(OutputStream::Stderr), "");
    }
}

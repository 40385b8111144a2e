//! Runtime lifecycle and the lock token.
//!
//! A [`RuntimeHandle`] owns one [`Backend`] and brings it up on first use.
//! Every call into the runtime needs a [`LockToken`], and the only way to get
//! one is [`RuntimeHandle::acquire`]. The token borrows the handle and is
//! neither `Send` nor `Sync`, so a call cannot be issued without an
//! initialized runtime or from a thread other than the one that acquired it.
//!
//! # Initialization
//!
//! The first [`acquire`](RuntimeHandle::acquire):
//!
//! 1. **Lock** - takes the [`SerializationLock`]. If another handle holds it,
//!    acquisition fails at once and no repair is attempted.
//! 2. **Import** - starts the backend and imports the root module.
//! 3. **Repair** - on failure, calls the [`Bootstrap`] once and repeats step 2.
//! 4. **Fail** - if the retry fails too, the lock is dropped and the handle
//!    enters [`InitState::Failed`]. Every later `acquire` returns the same
//!    error without retrying.
//! 5. **Optional modules** - each configured optional module is imported;
//!    failures are logged and otherwise ignored.
//!
//! Later calls hand out tokens over the same imported root without importing
//! again.
//!
//! # Example
//!
//! ```
//! use keras_bridge::backend::{MemoryBackend, MemoryObject};
//! use keras_bridge::{RuntimeConfig, RuntimeHandle, SerializationLock};
//!
//! let backend = MemoryBackend::new().with_module("keras", MemoryObject::namespace("keras"));
//! let config = RuntimeConfig::builder()
//!     .root_module("keras")
//!     .optional_modules(Vec::<String>::new())
//!     .build()?;
//! let runtime = RuntimeHandle::builder(backend)
//!     .config(config)
//!     .lock(SerializationLock::new())
//!     .build()?;
//!
//! let token = runtime.acquire()?;
//! assert_eq!(token.root_module(), "keras");
//! assert!(runtime.is_ready());
//! runtime.release();
//! # Ok::<(), keras_bridge::BridgeError>(())
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;
use once_cell::unsync::OnceCell;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use tracing::{debug, error, info, warn};

use crate::backend::{Backend, OutputStream};
use crate::bootstrap::{Bootstrap, NoRepair};
use crate::config::RuntimeConfig;
use crate::error::{BridgeError, Result};
use crate::value::ForeignHandle;

// ============================================================================
// SerializationLock
// ============================================================================

static GLOBAL_LOCK: LazyLock<SerializationLock> = LazyLock::new(SerializationLock::new);

/// The lock a ready [`RuntimeHandle`] holds for as long as it lives.
///
/// [`global()`](Self::global) returns the process-wide lock shared by every
/// handle that does not ask for its own; [`new()`](Self::new) creates a
/// private one, which lets several in-memory runtimes coexist.
#[derive(Clone, Default)]
pub struct SerializationLock(Arc<Mutex<()>>);

impl SerializationLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide lock.
    pub fn global() -> Self {
        GLOBAL_LOCK.clone()
    }

    pub fn is_locked(&self) -> bool {
        self.0.is_locked()
    }

    fn try_acquire(&self) -> Option<ArcMutexGuard<RawMutex, ()>> {
        self.0.try_lock_arc()
    }
}

impl fmt::Debug for SerializationLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializationLock")
            .field("locked", &self.is_locked())
            .finish()
    }
}

// ============================================================================
// State
// ============================================================================

/// Lifecycle state of a [`RuntimeHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    Uninitialized,
    Ready,
    Failed,
}

struct Ready<B: Backend> {
    root: B::Object,
    modules: IndexMap<String, B::Object>,
    // Dropped last: field order is drop order.
    _guard: ArcMutexGuard<RawMutex, ()>,
}

// ============================================================================
// RuntimeHandle
// ============================================================================

/// Owner of an embedded runtime.
///
/// Built with [`RuntimeHandle::builder`]. See the module docs for the
/// initialization sequence.
pub struct RuntimeHandle<B: Backend> {
    backend: B,
    config: RuntimeConfig,
    bootstrap: Box<dyn Bootstrap>,
    lock: SerializationLock,
    state: OnceCell<std::result::Result<Ready<B>, String>>,
}

impl<B: Backend> RuntimeHandle<B> {
    /// Start building a handle around `backend`.
    #[must_use]
    pub fn builder(backend: B) -> RuntimeHandleBuilder<B> {
        RuntimeHandleBuilder {
            backend,
            config: RuntimeConfig::default(),
            bootstrap: Box::new(NoRepair),
            lock: None,
        }
    }

    /// Get a token for the initialized runtime, initializing it first if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InitializationFailed`] if:
    /// - the serialization lock is held elsewhere (the handle stays
    ///   uninitialized and may be acquired again later)
    /// - the root module could not be imported even after repair (the
    ///   failure is cached)
    pub fn acquire(&self) -> Result<LockToken<'_, B>> {
        if self.state.get().is_none() {
            let guard = self.lock.try_acquire().ok_or_else(|| {
                warn!("Serialization lock is held by another runtime handle");
                BridgeError::InitializationFailed(
                    "serialization lock is held by another runtime handle".to_string(),
                )
            })?;
            self.state.get_or_init(|| self.initialize(guard));
        }

        match self.state.get() {
            Some(Ok(ready)) => Ok(LockToken {
                backend: &self.backend,
                root_module: &self.config.root_module,
                root: &ready.root,
                modules: &ready.modules,
                _not_send: PhantomData,
            }),
            Some(Err(msg)) => Err(BridgeError::InitializationFailed(msg.clone())),
            None => Err(BridgeError::InitializationFailed(
                "runtime state was not recorded".to_string(),
            )),
        }
    }

    /// Release the runtime: drop the root reference and the lock.
    ///
    /// Consumes the handle, so it can only happen once. Dropping the handle
    /// has the same effect.
    pub fn release(self) {
        drop(self);
    }

    pub fn state(&self) -> InitState {
        match self.state.get() {
            None => InitState::Uninitialized,
            Some(Ok(_)) => InitState::Ready,
            Some(Err(_)) => InitState::Failed,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == InitState::Ready
    }

    /// The cached failure message of a failed handle.
    pub fn failure(&self) -> Option<&str> {
        match self.state.get() {
            Some(Err(msg)) => Some(msg),
            _ => None,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn start_and_import(&self) -> std::result::Result<B::Object, String> {
        self.backend.start(&self.config)?;
        self.backend.import(&self.config.root_module)
    }

    fn initialize(
        &self,
        guard: ArcMutexGuard<RawMutex, ()>,
    ) -> std::result::Result<Ready<B>, String> {
        info!(
            backend = self.backend.name(),
            root = %self.config.root_module,
            "Initializing runtime"
        );

        let root = match self.start_and_import() {
            Ok(root) => root,
            Err(first) => {
                warn!(error = %first, "Root import failed, running repair");
                let repair = self.bootstrap.repair(&self.config);
                if let Err(e) = &repair {
                    warn!(error = %e, "Repair failed, retrying import anyway");
                }

                match self.start_and_import() {
                    Ok(root) => {
                        info!("Root import succeeded after repair");
                        root
                    }
                    Err(second) => {
                        let mut msg = format!("import of '{}' failed: {first}", self.config.root_module);
                        if let Err(e) = repair {
                            msg.push_str(&format!("; repair failed: {e}"));
                        }
                        msg.push_str(&format!("; retry failed: {second}"));
                        error!(error = %msg, "Runtime initialization failed");
                        return Err(msg);
                    }
                }
            }
        };

        let mut modules = IndexMap::new();
        for name in &self.config.optional_modules {
            match self.backend.import(name) {
                Ok(module) => {
                    debug!(module = %name, "Imported optional module");
                    modules.insert(name.clone(), module);
                }
                Err(e) => warn!(module = %name, error = %e, "Optional module unavailable"),
            }
        }

        info!(
            root = %self.config.root_module,
            optional = modules.len(),
            "Runtime ready"
        );

        Ok(Ready {
            root,
            modules,
            _guard: guard,
        })
    }
}

impl<B: Backend> Drop for RuntimeHandle<B> {
    fn drop(&mut self) {
        if let Some(Ok(_)) = self.state.get() {
            debug!(root = %self.config.root_module, "Releasing runtime");
        }
    }
}

impl<B: Backend> fmt::Debug for RuntimeHandle<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("backend", &self.backend.name())
            .field("root_module", &self.config.root_module)
            .field("state", &self.state())
            .finish()
    }
}

/// Builder for [`RuntimeHandle`].
pub struct RuntimeHandleBuilder<B: Backend> {
    backend: B,
    config: RuntimeConfig,
    bootstrap: Box<dyn Bootstrap>,
    lock: Option<SerializationLock>,
}

impl<B: Backend> RuntimeHandleBuilder<B> {
    #[must_use]
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// The repair strategy (default: [`NoRepair`]).
    #[must_use]
    pub fn bootstrap(mut self, bootstrap: impl Bootstrap + 'static) -> Self {
        self.bootstrap = Box::new(bootstrap);
        self
    }

    /// The lock to hold while ready (default: [`SerializationLock::global`]).
    #[must_use]
    pub fn lock(mut self, lock: SerializationLock) -> Self {
        self.lock = Some(lock);
        self
    }

    /// # Errors
    ///
    /// Returns [`BridgeError::InitializationFailed`] if the configuration does
    /// not validate.
    pub fn build(self) -> Result<RuntimeHandle<B>> {
        self.config.validate()?;
        Ok(RuntimeHandle {
            backend: self.backend,
            config: self.config,
            bootstrap: self.bootstrap,
            lock: self.lock.unwrap_or_else(SerializationLock::global),
            state: OnceCell::new(),
        })
    }
}

// ============================================================================
// LockToken
// ============================================================================

/// Evidence that the runtime is initialized and held by this thread.
///
/// Only [`RuntimeHandle::acquire`] creates tokens. A token is `Copy`, lives
/// no longer than the handle it came from, and cannot cross threads.
pub struct LockToken<'rt, B: Backend> {
    backend: &'rt B,
    root_module: &'rt str,
    root: &'rt B::Object,
    modules: &'rt IndexMap<String, B::Object>,
    _not_send: PhantomData<*const ()>,
}

impl<B: Backend> Clone for LockToken<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Backend> Copy for LockToken<'_, B> {}

impl<'rt, B: Backend> LockToken<'rt, B> {
    pub fn backend(&self) -> &'rt B {
        self.backend
    }

    /// Dotted name of the imported root module.
    pub fn root_module(&self) -> &'rt str {
        self.root_module
    }

    pub fn root(&self) -> &'rt B::Object {
        self.root
    }

    /// Raw object of an imported optional module.
    pub fn module_object(&self, name: &str) -> Option<&'rt B::Object> {
        self.modules.get(name)
    }

    /// Handle to an imported optional module.
    pub fn module(&self, name: &str) -> Option<ForeignHandle> {
        self.module_object(name)
            .map(|m| self.backend.wrap(m.clone()))
    }

    /// Names of the optional modules that imported successfully.
    pub fn modules(&self) -> impl Iterator<Item = &'rt str> {
        self.modules.keys().map(String::as_str)
    }

    /// Captured standard output; empty unless `capture_output` is on.
    pub fn captured_stdout(&self) -> String {
        self.backend.captured_output(OutputStream::Stdout)
    }

    /// Captured standard error; empty unless `capture_output` is on.
    pub fn captured_stderr(&self) -> String {
        self.backend.captured_output(OutputStream::Stderr)
    }
}

impl<B: Backend> fmt::Debug for LockToken<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockToken")
            .field("root_module", &self.root_module)
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, MemoryObject};
    use std::cell::Cell;
    use std::rc::Rc;

    static_assertions::assert_not_impl_any!(LockToken<'static, MemoryBackend>: Send, Sync);
    static_assertions::assert_not_impl_any!(RuntimeHandle<MemoryBackend>: Sync);
    static_assertions::assert_impl_all!(SerializationLock: Send, Sync, Clone);

    fn config() -> RuntimeConfig {
        RuntimeConfig::builder()
            .root_module("keras")
            .optional_modules(["numpy"])
            .build()
            .unwrap()
    }

    fn backend() -> MemoryBackend {
        MemoryBackend::new()
            .with_module("keras", MemoryObject::namespace("keras"))
            .with_module("numpy", MemoryObject::namespace("numpy"))
    }

    fn handle(backend: MemoryBackend) -> RuntimeHandle<MemoryBackend> {
        RuntimeHandle::builder(backend)
            .config(config())
            .lock(SerializationLock::new())
            .build()
            .unwrap()
    }

    #[test]
    fn test_acquire_twice_imports_once() {
        let runtime = handle(backend());
        assert_eq!(runtime.state(), InitState::Uninitialized);

        let first = runtime.acquire().unwrap();
        let second = runtime.acquire().unwrap();
        assert!(std::ptr::eq(first.root(), second.root()));
        assert_eq!(runtime.backend().import_count("keras"), 1);
        assert_eq!(runtime.state(), InitState::Ready);
    }

    #[test]
    fn test_optional_module_failure_is_ignored() {
        let backend = MemoryBackend::new().with_module("keras", MemoryObject::namespace("keras"));
        let runtime = handle(backend);
        let token = runtime.acquire().unwrap();
        assert!(token.module("numpy").is_none());
        assert_eq!(token.modules().count(), 0);
    }

    #[test]
    fn test_optional_module_available() {
        let runtime = handle(backend());
        let token = runtime.acquire().unwrap();
        assert_eq!(token.module("numpy").unwrap().label(), "numpy");
        assert_eq!(token.modules().collect::<Vec<_>>(), vec!["numpy"]);
    }

    #[test]
    fn test_repair_then_success() {
        let backend = backend();
        backend.fail_imports(1);
        let repairs = Rc::new(Cell::new(0));
        let counter = Rc::clone(&repairs);
        let runtime = RuntimeHandle::builder(backend)
            .config(config())
            .lock(SerializationLock::new())
            .bootstrap(move |_: &RuntimeConfig| {
                counter.set(counter.get() + 1);
                Ok::<(), String>(())
            })
            .build()
            .unwrap();

        assert!(runtime.acquire().is_ok());
        assert_eq!(repairs.get(), 1);
        assert_eq!(runtime.backend().import_count("keras"), 2);
        assert_eq!(runtime.backend().start_count(), 2);
    }

    #[test]
    fn test_failure_is_cached() {
        let backend = backend();
        backend.fail_imports(2);
        let lock = SerializationLock::new();
        let runtime = RuntimeHandle::builder(backend)
            .config(config())
            .lock(lock.clone())
            .build()
            .unwrap();

        let err = runtime.acquire().unwrap_err();
        assert!(err.is_fatal());
        let msg = err.to_string();
        assert!(msg.contains("repair failed"));
        assert!(msg.contains("retry failed"));
        assert_eq!(runtime.state(), InitState::Failed);
        assert!(!lock.is_locked());

        let again = runtime.acquire().unwrap_err();
        assert_eq!(again, err);
        assert_eq!(runtime.backend().import_count("keras"), 2);
        assert!(runtime.failure().is_some());
    }

    #[test]
    fn test_lock_contention_fails_without_repair() {
        let lock = SerializationLock::new();
        let holder = RuntimeHandle::builder(backend())
            .config(config())
            .lock(lock.clone())
            .build()
            .unwrap();
        holder.acquire().unwrap();
        assert!(lock.is_locked());

        let repairs = Rc::new(Cell::new(0));
        let counter = Rc::clone(&repairs);
        let contender = RuntimeHandle::builder(backend())
            .config(config())
            .lock(lock.clone())
            .bootstrap(move |_: &RuntimeConfig| {
                counter.set(counter.get() + 1);
                Ok::<(), String>(())
            })
            .build()
            .unwrap();

        let err = contender.acquire().unwrap_err();
        assert!(err.to_string().contains("serialization lock"));
        assert_eq!(repairs.get(), 0);
        assert_eq!(contender.state(), InitState::Uninitialized);
        assert_eq!(contender.backend().import_count("keras"), 0);

        holder.release();
        assert!(!lock.is_locked());
        assert!(contender.acquire().is_ok());
    }

    #[test]
    fn test_drop_releases_lock() {
        let lock = SerializationLock::new();
        {
            let runtime = RuntimeHandle::builder(backend())
                .config(config())
                .lock(lock.clone())
                .build()
                .unwrap();
            runtime.acquire().unwrap();
            assert!(lock.is_locked());
        }
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_invalid_config_rejected_at_build() {
        let mut bad = config();
        bad.root_module = "not valid".to_string();
        let err = RuntimeHandle::builder(backend())
            .config(bad)
            .build()
            .unwrap_err();
        assert!(err.is_fatal());
    }
}

//! keras-bridge: drive an embedded Keras runtime from Rust.
//!
//! This crate is a marshaling and invocation bridge. The models, training
//! loops and tensor math all live in an embedded Python interpreter running
//! `tensorflow.keras`; the bridge owns that interpreter's lifecycle, converts
//! Rust values into call arguments, dispatches calls against dotted attribute
//! paths, and decodes the (often tuple-shaped) results.
//!
//! # Features
//!
//! - **Explicit runtime context**: [`RuntimeHandle`] starts the runtime
//!   lazily, repairs it once if the import fails, and caches the outcome
//! - **Lock tokens**: every call goes through a [`LockToken`], which only
//!   exists while the process-wide lock is held and cannot leave its thread
//! - **Closed value set**: [`ForeignValue`] lists everything that can cross
//!   the boundary; anything else is an opaque [`ForeignHandle`]
//! - **One positional, then keywords**: [`ParameterSet`] realizes its first
//!   entry positionally and drops blank keywords
//! - **Tuple flattening**: [`flatten::flatten`] turns nested results into
//!   flat typed collections
//! - **Typed wrappers**: [`keras`] covers layers, `Sequential`, callbacks,
//!   datasets and numpy arrays
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use keras_bridge::keras::layers::Dense;
//! use keras_bridge::keras::models::{KerasModel, Sequential};
//! use keras_bridge::{InvocationDispatcher, ParameterSet, RuntimeConfig};
//!
//! let runtime = keras_bridge::python::runtime(RuntimeConfig::from_env()?)?;
//! let d = InvocationDispatcher::new(runtime.acquire()?);
//!
//! let model = Sequential::new(&d)?;
//! model.add(&d, &Dense::build(&d, Dense::params(64).with("activation", "relu"))?)?;
//! model.add(&d, &Dense::build(&d, Dense::params(10).with("activation", "softmax"))?)?;
//! model.compile(&d, ParameterSet::new().with("optimizer", "adam").with("loss", "categorical_crossentropy"))?;
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Rust Application                        │
//! │                                                              │
//! │  ParameterSet ──► InvocationDispatcher ──► ForeignValue      │
//! │                         ▲                    │               │
//! │            LockToken ───┘                    ▼               │
//! │                ▲                        flatten()            │
//! │          RuntimeHandle                                       │
//! └────────────────┬─────────────────────────────────────────────┘
//!                  │ Backend trait
//!        ┌─────────┴──────────┐
//!        ▼                    ▼
//!  PythonBackend        MemoryBackend
//!  (pyo3, CPython)      (scripted, for tests)
//! ```
//!
//! # Initialization
//!
//! Nothing starts until the first [`RuntimeHandle::acquire`]. That call
//! takes the serialization lock, starts the backend and imports the root
//! module. If the import fails, the configured [`Bootstrap`] gets exactly
//! one chance to repair the installation before a final retry. Success and
//! failure are both cached: a failed handle keeps returning
//! [`BridgeError::InitializationFailed`] without retrying.
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T>`](Result) with [`BridgeError`]:
//!
//! - [`BridgeError::InitializationFailed`] - the runtime could not be brought up
//! - [`BridgeError::AttributeNotFound`] - a path segment did not resolve
//! - [`BridgeError::UnsupportedType`] - a host type outside the value set
//! - [`BridgeError::ConversionError`] - a value of the wrong shape or kind
//! - [`BridgeError::ForeignInvocationError`] - the runtime raised
//!
//! # Thread Safety
//!
//! The runtime is single-threaded from the bridge's point of view. The
//! [`SerializationLock`] is held from initialization until the handle is
//! released or dropped, and [`LockToken`] is `!Send`, so calls cannot
//! migrate to another thread.
//!
//! # Modules
//!
//! - [`backend`] - the [`Backend`](backend::Backend) trait and the in-memory backend
//! - [`value`] - the value bridge
//! - [`flatten`] - nested tuple flattening
//! - [`keras`] - typed Keras wrappers
//! - [`python`] - the pyo3 backend (feature `python`)

pub mod backend;
mod bootstrap;
mod config;
mod dispatch;
mod error;
pub mod flatten;
pub mod keras;
mod params;
#[cfg(feature = "python")]
pub mod python;
mod runtime;
mod target;
pub mod value;

// Re-export public API
//
// Errors
pub use error::{BridgeError, Result};
// Configuration
pub use config::{DEFAULT_ROOT_MODULE, RuntimeConfig, RuntimeConfigBuilder};
// Runtime lifecycle
pub use bootstrap::{Bootstrap, NoRepair, PipBootstrap};
pub use runtime::{InitState, LockToken, RuntimeHandle, RuntimeHandleBuilder, SerializationLock};
// Calls
pub use dispatch::InvocationDispatcher;
pub use params::{ParameterSet, Realized};
pub use target::{CallKind, CallTarget, TargetRoot};
// Values
pub use value::{ForeignHandle, ForeignValue, FromForeign, Shape, Slice, ToForeign, ValueKind};

//! Dispatching calls against resolved attribute paths.
//!
//! The [`InvocationDispatcher`] turns a [`CallTarget`] and a [`ParameterSet`]
//! into one call in the embedded runtime. It can only be built from a
//! [`LockToken`], so every call it makes happens on an initialized runtime
//! under the serialization lock.
//!
//! # Call Convention
//!
//! | Parameter set | Runtime call |
//! |---------------|--------------|
//! | empty | `f()` |
//! | `{a}` | `f(a)` |
//! | `{a, k1, k2}` | `f(a, k1=..., k2=...)`, blank keywords dropped |
//!
//! Errors raised by the runtime come back verbatim as
//! [`BridgeError::ForeignInvocationError`].

use tracing::debug;

use crate::backend::{Backend, CallArgs};
use crate::error::{BridgeError, Result};
use crate::params::{ParameterSet, Realized};
use crate::runtime::LockToken;
use crate::target::{CallTarget, TargetRoot};
use crate::value::{ForeignHandle, ForeignValue, ToForeign};

/// Issues calls through a [`LockToken`].
#[derive(Debug)]
pub struct InvocationDispatcher<'rt, B: Backend> {
    token: LockToken<'rt, B>,
}

impl<B: Backend> Clone for InvocationDispatcher<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Backend> Copy for InvocationDispatcher<'_, B> {}

impl<'rt, B: Backend> InvocationDispatcher<'rt, B> {
    pub fn new(token: LockToken<'rt, B>) -> Self {
        Self { token }
    }

    pub fn token(&self) -> LockToken<'rt, B> {
        self.token
    }

    /// Walk `target` down to the object it names.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::AttributeNotFound`] naming the first segment
    /// that did not resolve, or the optional module name when an import root
    /// was never imported.
    pub fn resolve(&self, target: &CallTarget) -> Result<B::Object> {
        let backend = self.token.backend();
        let path = || target.display_path(self.token.root_module());

        let mut current = match &target.root {
            TargetRoot::Module => self.token.root().clone(),
            TargetRoot::Import(name) => self
                .token
                .module_object(name)
                .cloned()
                .ok_or_else(|| BridgeError::AttributeNotFound {
                    segment: name.clone(),
                    path: path(),
                })?,
            TargetRoot::Handle(handle) => backend.unwrap(handle)?,
        };

        for segment in target.segments() {
            current = backend
                .getattr(&current, segment)?
                .ok_or_else(|| BridgeError::AttributeNotFound {
                    segment: segment.to_string(),
                    path: path(),
                })?;
        }

        Ok(current)
    }

    /// Call `target` and decode the result.
    ///
    /// # Errors
    ///
    /// Resolution, conversion and runtime errors propagate unchanged.
    pub fn invoke_static(&self, target: &CallTarget, params: &ParameterSet) -> Result<ForeignValue> {
        let raw = self.invoke_raw(target, params)?;
        self.token.backend().decode(&raw)
    }

    /// Call `target` and keep the result as an opaque handle.
    ///
    /// Used for constructors, whose results are runtime objects the host
    /// only passes back in later calls.
    pub fn invoke_constructor(
        &self,
        target: &CallTarget,
        params: &ParameterSet,
    ) -> Result<ForeignHandle> {
        let raw = self.invoke_raw(target, params)?;
        Ok(self.token.backend().wrap(raw))
    }

    /// Resolve `target` without calling it and decode what it names.
    pub fn get_attribute(&self, target: &CallTarget) -> Result<ForeignValue> {
        let object = self.resolve(target)?;
        self.token.backend().decode(&object)
    }

    /// Resolve `target` without calling it and keep it as a handle.
    pub fn get_handle(&self, target: &CallTarget) -> Result<ForeignHandle> {
        let object = self.resolve(target)?;
        Ok(self.token.backend().wrap(object))
    }

    /// Set `name` on the object behind `handle`.
    pub fn set_attribute(
        &self,
        handle: &ForeignHandle,
        name: &str,
        value: &dyn ToForeign,
    ) -> Result<()> {
        let backend = self.token.backend();
        let object = backend.unwrap(handle)?;
        let value = backend.encode(&value.to_foreign()?)?;
        debug!(object = handle.label(), attribute = name, "Setting attribute");
        backend.setattr(&object, name, &value)
    }

    fn invoke_raw(&self, target: &CallTarget, params: &ParameterSet) -> Result<B::Object> {
        let callee = self.resolve(target)?;
        let args = self.encode_args(params.realize()?)?;

        debug!(
            path = %target.display_path(self.token.root_module()),
            positional = usize::from(!args.is_empty()),
            keywords = args.keyword_count(),
            "Dispatching call"
        );

        self.token.backend().call(&callee, args)
    }

    fn encode_args(&self, realized: Realized) -> Result<CallArgs<B::Object>> {
        let backend = self.token.backend();
        let Some(positional) = realized.positional else {
            return Ok(CallArgs::Empty);
        };

        let keywords = realized
            .keywords
            .iter()
            .map(|(name, value)| Ok((name.clone(), backend.encode(value)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(CallArgs::Positional {
            positional: backend.encode(&positional)?,
            keywords,
        })
    }
}

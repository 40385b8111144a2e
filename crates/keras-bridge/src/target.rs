//! Typed call targets.
//!
//! A [`CallTarget`] names what the dispatcher should resolve: a root (the
//! runtime's root module, one of the optional modules, or a handle), a list of
//! attribute segments below it, and whether the resolved object is called
//! directly or has a method called on it.
//!
//! ```
//! use keras_bridge::CallTarget;
//!
//! let dense = CallTarget::module("layers.Dense");
//! assert_eq!(dense.path, vec!["layers", "Dense"]);
//!
//! let reshape = CallTarget::import("numpy", "array").method("reshape");
//! assert_eq!(reshape.display_path("tensorflow.keras"), "numpy.array.reshape");
//! ```

use std::fmt;

use crate::value::ForeignHandle;

/// Where attribute resolution starts.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetRoot {
    /// The configured root module.
    Module,
    /// An optional module imported at initialization, by name.
    Import(String),
    /// An object previously returned by the runtime.
    Handle(ForeignHandle),
}

/// How the resolved object is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallKind {
    /// Call the resolved object itself.
    Callable,
    /// Look up the named method on the resolved object and call that.
    Method(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallTarget {
    pub root: TargetRoot,
    pub path: Vec<String>,
    pub kind: CallKind,
}

fn split_path(path: &str) -> Vec<String> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl CallTarget {
    pub fn new(root: TargetRoot, path: Vec<String>, kind: CallKind) -> Self {
        Self { root, path, kind }
    }

    /// A dotted path below the root module. An empty path names the root.
    pub fn module(path: &str) -> Self {
        Self::new(TargetRoot::Module, split_path(path), CallKind::Callable)
    }

    /// A dotted path below an optional module.
    pub fn import(module: impl Into<String>, path: &str) -> Self {
        Self::new(
            TargetRoot::Import(module.into()),
            split_path(path),
            CallKind::Callable,
        )
    }

    /// A dotted path below a handle.
    pub fn on(handle: &ForeignHandle, path: &str) -> Self {
        Self::new(
            TargetRoot::Handle(handle.clone()),
            split_path(path),
            CallKind::Callable,
        )
    }

    /// A method called directly on a handle.
    pub fn method_of(handle: &ForeignHandle, method: impl Into<String>) -> Self {
        Self::on(handle, "").method(method)
    }

    /// Turn the target into a method call on the resolved object.
    #[must_use]
    pub fn method(mut self, name: impl Into<String>) -> Self {
        self.kind = CallKind::Method(name.into());
        self
    }

    /// Every segment resolution walks, including the method name.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        let method = match &self.kind {
            CallKind::Method(name) => Some(name.as_str()),
            CallKind::Callable => None,
        };
        self.path.iter().map(String::as_str).chain(method)
    }

    /// The dotted path used in logs and errors.
    pub fn display_path(&self, root_module: &str) -> String {
        let root = match &self.root {
            TargetRoot::Module => root_module,
            TargetRoot::Import(name) => name.as_str(),
            TargetRoot::Handle(h) => h.label(),
        };
        std::iter::once(root)
            .chain(self.segments())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for CallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_path("<root>"))
    }
}

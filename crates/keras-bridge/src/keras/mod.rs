//! Thin typed wrappers over the Keras API.
//!
//! Each wrapper owns a [`ForeignHandle`] and turns its methods into
//! [`InvocationDispatcher`](crate::InvocationDispatcher) calls. Nothing here
//! computes anything; training, inference and file I/O all happen in the
//! runtime. Wrappers convert into [`ForeignValue::Handle`], so they can be
//! placed directly in a [`ParameterSet`](crate::ParameterSet).
//!
//! ```rust,ignore
//! use keras_bridge::keras::{layers::Dense, models::{KerasModel, Sequential}};
//!
//! let model = Sequential::new(&dispatcher)?;
//! model.add(&dispatcher, &Dense::new(&dispatcher, 64)?)?;
//! model.compile(&dispatcher, ParameterSet::new().with("optimizer", "adam"))?;
//! ```

pub mod callbacks;
pub mod datasets;
pub mod layers;
pub mod models;
pub mod ndarray;
pub mod utils;

use crate::value::ForeignHandle;

pub use ndarray::NdArray;

/// A typed view over a runtime object.
pub trait HandleWrapper {
    fn handle(&self) -> &ForeignHandle;

    /// Wrap a handle without checking what it refers to.
    fn from_handle(handle: ForeignHandle) -> Self
    where
        Self: Sized;
}

/// Declares a handle wrapper struct with its conversions.
macro_rules! handle_wrapper {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            handle: $crate::value::ForeignHandle,
        }

        impl $crate::keras::HandleWrapper for $name {
            fn handle(&self) -> &$crate::value::ForeignHandle {
                &self.handle
            }

            fn from_handle(handle: $crate::value::ForeignHandle) -> Self {
                Self { handle }
            }
        }

        impl $crate::value::ToForeign for $name {
            fn to_foreign(&self) -> $crate::error::Result<$crate::value::ForeignValue> {
                Ok($crate::value::ForeignValue::Handle(self.handle.clone()))
            }
        }

        impl $crate::value::FromForeign for $name {
            fn from_foreign(value: &$crate::value::ForeignValue) -> $crate::error::Result<Self> {
                <$crate::value::ForeignHandle as $crate::value::FromForeign>::from_foreign(value)
                    .map(|handle| Self { handle })
            }
        }
    };
}

pub(crate) use handle_wrapper;

//! Core layers.
//!
//! Every layer is built from a [`ParameterSet`] whose first entry is the
//! layer's primary argument (`units` for [`Dense`], `rate` for [`Dropout`],
//! ...). `new` covers the common case; `build` takes the full set.
//!
//! ```rust,ignore
//! let hidden = Dense::build(&d, Dense::params(64).with("activation", "relu"))?;
//! let out = Dense::build(&d, Dense::params(10).with("activation", "softmax"))?;
//! ```

use super::{HandleWrapper, handle_wrapper};
use crate::backend::Backend;
use crate::dispatch::InvocationDispatcher;
use crate::error::Result;
use crate::params::ParameterSet;
use crate::target::CallTarget;
use crate::value::Shape;

/// Generates the shared constructors of a layer.
macro_rules! layer {
    ($(#[$meta:meta])* $name:ident, $primary:literal: $ty:ty) => {
        handle_wrapper! {
            $(#[$meta])*
            $name
        }

        impl $name {
            /// Path below the root module.
            pub const PATH: &'static str = concat!("layers.", stringify!($name));

            /// A parameter set holding only the primary argument.
            pub fn params(value: $ty) -> ParameterSet {
                ParameterSet::new().with($primary, value)
            }

            pub fn new<B: Backend>(d: &InvocationDispatcher<'_, B>, value: $ty) -> Result<Self> {
                Self::build(d, Self::params(value))
            }

            /// Construct the layer from `params`, first entry positional.
            pub fn build<B: Backend>(
                d: &InvocationDispatcher<'_, B>,
                params: ParameterSet,
            ) -> Result<Self> {
                d.invoke_constructor(&CallTarget::module(Self::PATH), &params)
                    .map(Self::from_handle)
            }
        }
    };
}

layer! {
    /// Densely connected layer.
    Dense, "units": usize
}

layer! {
    /// Randomly zeroes a fraction of its inputs during training.
    Dropout, "rate": f64
}

layer! {
    /// Flattens its input, keeping the batch dimension.
    Flatten, "data_format": String
}

layer! {
    /// A symbolic input tensor of the given shape (batch dimension excluded).
    Input, "shape": Shape
}

layer! {
    /// Applies an activation function by name.
    Activation, "activation": String
}

impl Flatten {
    /// `Flatten` in the default `channels_last` layout.
    pub fn channels_last<B: Backend>(d: &InvocationDispatcher<'_, B>) -> Result<Self> {
        Self::new(d, "channels_last".to_string())
    }
}

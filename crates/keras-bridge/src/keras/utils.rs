//! `keras.utils` helpers.

use super::{HandleWrapper, NdArray};
use crate::backend::Backend;
use crate::dispatch::InvocationDispatcher;
use crate::error::Result;
use crate::params::ParameterSet;
use crate::target::CallTarget;

/// One-hot encode integer class labels.
///
/// With `num_classes` unset the runtime infers it from the largest label.
pub fn to_categorical<B: Backend>(
    d: &InvocationDispatcher<'_, B>,
    labels: &NdArray,
    num_classes: Option<usize>,
) -> Result<NdArray> {
    let params = ParameterSet::new()
        .with("y", labels.clone())
        .with("num_classes", num_classes);
    d.invoke_constructor(&CallTarget::module("utils.to_categorical"), &params)
        .map(NdArray::from_handle)
}

//! Built-in datasets.
//!
//! Every `keras.datasets.<name>.load_data` returns
//! `((x_train, y_train), (x_test, y_test))`; [`load_data`] flattens that into
//! its four arrays and regroups them.

use tracing::debug;

use super::{HandleWrapper, NdArray};
use crate::backend::Backend;
use crate::dispatch::InvocationDispatcher;
use crate::error::{BridgeError, Result};
use crate::flatten::flatten;
use crate::params::ParameterSet;
use crate::target::CallTarget;
use crate::value::ForeignHandle;

/// Datasets shipped with Keras.
pub const BUILTIN: &[&str] = &[
    "boston_housing",
    "cifar10",
    "cifar100",
    "fashion_mnist",
    "imdb",
    "mnist",
    "reuters",
];

/// `((x_train, y_train), (x_test, y_test))`.
pub type Split = ((NdArray, NdArray), (NdArray, NdArray));

/// Load dataset `name`, passing `params` to its `load_data`.
///
/// # Errors
///
/// [`BridgeError::AttributeNotFound`] for an unknown dataset, and
/// [`BridgeError::ConversionError`] if the result does not hold exactly four
/// arrays.
pub fn load_data<B: Backend>(
    d: &InvocationDispatcher<'_, B>,
    name: &str,
    params: &ParameterSet,
) -> Result<Split> {
    if name.is_empty() || name.contains('.') {
        return Err(BridgeError::AttributeNotFound {
            segment: name.to_string(),
            path: format!("datasets.{name}"),
        });
    }

    let target = CallTarget::module(&format!("datasets.{name}.load_data"));
    let result = d.invoke_static(&target, params)?;
    let arrays = flatten::<ForeignHandle>(&result)?;
    debug!(dataset = name, arrays = arrays.len(), "Loaded dataset");

    let ((x_train, y_train), (x_test, y_test)) = arrays.into_pairs()?;
    Ok((
        (NdArray::from_handle(x_train), NdArray::from_handle(y_train)),
        (NdArray::from_handle(x_test), NdArray::from_handle(y_test)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keras::fixture;
    use crate::value::Shape;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_load_mnist_split() {
        let rt = fixture::runtime();
        let d = InvocationDispatcher::new(rt.acquire().unwrap());
        let ((x_train, y_train), (x_test, _)) = load_data(&d, "mnist", &ParameterSet::new()).unwrap();
        assert_eq!(x_train.shape(&d).unwrap(), Shape::known(&[6]));
        assert_eq!(y_train.shape(&d).unwrap(), Shape::known(&[6]));
        assert_eq!(x_test.shape(&d).unwrap(), Shape::known(&[2]));
    }

    #[test]
    fn test_unknown_dataset() {
        let rt = fixture::runtime();
        let d = InvocationDispatcher::new(rt.acquire().unwrap());
        let err = load_data(&d, "cifar10", &ParameterSet::new()).unwrap_err();
        assert!(matches!(err, BridgeError::AttributeNotFound { segment, .. } if segment == "cifar10"));

        let err = load_data(&d, "mnist.load_data", &ParameterSet::new()).unwrap_err();
        assert!(matches!(err, BridgeError::AttributeNotFound { .. }));
    }

    #[test]
    fn test_builtin_list_sorted() {
        let mut sorted = BUILTIN.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, BUILTIN);
    }
}

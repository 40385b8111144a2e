//! numpy arrays as opaque handles.
//!
//! Array data stays in the runtime. [`NdArray::from_vec`] and
//! [`NdArray::to_vec`] copy through the value bridge and are meant for small
//! inputs and results, not for moving datasets around.

use super::{HandleWrapper, handle_wrapper};
use crate::backend::Backend;
use crate::dispatch::InvocationDispatcher;
use crate::error::{BridgeError, Result};
use crate::params::ParameterSet;
use crate::target::CallTarget;
use crate::value::{ForeignValue, FromForeign, Shape, ToForeign};

handle_wrapper! {
    /// A `numpy.ndarray` (or anything array-like the runtime returned).
    NdArray
}

impl NdArray {
    /// Build an array from flat `data` and reshape it.
    ///
    /// A `None` dimension becomes `-1`, letting numpy infer it.
    ///
    /// # Errors
    ///
    /// Fails with [`BridgeError::AttributeNotFound`] when numpy is not among
    /// the imported modules, and with the runtime's own error when `data`
    /// does not fit `shape`.
    pub fn from_vec<B, T>(d: &InvocationDispatcher<'_, B>, data: Vec<T>, shape: &Shape) -> Result<Self>
    where
        B: Backend,
        T: ToForeign + Send + Sync + 'static,
    {
        let flat = d.invoke_constructor(
            &CallTarget::import("numpy", "array"),
            &ParameterSet::new().with("object", data),
        )?;

        let dims = shape
            .dims()
            .iter()
            .map(|dim| dim.map_or(Ok(-1), i64::try_from).map(ForeignValue::Int))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| BridgeError::conversion("dimension within i64 range", shape.to_string()))?;
        let shaped = d.invoke_constructor(
            &CallTarget::method_of(&flat, "reshape"),
            &ParameterSet::new().with("shape", ForeignValue::Tuple(dims)),
        )?;
        Ok(Self::from_handle(shaped))
    }

    pub fn shape<B: Backend>(&self, d: &InvocationDispatcher<'_, B>) -> Result<Shape> {
        let value = d.get_attribute(&CallTarget::on(&self.handle, "shape"))?;
        Shape::from_foreign(&value)
    }

    /// Copy the elements out in row-major order.
    pub fn to_vec<B, T>(&self, d: &InvocationDispatcher<'_, B>) -> Result<Vec<T>>
    where
        B: Backend,
        T: FromForeign,
    {
        let flat = d.invoke_constructor(&CallTarget::method_of(&self.handle, "ravel"), &ParameterSet::new())?;
        let list = d.invoke_static(&CallTarget::method_of(&flat, "tolist"), &ParameterSet::new())?;
        Vec::<T>::from_foreign(&list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keras::fixture;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_vec_reshapes() {
        let rt = fixture::runtime();
        let d = InvocationDispatcher::new(rt.acquire().unwrap());
        let arr = NdArray::from_vec(&d, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &Shape::new([None, Some(3)])).unwrap();
        assert_eq!(arr.shape(&d).unwrap(), Shape::known(&[2, 3]));

        let (name, record) = rt.backend().last_call().unwrap();
        assert_eq!(name, "reshape");
        assert_eq!(
            record.positional,
            Some(ForeignValue::Tuple(vec![ForeignValue::Int(-1), ForeignValue::Int(3)]))
        );
    }

    #[test]
    fn test_to_vec_reads_flat_elements() {
        let rt = fixture::runtime();
        let d = InvocationDispatcher::new(rt.acquire().unwrap());
        let arr = NdArray::from_vec(&d, vec![1_i64, 2, 3, 4], &Shape::known(&[2, 2])).unwrap();
        assert_eq!(arr.to_vec::<_, i64>(&d).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(arr.to_vec::<_, f64>(&d).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_bad_shape_is_foreign_error() {
        let rt = fixture::runtime();
        let d = InvocationDispatcher::new(rt.acquire().unwrap());
        let err = NdArray::from_vec(&d, vec![1, 2, 3], &Shape::known(&[2, 2])).unwrap_err();
        assert!(matches!(err, BridgeError::ForeignInvocationError(msg) if msg.contains("reshape")));
    }
}

//! The value bridge: every value that may cross into the embedded runtime.
//!
//! Values cross the boundary as a [`ForeignValue`], a closed tagged union.
//! Host types opt in through [`ToForeign`] and come back out through
//! [`FromForeign`]. Anything outside the closed set is rejected with
//! [`BridgeError::UnsupportedType`] by [`to_foreign_any`], which is the
//! runtime-typed entry point used when the static type is erased.
//!
//! # Supported Types
//!
//! | Host type | Foreign value |
//! |-----------|---------------|
//! | `bool` | `Bool` |
//! | `i8`..`i64`, `u8`..`u64`, `isize`, `usize` | `Int` (values outside `i64` fail) |
//! | `f32`, `f64` | `Float` |
//! | `str`, `String` | `Str` |
//! | `Option<T>` | `None` or the inner value |
//! | `Vec<T>`, `[T]`, `[T; N]` | `Array` |
//! | tuples of 1 to 4 elements | `Tuple` |
//! | [`Shape`] | `Tuple` of `Int` / `None` |
//! | [`Slice`] | `Slice` |
//! | [`ForeignHandle`] and handle wrappers | `Handle` |
//!
//! # Round-trip Law
//!
//! For scalars, arrays and shapes, `T::from_foreign(&v.to_foreign()?)` returns
//! a value equal to `v`.
//!
//! ```
//! use keras_bridge::value::{FromForeign, Shape, ToForeign};
//!
//! let shape = Shape::new([None, Some(28), Some(28)]);
//! let foreign = shape.to_foreign().unwrap();
//! assert_eq!(Shape::from_foreign(&foreign).unwrap(), shape);
//! assert_eq!(shape.to_string(), "(None, 28, 28)");
//! ```

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

// ============================================================================
// ValueKind
// ============================================================================

/// The variant tag of a [`ForeignValue`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    None,
    Bool,
    Int,
    Float,
    Str,
    Array,
    Tuple,
    Slice,
    Handle,
}

impl ValueKind {
    /// Lowercase name used in error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::None => "none",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "str",
            ValueKind::Array => "array",
            ValueKind::Tuple => "tuple",
            ValueKind::Slice => "slice",
            ValueKind::Handle => "handle",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ForeignHandle
// ============================================================================

/// Opaque reference to an object living inside the embedded runtime.
///
/// Handles are cheap to clone (an [`Arc`] bump) and are `Send + Sync`, so they
/// can be stored anywhere. Using one still requires a
/// [`LockToken`](crate::LockToken). Two handles are equal only when they
/// point at the same wrapped object.
///
/// The wrapped object is whatever the producing backend stores; a handle
/// presented to a different backend fails to unwrap with
/// [`BridgeError::ConversionError`].
#[derive(Clone)]
pub struct ForeignHandle {
    inner: Arc<dyn Any + Send + Sync>,
    label: Arc<str>,
}

impl ForeignHandle {
    /// Wrap a backend object. `label` is the foreign type name shown in
    /// diagnostics.
    pub fn new<T: Any + Send + Sync>(object: T, label: impl Into<Arc<str>>) -> Self {
        Self::from_arc(Arc::new(object), label)
    }

    /// Wrap an already shared object. Handles built from clones of the same
    /// `Arc` compare equal.
    pub fn from_arc<T: Any + Send + Sync>(object: Arc<T>, label: impl Into<Arc<str>>) -> Self {
        Self {
            inner: object,
            label: label.into(),
        }
    }

    /// The foreign type name recorded when the handle was created.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Borrow the wrapped object if it has type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Recover the shared object if it has type `T`.
    pub fn downcast_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.inner).downcast::<T>().ok()
    }

    /// Identity comparison.
    pub fn same_object(&self, other: &ForeignHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for ForeignHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same_object(other)
    }
}

impl fmt::Debug for ForeignHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ForeignHandle").field(&self.label).finish()
    }
}

// ============================================================================
// Shape and Slice
// ============================================================================

/// Tensor dimensions. `None` marks an unknown dimension (usually the batch).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Shape(Vec<Option<usize>>);

impl Shape {
    pub fn new(dims: impl IntoIterator<Item = Option<usize>>) -> Self {
        Self(dims.into_iter().collect())
    }

    /// A shape whose every dimension is known.
    pub fn known(dims: &[usize]) -> Self {
        Self(dims.iter().copied().map(Some).collect())
    }

    pub fn dims(&self) -> &[Option<usize>] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Product of all dimensions, or `None` if any is unknown.
    pub fn element_count(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, d| d.map(|d| acc * d))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, dim) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match dim {
                Some(d) => write!(f, "{d}")?,
                None => f.write_str("None")?,
            }
        }
        if self.0.len() == 1 {
            f.write_str(",")?;
        }
        f.write_str(")")
    }
}

/// Half-open index range with an optional step, crossing as the runtime's
/// native slice object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Slice {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl Slice {
    pub fn new(start: Option<i64>, stop: Option<i64>) -> Self {
        Self {
            start,
            stop,
            step: None,
        }
    }

    /// The `[:]` slice.
    pub fn full() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_step(mut self, step: i64) -> Self {
        self.step = Some(step);
        self
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |v: Option<i64>| v.map(|v| v.to_string()).unwrap_or_default();
        write!(f, "{}:{}", part(self.start), part(self.stop))?;
        if let Some(step) = self.step {
            write!(f, ":{step}")?;
        }
        Ok(())
    }
}

// ============================================================================
// ForeignValue
// ============================================================================

/// Every value shape that may cross the boundary.
///
/// `Array` is homogeneous: all non-`None` elements share a [`ValueKind`].
/// `Tuple` may mix kinds. Backends reject a heterogeneous `Array` when
/// encoding it.
#[derive(Debug, Clone, PartialEq)]
pub enum ForeignValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<ForeignValue>),
    Tuple(Vec<ForeignValue>),
    Slice(Slice),
    Handle(ForeignHandle),
}

impl ForeignValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ForeignValue::None => ValueKind::None,
            ForeignValue::Bool(_) => ValueKind::Bool,
            ForeignValue::Int(_) => ValueKind::Int,
            ForeignValue::Float(_) => ValueKind::Float,
            ForeignValue::Str(_) => ValueKind::Str,
            ForeignValue::Array(_) => ValueKind::Array,
            ForeignValue::Tuple(_) => ValueKind::Tuple,
            ForeignValue::Slice(_) => ValueKind::Slice,
            ForeignValue::Handle(_) => ValueKind::Handle,
        }
    }

    /// Name of the variant, or the foreign type label for handles.
    pub fn type_name(&self) -> &str {
        match self {
            ForeignValue::Handle(h) => h.label(),
            other => other.kind().as_str(),
        }
    }

    /// True for `None` and for strings that are empty or all whitespace.
    ///
    /// This is the test [`ParameterSet`](crate::ParameterSet) uses to drop
    /// keyword arguments.
    pub fn is_blank(&self) -> bool {
        match self {
            ForeignValue::None => true,
            ForeignValue::Str(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ForeignValue::None)
    }

    pub fn as_handle(&self) -> Option<&ForeignHandle> {
        match self {
            ForeignValue::Handle(h) => Some(h),
            _ => None,
        }
    }

    /// The shared kind of a sequence's non-`None` elements.
    ///
    /// Returns `Ok(None)` when the sequence has no non-`None` element and a
    /// [`BridgeError::ConversionError`] when two elements disagree.
    pub fn element_kind(items: &[ForeignValue]) -> Result<Option<ValueKind>> {
        let mut seen: Option<ValueKind> = None;
        for item in items.iter().filter(|v| !v.is_none()) {
            match seen {
                None => seen = Some(item.kind()),
                Some(kind) if kind == item.kind() => {}
                Some(kind) => {
                    return Err(BridgeError::conversion(
                        format!("homogeneous array of {kind}"),
                        format!("element of kind {}", item.kind()),
                    ));
                }
            }
        }
        Ok(seen)
    }

    /// Build an `Array` when the items agree on a kind, else a `Tuple`.
    ///
    /// Used by backends decoding the runtime's untyped lists.
    pub fn sequence(items: Vec<ForeignValue>) -> ForeignValue {
        match Self::element_kind(&items) {
            Ok(_) => ForeignValue::Array(items),
            Err(_) => ForeignValue::Tuple(items),
        }
    }

    /// Convert a JSON document into a foreign value.
    ///
    /// Arrays become `Array` when homogeneous and `Tuple` otherwise. The only
    /// accepted object is the `{"$slice": [start, stop, step]}` form produced
    /// by [`to_json`](Self::to_json); any other object fails with
    /// [`BridgeError::UnsupportedType`].
    pub fn from_json(value: &serde_json::Value) -> Result<ForeignValue> {
        use serde_json::Value;
        match value {
            Value::Null => Ok(ForeignValue::None),
            Value::Bool(b) => Ok(ForeignValue::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(ForeignValue::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(ForeignValue::Float(f))
                } else {
                    Err(BridgeError::conversion("number", n.to_string()))
                }
            }
            Value::String(s) => Ok(ForeignValue::Str(s.clone())),
            Value::Array(items) => {
                let items = items
                    .iter()
                    .map(ForeignValue::from_json)
                    .collect::<Result<Vec<_>>>()?;
                Ok(ForeignValue::sequence(items))
            }
            Value::Object(map) => match (map.len(), map.get("$slice")) {
                (1, Some(Value::Array(parts))) if parts.len() == 3 => {
                    let bound = |v: &Value| -> Result<Option<i64>> {
                        match v {
                            Value::Null => Ok(None),
                            other => other
                                .as_i64()
                                .map(Some)
                                .ok_or_else(|| BridgeError::conversion("slice bound", other.to_string())),
                        }
                    };
                    Ok(ForeignValue::Slice(Slice {
                        start: bound(&parts[0])?,
                        stop: bound(&parts[1])?,
                        step: bound(&parts[2])?,
                    }))
                }
                _ => Err(BridgeError::UnsupportedType("object".to_string())),
            },
        }
    }

    /// Render as JSON. Non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::{Value, json};
        match self {
            ForeignValue::None => Value::Null,
            ForeignValue::Bool(b) => Value::Bool(*b),
            ForeignValue::Int(i) => Value::Number((*i).into()),
            ForeignValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ForeignValue::Str(s) => Value::String(s.clone()),
            ForeignValue::Array(items) | ForeignValue::Tuple(items) => {
                Value::Array(items.iter().map(ForeignValue::to_json).collect())
            }
            ForeignValue::Slice(s) => json!({ "$slice": [s.start, s.stop, s.step] }),
            ForeignValue::Handle(h) => json!({ "$handle": h.label() }),
        }
    }
}

impl Serialize for ForeignValue {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl fmt::Display for ForeignValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, items: &[ForeignValue]) -> fmt::Result {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{item}")?;
            }
            Ok(())
        }

        match self {
            ForeignValue::None => f.write_str("None"),
            ForeignValue::Bool(true) => f.write_str("True"),
            ForeignValue::Bool(false) => f.write_str("False"),
            ForeignValue::Int(i) => write!(f, "{i}"),
            ForeignValue::Float(x) => write!(f, "{x:?}"),
            ForeignValue::Str(s) => write!(f, "'{s}'"),
            ForeignValue::Array(items) => {
                f.write_str("[")?;
                join(f, items)?;
                f.write_str("]")
            }
            ForeignValue::Tuple(items) => {
                f.write_str("(")?;
                join(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            ForeignValue::Slice(s) => write!(f, "slice({s})"),
            ForeignValue::Handle(h) => write!(f, "<{}>", h.label()),
        }
    }
}

// ============================================================================
// ToForeign
// ============================================================================

/// Conversion of a host value into a [`ForeignValue`].
pub trait ToForeign {
    fn to_foreign(&self) -> Result<ForeignValue>;
}

impl ToForeign for bool {
    fn to_foreign(&self) -> Result<ForeignValue> {
        Ok(ForeignValue::Bool(*self))
    }
}

macro_rules! to_foreign_int {
    ($($t:ty),*) => {$(
        impl ToForeign for $t {
            fn to_foreign(&self) -> Result<ForeignValue> {
                i64::try_from(*self)
                    .map(ForeignValue::Int)
                    .map_err(|_| BridgeError::conversion("integer within i64 range", self.to_string()))
            }
        }
    )*};
}

to_foreign_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl ToForeign for f32 {
    fn to_foreign(&self) -> Result<ForeignValue> {
        Ok(ForeignValue::Float(f64::from(*self)))
    }
}

impl ToForeign for f64 {
    fn to_foreign(&self) -> Result<ForeignValue> {
        Ok(ForeignValue::Float(*self))
    }
}

impl ToForeign for str {
    fn to_foreign(&self) -> Result<ForeignValue> {
        Ok(ForeignValue::Str(self.to_string()))
    }
}

impl ToForeign for String {
    fn to_foreign(&self) -> Result<ForeignValue> {
        Ok(ForeignValue::Str(self.clone()))
    }
}

impl<T: ToForeign + ?Sized> ToForeign for &T {
    fn to_foreign(&self) -> Result<ForeignValue> {
        (**self).to_foreign()
    }
}

impl<T: ToForeign> ToForeign for Option<T> {
    fn to_foreign(&self) -> Result<ForeignValue> {
        match self {
            Some(v) => v.to_foreign(),
            None => Ok(ForeignValue::None),
        }
    }
}

impl<T: ToForeign> ToForeign for [T] {
    fn to_foreign(&self) -> Result<ForeignValue> {
        let items = self
            .iter()
            .map(ToForeign::to_foreign)
            .collect::<Result<Vec<_>>>()?;
        ForeignValue::element_kind(&items)?;
        Ok(ForeignValue::Array(items))
    }
}

impl<T: ToForeign> ToForeign for Vec<T> {
    fn to_foreign(&self) -> Result<ForeignValue> {
        self.as_slice().to_foreign()
    }
}

impl<T: ToForeign, const N: usize> ToForeign for [T; N] {
    fn to_foreign(&self) -> Result<ForeignValue> {
        self.as_slice().to_foreign()
    }
}

macro_rules! to_foreign_tuple {
    ($($name:ident),+) => {
        impl<$($name: ToForeign),+> ToForeign for ($($name,)+) {
            #[allow(non_snake_case)]
            fn to_foreign(&self) -> Result<ForeignValue> {
                let ($($name,)+) = self;
                Ok(ForeignValue::Tuple(vec![$($name.to_foreign()?),+]))
            }
        }
    };
}

to_foreign_tuple!(A);
to_foreign_tuple!(A, B);
to_foreign_tuple!(A, B, C);
to_foreign_tuple!(A, B, C, D);

impl ToForeign for Shape {
    fn to_foreign(&self) -> Result<ForeignValue> {
        self.0
            .iter()
            .map(|d| d.to_foreign())
            .collect::<Result<Vec<_>>>()
            .map(ForeignValue::Tuple)
    }
}

impl ToForeign for Slice {
    fn to_foreign(&self) -> Result<ForeignValue> {
        Ok(ForeignValue::Slice(*self))
    }
}

impl ToForeign for ForeignHandle {
    fn to_foreign(&self) -> Result<ForeignValue> {
        Ok(ForeignValue::Handle(self.clone()))
    }
}

impl ToForeign for ForeignValue {
    fn to_foreign(&self) -> Result<ForeignValue> {
        Ok(self.clone())
    }
}

/// Convert a value whose static type has been erased.
///
/// Dispatches on the runtime type over the closed set of supported types.
/// Any other type fails with [`BridgeError::UnsupportedType`] naming it.
///
/// ```
/// use keras_bridge::{BridgeError, value::to_foreign_any};
///
/// assert!(to_foreign_any(&3_u8).is_ok());
/// let err = to_foreign_any(&std::time::Duration::from_secs(1)).unwrap_err();
/// assert!(matches!(err, BridgeError::UnsupportedType(name) if name.contains("Duration")));
/// ```
pub fn to_foreign_any<T: Any>(value: &T) -> Result<ForeignValue> {
    let any = value as &dyn Any;

    macro_rules! dispatch {
        ($($t:ty),* $(,)?) => {$(
            if let Some(v) = any.downcast_ref::<$t>() {
                return v.to_foreign();
            }
        )*};
    }

    dispatch!(
        bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64,
        String, &'static str, Shape, Slice, ForeignHandle, ForeignValue,
        Vec<bool>, Vec<i32>, Vec<i64>, Vec<usize>, Vec<f32>, Vec<f64>, Vec<String>,
        Option<bool>, Option<i64>, Option<f64>, Option<String>,
    );

    Err(BridgeError::UnsupportedType(type_name::<T>().to_string()))
}

// ============================================================================
// FromForeign
// ============================================================================

/// Conversion of a [`ForeignValue`] back into a host type.
///
/// Mismatches fail with [`BridgeError::ConversionError`].
pub trait FromForeign: Sized {
    fn from_foreign(value: &ForeignValue) -> Result<Self>;
}

fn mismatch<T>(expected: &str, found: &ForeignValue) -> Result<T> {
    Err(BridgeError::conversion(expected, found.type_name()))
}

impl FromForeign for bool {
    fn from_foreign(value: &ForeignValue) -> Result<Self> {
        match value {
            ForeignValue::Bool(b) => Ok(*b),
            other => mismatch("bool", other),
        }
    }
}

macro_rules! from_foreign_int {
    ($($t:ty),*) => {$(
        impl FromForeign for $t {
            fn from_foreign(value: &ForeignValue) -> Result<Self> {
                match value {
                    ForeignValue::Int(i) => <$t>::try_from(*i).map_err(|_| {
                        BridgeError::conversion(stringify!($t), i.to_string())
                    }),
                    other => mismatch(stringify!($t), other),
                }
            }
        }
    )*};
}

from_foreign_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl FromForeign for f64 {
    fn from_foreign(value: &ForeignValue) -> Result<Self> {
        match value {
            ForeignValue::Float(f) => Ok(*f),
            ForeignValue::Int(i) => Ok(*i as f64),
            other => mismatch("float", other),
        }
    }
}

impl FromForeign for f32 {
    fn from_foreign(value: &ForeignValue) -> Result<Self> {
        f64::from_foreign(value).map(|f| f as f32)
    }
}

impl FromForeign for String {
    fn from_foreign(value: &ForeignValue) -> Result<Self> {
        match value {
            ForeignValue::Str(s) => Ok(s.clone()),
            other => mismatch("str", other),
        }
    }
}

impl<T: FromForeign> FromForeign for Option<T> {
    fn from_foreign(value: &ForeignValue) -> Result<Self> {
        match value {
            ForeignValue::None => Ok(None),
            other => T::from_foreign(other).map(Some),
        }
    }
}

impl<T: FromForeign> FromForeign for Vec<T> {
    fn from_foreign(value: &ForeignValue) -> Result<Self> {
        match value {
            ForeignValue::Array(items) | ForeignValue::Tuple(items) => {
                items.iter().map(T::from_foreign).collect()
            }
            other => mismatch("array", other),
        }
    }
}

macro_rules! from_foreign_tuple {
    ($len:literal; $($name:ident => $idx:tt),+) => {
        impl<$($name: FromForeign),+> FromForeign for ($($name,)+) {
            fn from_foreign(value: &ForeignValue) -> Result<Self> {
                match value {
                    ForeignValue::Tuple(items) | ForeignValue::Array(items) if items.len() == $len => {
                        Ok(($($name::from_foreign(&items[$idx])?,)+))
                    }
                    ForeignValue::Tuple(items) | ForeignValue::Array(items) => Err(
                        BridgeError::conversion(
                            concat!("tuple of ", stringify!($len)),
                            format!("sequence of {}", items.len()),
                        ),
                    ),
                    other => mismatch(concat!("tuple of ", stringify!($len)), other),
                }
            }
        }
    };
}

from_foreign_tuple!(1; A => 0);
from_foreign_tuple!(2; A => 0, B => 1);
from_foreign_tuple!(3; A => 0, B => 1, C => 2);
from_foreign_tuple!(4; A => 0, B => 1, C => 2, D => 3);

impl FromForeign for Shape {
    fn from_foreign(value: &ForeignValue) -> Result<Self> {
        match value {
            ForeignValue::Tuple(items) | ForeignValue::Array(items) => items
                .iter()
                .map(Option::<usize>::from_foreign)
                .collect::<Result<Vec<_>>>()
                .map(Shape),
            other => mismatch("shape", other),
        }
    }
}

impl FromForeign for Slice {
    fn from_foreign(value: &ForeignValue) -> Result<Self> {
        match value {
            ForeignValue::Slice(s) => Ok(*s),
            other => mismatch("slice", other),
        }
    }
}

impl FromForeign for ForeignHandle {
    fn from_foreign(value: &ForeignValue) -> Result<Self> {
        match value {
            ForeignValue::Handle(h) => Ok(h.clone()),
            other => mismatch("handle", other),
        }
    }
}

impl FromForeign for ForeignValue {
    fn from_foreign(value: &ForeignValue) -> Result<Self> {
        Ok(value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    static_assertions::assert_impl_all!(ForeignHandle: Send, Sync, Clone);
    static_assertions::assert_impl_all!(ForeignValue: Send, Sync, Clone);

    #[test]
    fn test_scalar_roundtrip() {
        assert!(bool::from_foreign(&true.to_foreign().unwrap()).unwrap());
        assert_eq!(i32::from_foreign(&(-7_i32).to_foreign().unwrap()).unwrap(), -7);
        assert_eq!(u64::from_foreign(&42_u64.to_foreign().unwrap()).unwrap(), 42);
        assert_eq!(f64::from_foreign(&0.25_f64.to_foreign().unwrap()).unwrap(), 0.25);
        assert_eq!(
            String::from_foreign(&"relu".to_foreign().unwrap()).unwrap(),
            "relu"
        );
    }

    #[test]
    fn test_array_roundtrip() {
        let v = vec![1_i64, 2, 3];
        assert_eq!(Vec::<i64>::from_foreign(&v.to_foreign().unwrap()).unwrap(), v);

        let nested = vec![vec![1.0_f64, 2.0], vec![3.0, 4.0]];
        let back = Vec::<Vec<f64>>::from_foreign(&nested.to_foreign().unwrap()).unwrap();
        assert_eq!(back, nested);
    }

    #[test]
    fn test_shape_becomes_tuple() {
        let shape = Shape::new([None, Some(32)]);
        assert_eq!(
            shape.to_foreign().unwrap(),
            ForeignValue::Tuple(vec![ForeignValue::None, ForeignValue::Int(32)])
        );
        assert_eq!(shape.to_string(), "(None, 32)");
        assert_eq!(Shape::known(&[784]).to_string(), "(784,)");
        assert_eq!(Shape::known(&[2, 3, 4]).element_count(), Some(24));
        assert_eq!(shape.element_count(), None);
    }

    #[test]
    fn test_tuple_conversion() {
        let v = (1_i64, "a", 2.5_f64).to_foreign().unwrap();
        assert_eq!(v.kind(), ValueKind::Tuple);
        let (a, b, c) = <(i64, String, f64)>::from_foreign(&v).unwrap();
        assert_eq!((a, b.as_str(), c), (1, "a", 2.5));
    }

    #[test]
    fn test_tuple_arity_mismatch() {
        let v = (1_i64, 2_i64).to_foreign().unwrap();
        let err = <(i64, i64, i64)>::from_foreign(&v).unwrap_err();
        assert!(matches!(err, BridgeError::ConversionError { .. }));
    }

    #[test]
    fn test_scalar_from_tuple_fails() {
        let v = (1_i64, 2_i64).to_foreign().unwrap();
        let err = i64::from_foreign(&v).unwrap_err();
        assert_eq!(
            err,
            BridgeError::conversion("i64", "tuple")
        );
    }

    #[test]
    fn test_out_of_range_integer() {
        let err = u64::MAX.to_foreign().unwrap_err();
        assert!(matches!(err, BridgeError::ConversionError { .. }));

        let err = u8::from_foreign(&ForeignValue::Int(300)).unwrap_err();
        assert!(matches!(err, BridgeError::ConversionError { .. }));
    }

    #[test]
    fn test_float_accepts_int() {
        assert_eq!(f64::from_foreign(&ForeignValue::Int(3)).unwrap(), 3.0);
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(None::<i64>.to_foreign().unwrap(), ForeignValue::None);
        assert_eq!(
            Option::<i64>::from_foreign(&ForeignValue::Int(5)).unwrap(),
            Some(5)
        );
    }

    #[test]
    fn test_is_blank() {
        assert!(ForeignValue::None.is_blank());
        assert!(ForeignValue::Str(String::new()).is_blank());
        assert!(ForeignValue::Str("  \t".to_string()).is_blank());
        assert!(!ForeignValue::Str("relu".to_string()).is_blank());
        assert!(!ForeignValue::Int(0).is_blank());
        assert!(!ForeignValue::Bool(false).is_blank());
    }

    #[test]
    fn test_element_kind_ignores_none() {
        let items = vec![ForeignValue::Int(1), ForeignValue::None, ForeignValue::Int(2)];
        assert_eq!(ForeignValue::element_kind(&items).unwrap(), Some(ValueKind::Int));

        let mixed = vec![ForeignValue::Int(1), ForeignValue::Str("x".into())];
        assert!(ForeignValue::element_kind(&mixed).is_err());
        assert_eq!(ForeignValue::sequence(mixed).kind(), ValueKind::Tuple);
    }

    #[test]
    fn test_to_foreign_any_unsupported() {
        #[derive(Debug)]
        struct Opaque;

        let err = to_foreign_any(&Opaque).unwrap_err();
        match err {
            BridgeError::UnsupportedType(name) => assert!(name.ends_with("Opaque")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_to_foreign_any_supported() {
        assert_eq!(to_foreign_any(&7_i32).unwrap(), ForeignValue::Int(7));
        assert_eq!(
            to_foreign_any(&"tanh").unwrap(),
            ForeignValue::Str("tanh".to_string())
        );
        assert_eq!(
            to_foreign_any(&vec![1.5_f64]).unwrap(),
            ForeignValue::Array(vec![ForeignValue::Float(1.5)])
        );
    }

    #[test]
    fn test_handle_identity() {
        let a = ForeignHandle::new(1_u32, "int");
        let b = a.clone();
        let c = ForeignHandle::new(1_u32, "int");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.downcast_ref::<u32>(), Some(&1));
        assert!(a.downcast_ref::<String>().is_none());

        let shared = Arc::new(5_u8);
        let d = ForeignHandle::from_arc(Arc::clone(&shared), "int");
        let e = ForeignHandle::from_arc(shared, "int");
        assert_eq!(d, e);
        assert_eq!(d.downcast_arc::<u8>().as_deref(), Some(&5));
    }

    #[test]
    fn test_json_interop() {
        let v = ForeignValue::from_json(&json!([1, "a", null, {"$slice": [0, 10, null]}])).unwrap();
        assert_eq!(
            v,
            ForeignValue::Tuple(vec![
                ForeignValue::Int(1),
                ForeignValue::Str("a".to_string()),
                ForeignValue::None,
                ForeignValue::Slice(Slice::new(Some(0), Some(10))),
            ])
        );
        assert_eq!(
            v.to_json(),
            json!([1, "a", null, {"$slice": [0, 10, null]}])
        );

        let handle = ForeignValue::Handle(ForeignHandle::new((), "Dense"));
        assert_eq!(handle.to_json(), json!({"$handle": "Dense"}));
        assert_eq!(ForeignValue::Float(f64::NAN).to_json(), serde_json::Value::Null);
    }

    #[test]
    fn test_json_object_unsupported() {
        let err = ForeignValue::from_json(&json!({"units": 3})).unwrap_err();
        assert_eq!(err, BridgeError::UnsupportedType("object".to_string()));
    }

    #[test]
    fn test_display() {
        let v = ForeignValue::Tuple(vec![
            ForeignValue::Str("a".to_string()),
            ForeignValue::Bool(true),
            ForeignValue::Float(1.0),
        ]);
        assert_eq!(v.to_string(), "('a', True, 1.0)");
        assert_eq!(
            ForeignValue::Slice(Slice::new(None, Some(5)).with_step(2)).to_string(),
            "slice(:5:2)"
        );
    }
}

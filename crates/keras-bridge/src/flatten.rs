//! Flattening of nested tuple results.
//!
//! The runtime returns structured results such as
//! `((x_train, y_train), (x_test, y_test))`. [`flatten`] walks such a value
//! depth-first, left to right, descending into every `Tuple` and treating any
//! other node as a leaf. Leaves whose kind the target type does not accept
//! are skipped; accepted leaves are converted with [`FromForeign`].
//!
//! | Target type | Accepted leaf kinds |
//! |-------------|---------------------|
//! | integers | `Int` |
//! | `f32`, `f64` | `Int`, `Float` |
//! | `bool` | `Bool` |
//! | `String` | `Str` |
//! | [`ForeignHandle`] | `Handle` |
//! | [`ForeignValue`] | every leaf |
//!
//! ```
//! use keras_bridge::flatten::flatten;
//! use keras_bridge::value::ForeignValue;
//!
//! let nested = ForeignValue::Tuple(vec![
//!     ForeignValue::Tuple(vec![ForeignValue::Str("a".into()), ForeignValue::Int(1)]),
//!     ForeignValue::Tuple(vec![ForeignValue::Str("b".into()), ForeignValue::Int(2)]),
//! ]);
//! let ints = flatten::<i64>(&nested).unwrap();
//! assert_eq!(ints.as_slice(), &[1, 2]);
//! ```

use std::ops::Deref;

use crate::error::{BridgeError, Result};
use crate::value::{ForeignHandle, ForeignValue, FromForeign, ValueKind};

/// A type the flattener can collect.
pub trait FlattenLeaf: FromForeign {
    /// Whether a leaf of this kind is collected or skipped.
    fn accepts(kind: ValueKind) -> bool;
}

macro_rules! int_leaf {
    ($($t:ty),*) => {$(
        impl FlattenLeaf for $t {
            fn accepts(kind: ValueKind) -> bool {
                kind == ValueKind::Int
            }
        }
    )*};
}

int_leaf!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl FlattenLeaf for f32 {
    fn accepts(kind: ValueKind) -> bool {
        matches!(kind, ValueKind::Int | ValueKind::Float)
    }
}

impl FlattenLeaf for f64 {
    fn accepts(kind: ValueKind) -> bool {
        matches!(kind, ValueKind::Int | ValueKind::Float)
    }
}

impl FlattenLeaf for bool {
    fn accepts(kind: ValueKind) -> bool {
        kind == ValueKind::Bool
    }
}

impl FlattenLeaf for String {
    fn accepts(kind: ValueKind) -> bool {
        kind == ValueKind::Str
    }
}

impl FlattenLeaf for ForeignHandle {
    fn accepts(kind: ValueKind) -> bool {
        kind == ValueKind::Handle
    }
}

impl FlattenLeaf for ForeignValue {
    fn accepts(_kind: ValueKind) -> bool {
        true
    }
}

/// Flat, ordered leaves of a nested value.
#[derive(Debug, Clone, PartialEq)]
pub struct FlattenResult<T>(Vec<T>);

impl<T> FlattenResult<T> {
    pub fn as_slice(&self) -> &[T] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<T> {
        self.0
    }

    /// Regroup exactly four leaves as `((a, b), (c, d))`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ConversionError`] for any other leaf count.
    pub fn into_pairs(self) -> Result<((T, T), (T, T))> {
        let found = self.0.len();
        let mut iter = self.0.into_iter();
        match (iter.next(), iter.next(), iter.next(), iter.next(), iter.next()) {
            (Some(a), Some(b), Some(c), Some(d), None) => Ok(((a, b), (c, d))),
            _ => Err(BridgeError::conversion(
                "four leaves",
                format!("{found} leaves"),
            )),
        }
    }
}

impl<T> Deref for FlattenResult<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.0
    }
}

impl<T> IntoIterator for FlattenResult<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a FlattenResult<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Collect every accepted leaf of `value` in depth-first, left-to-right order.
///
/// # Errors
///
/// A conversion error on an accepted leaf is returned as is. Rejected leaves
/// never produce an error.
pub fn flatten<T: FlattenLeaf>(value: &ForeignValue) -> Result<FlattenResult<T>> {
    let mut out = Vec::new();
    walk(value, &mut out)?;
    Ok(FlattenResult(out))
}

fn walk<T: FlattenLeaf>(value: &ForeignValue, out: &mut Vec<T>) -> Result<()> {
    match value {
        ForeignValue::Tuple(items) => items.iter().try_for_each(|item| walk(item, out)),
        leaf if T::accepts(leaf.kind()) => {
            out.push(T::from_foreign(leaf)?);
            Ok(())
        }
        _ => Ok(()),
    }
}

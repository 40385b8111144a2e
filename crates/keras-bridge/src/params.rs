//! Named, ordered call arguments.
//!
//! A [`ParameterSet`] collects the arguments of one foreign call in insertion
//! order. When realized, the first entry becomes the single positional
//! argument and every later entry becomes a keyword argument, unless its
//! value is blank (`None`, or a string that is empty or all whitespace), in
//! which case it is dropped so the runtime applies its own default.
//!
//! ```
//! use keras_bridge::ParameterSet;
//! use keras_bridge::value::ForeignValue;
//!
//! let params = ParameterSet::new()
//!     .with("units", 32)
//!     .with("activation", "relu")
//!     .with("bias", "");
//!
//! let realized = params.realize().unwrap();
//! assert_eq!(realized.positional, Some(ForeignValue::Int(32)));
//! assert_eq!(realized.keywords.len(), 1);
//! assert_eq!(realized.keywords["activation"], ForeignValue::Str("relu".into()));
//! ```

use std::fmt;

use indexmap::IndexMap;

use crate::error::Result;
use crate::value::{ForeignValue, ToForeign};

type BoxedValue = Box<dyn ToForeign + Send + Sync>;

/// Ordered, name-unique map of host values destined for one call.
///
/// Overwriting an existing name replaces the value but keeps the original
/// position, so the positional slot cannot move by accident.
#[derive(Default)]
pub struct ParameterSet {
    entries: IndexMap<String, BoxedValue>,
}

/// A [`ParameterSet`] after conversion, ready for a backend call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Realized {
    /// The first entry's value. `None` only for an empty set.
    pub positional: Option<ForeignValue>,
    /// Every later non-blank entry, in insertion order.
    pub keywords: IndexMap<String, ForeignValue>,
}

impl Realized {
    /// True only when the originating set was empty.
    pub fn is_empty(&self) -> bool {
        self.positional.is_none()
    }
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `name`.
    pub fn set<V>(&mut self, name: impl Into<String>, value: V) -> &mut Self
    where
        V: ToForeign + Send + Sync + 'static,
    {
        self.entries.insert(name.into(), Box::new(value));
        self
    }

    /// Builder form of [`set`](Self::set).
    #[must_use]
    pub fn with<V>(mut self, name: impl Into<String>, value: V) -> Self
    where
        V: ToForeign + Send + Sync + 'static,
    {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&(dyn ToForeign + Send + Sync)> {
        self.entries.get(name).map(|v| v.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Remove `name`, shifting later entries up. Removing the first entry
    /// promotes the second to the positional slot.
    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.shift_remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Append every entry of `other`. Names already present are overwritten
    /// in place, so `self`'s first entry stays positional.
    #[must_use]
    pub fn merge(mut self, other: ParameterSet) -> Self {
        for (name, value) in other.entries {
            self.entries.insert(name, value);
        }
        self
    }

    /// Convert every entry and split it into positional and keyword parts.
    ///
    /// The first entry is always positional, even when its value is blank.
    ///
    /// # Errors
    ///
    /// Any entry's conversion error is returned as is.
    pub fn realize(&self) -> Result<Realized> {
        let mut iter = self.entries.iter();
        let Some((_, first)) = iter.next() else {
            return Ok(Realized::default());
        };

        let positional = first.to_foreign()?;
        let mut keywords = IndexMap::with_capacity(self.entries.len() - 1);
        for (name, value) in iter {
            let value = value.to_foreign()?;
            if !value.is_blank() {
                keywords.insert(name.clone(), value);
            }
        }

        Ok(Realized {
            positional: Some(positional),
            keywords,
        })
    }
}

impl fmt::Debug for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_set_realizes_empty() {
        let realized = ParameterSet::new().realize().unwrap();
        assert!(realized.is_empty());
        assert!(realized.keywords.is_empty());
    }

    #[test]
    fn test_first_entry_is_positional() {
        let realized = ParameterSet::new()
            .with("units", 32)
            .with("activation", "relu")
            .with("bias", "")
            .realize()
            .unwrap();

        assert_eq!(realized.positional, Some(ForeignValue::Int(32)));
        assert_eq!(
            realized.keywords.into_iter().collect::<Vec<_>>(),
            vec![("activation".to_string(), ForeignValue::Str("relu".to_string()))]
        );
    }

    #[test]
    fn test_blank_first_entry_stays_positional() {
        let realized = ParameterSet::new()
            .with("x", None::<i64>)
            .with("y", 1)
            .realize()
            .unwrap();
        assert_eq!(realized.positional, Some(ForeignValue::None));
        assert_eq!(realized.keywords.len(), 1);
        assert!(!realized.is_empty());
    }

    #[test]
    fn test_all_keywords_dropped() {
        let realized = ParameterSet::new()
            .with("filepath", "model.h5")
            .with("overwrite", None::<bool>)
            .with("format", "   ")
            .realize()
            .unwrap();
        assert_eq!(
            realized.positional,
            Some(ForeignValue::Str("model.h5".to_string()))
        );
        assert!(realized.keywords.is_empty());
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let mut params = ParameterSet::new();
        params.set("a", 1).set("b", 2).set("a", 3);
        assert_eq!(params.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(
            params.realize().unwrap().positional,
            Some(ForeignValue::Int(3))
        );
    }

    #[test]
    fn test_remove_promotes_next() {
        let mut params = ParameterSet::new().with("a", 1).with("b", 2).with("c", 3);
        assert!(params.remove("a"));
        assert!(!params.remove("a"));
        let realized = params.realize().unwrap();
        assert_eq!(realized.positional, Some(ForeignValue::Int(2)));
        assert_eq!(realized.keywords.keys().collect::<Vec<_>>(), vec!["c"]);
    }

    #[test]
    fn test_merge_keeps_leading_entry() {
        let options = ParameterSet::new().with("x", 9).with("epochs", 5);
        let params = ParameterSet::new().with("x", 1).with("y", 2).merge(options);
        assert_eq!(params.names().collect::<Vec<_>>(), vec!["x", "y", "epochs"]);
        assert_eq!(
            params.realize().unwrap().positional,
            Some(ForeignValue::Int(9))
        );
    }

    #[test]
    fn test_conversion_failure_propagates() {
        let params = ParameterSet::new().with("a", 1).with("too_big", u64::MAX);
        let err = params.realize().unwrap_err();
        assert!(matches!(err, BridgeError::ConversionError { .. }));
    }

    #[test]
    fn test_zero_and_false_are_not_blank() {
        let realized = ParameterSet::new()
            .with("x", 1)
            .with("rate", 0.0)
            .with("shuffle", false)
            .realize()
            .unwrap();
        assert_eq!(realized.keywords.len(), 2);
    }
}

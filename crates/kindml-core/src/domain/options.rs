//! Flat, layered model options.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::ModelKind;

/// Option key: keep the derived tensor of a prediction alive for the caller.
pub const RETURN_TENSORS: &str = "return_tensors";

/// Option key: render a drawable overlay when a drawing sink is available.
pub const RENDER_OVERLAY: &str = "render_overlay";

/// A flat key-value configuration for a model.
///
/// Options are layered: library defaults, then constructor-time options,
/// then per-call options. Later layers win key by key; unknown keys are
/// carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelOptions(BTreeMap<String, Value>);

impl ModelOptions {
    /// Creates an empty option set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Options every model starts from.
    #[must_use]
    pub fn library_defaults() -> Self {
        Self::new()
            .with(RETURN_TENSORS, false)
            .with(RENDER_OVERLAY, true)
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Sets a single option, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Removes a single option.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Returns the raw value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns `key` as a float, if it is numeric.
    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    /// Returns `key` as an unsigned integer, if it is one.
    #[must_use]
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(Value::as_u64)
    }

    /// Returns `key` as a bool, if it is one.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Returns `key` as a string slice, if it is a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Returns true if `key` is set.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no option is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over keys and values in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Merges `other` into this set. Values from `other` win when present.
    pub fn merge(&mut self, other: &Self) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Returns a copy of this set with `overrides` merged on top.
    ///
    /// `self` is left untouched, which is how per-call options are applied
    /// without mutating a model's shared configuration.
    #[must_use]
    pub fn merged(&self, overrides: &Self) -> Self {
        let mut out = self.clone();
        out.merge(overrides);
        out
    }

    /// Folds a sequence of layers, lowest priority first.
    #[must_use]
    pub fn layered<'a>(layers: impl IntoIterator<Item = &'a Self>) -> Self {
        layers.into_iter().fold(Self::new(), |mut acc, layer| {
            acc.merge(layer);
            acc
        })
    }

    /// Starting options of a model instance: library defaults, then the
    /// kind's defaults (if known), then `layers` in order.
    #[must_use]
    pub fn for_kind<'a>(kind: Option<ModelKind>, layers: impl IntoIterator<Item = &'a Self>) -> Self {
        let mut options = Self::library_defaults();
        if let Some(kind) = kind {
            options.merge(&kind.defaults());
        }
        for layer in layers {
            options.merge(layer);
        }
        options
    }
}

impl From<Map<String, Value>> for ModelOptions {
    fn from(map: Map<String, Value>) -> Self {
        Self(map.into_iter().collect())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ModelOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

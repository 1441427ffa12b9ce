use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

/// One stored entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PreferenceValue {
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    StringSet(BTreeSet<String>),
}

/// Rust types that can live in a preference entry.
pub trait PreferenceType: Sized {
    fn into_value(self) -> PreferenceValue;
    fn from_value(value: &PreferenceValue) -> Option<Self>;
}

macro_rules! preference_type {
    ($ty:ty, $variant:ident) => {
        impl PreferenceType for $ty {
            fn into_value(self) -> PreferenceValue {
                PreferenceValue::$variant(self)
            }

            fn from_value(value: &PreferenceValue) -> Option<Self> {
                match value {
                    PreferenceValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

preference_type!(bool, Bool);
preference_type!(i32, Int);
preference_type!(i64, Long);
preference_type!(f32, Float);
preference_type!(f64, Double);
preference_type!(String, String);
preference_type!(BTreeSet<String>, StringSet);

/// Typed name of an entry.
pub struct Key<T> {
    name: String,
    _type: PhantomData<fn() -> T>,
}

impl<T> Key<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), _type: PhantomData }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        Self::new(self.name.clone())
    }
}

impl<T> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Key").field(&self.name).finish()
    }
}

impl<T> PartialEq for Key<T> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

pub fn bool_key(name: impl Into<String>) -> Key<bool> {
    Key::new(name)
}

pub fn int_key(name: impl Into<String>) -> Key<i32> {
    Key::new(name)
}

pub fn long_key(name: impl Into<String>) -> Key<i64> {
    Key::new(name)
}

pub fn float_key(name: impl Into<String>) -> Key<f32> {
    Key::new(name)
}

pub fn double_key(name: impl Into<String>) -> Key<f64> {
    Key::new(name)
}

pub fn string_key(name: impl Into<String>) -> Key<String> {
    Key::new(name)
}

pub fn string_set_key(name: impl Into<String>) -> Key<BTreeSet<String>> {
    Key::new(name)
}

/// Snapshot of a preference store: entry name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Preferences {
    entries: BTreeMap<String, PreferenceValue>,
}

impl Preferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value under `key`; `None` when absent or stored with another type.
    pub fn get<T: PreferenceType>(&self, key: &Key<T>) -> Option<T> {
        self.entries.get(key.name()).and_then(T::from_value)
    }

    pub fn contains<T>(&self, key: &Key<T>) -> bool {
        self.entries.contains_key(key.name())
    }

    /// Set `key`, replacing whatever was stored under its name.
    pub fn set<T: PreferenceType>(&mut self, key: &Key<T>, value: T) -> &mut Self {
        self.entries.insert(key.name().to_string(), value.into_value());
        self
    }

    pub fn remove<T: PreferenceType>(&mut self, key: &Key<T>) -> Option<T> {
        self.entries.remove(key.name()).as_ref().and_then(T::from_value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PreferenceValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

//! Key-value flavour: an open-ended set of typed entries in one JSON file.

pub mod keys;
pub mod store;

pub use keys::{
    bool_key, double_key, float_key, int_key, long_key, string_key, string_set_key, Key,
    PreferenceType, PreferenceValue, Preferences,
};
pub use store::{PreferenceStore, PreferencesSerializer};

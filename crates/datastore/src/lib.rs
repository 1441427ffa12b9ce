//! File-backed reactive data stores.
//! - `storage` holds the generic store core: atomic updates, observation streams, serializers.
//! - `preferences` is the key-value flavour, `record` the typed-record flavour.
//! - `demo` wires one of each together the way an application screen would.

pub mod errors;
pub mod runtime;
#[cfg(test)]
pub mod test_support;
pub mod storage;
pub mod preferences;
pub mod record;
pub mod demo;

pub use errors::StoreError;
pub use preferences::{Key, PreferenceStore, PreferenceValue, Preferences};
pub use record::{ProtoSerializer, RecordStore, Settings};
pub use storage::{CorruptionPolicy, DataStore, FileStore, Serializer, SerializerError, ValueStream};

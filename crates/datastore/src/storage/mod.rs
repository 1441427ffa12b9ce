//! Storage core shared by every store flavour.
//!
//! A store persists exactly one value to one file. Reads go through a
//! [`ValueStream`], writes through an atomic read-modify-write
//! ([`DataStore::update_data`]); the bytes on disk come from a pluggable
//! [`Serializer`].

pub mod data_store;
pub mod file_store;
pub mod registry;
pub mod serializer;
pub mod stream;

pub use data_store::DataStore;
pub use file_store::{CorruptionPolicy, FileStore};
pub use serializer::{Serializer, SerializerError};
pub use stream::{MappedStream, ValueStream};

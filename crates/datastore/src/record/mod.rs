//! Typed-record flavour: one structured message per file, encoded by a
//! [`Serializer`](crate::storage::Serializer).

pub mod serializer;
pub mod settings;
pub mod store;

pub use serializer::ProtoSerializer;
pub use settings::Settings;
pub use store::RecordStore;

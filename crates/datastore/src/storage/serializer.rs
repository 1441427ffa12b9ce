use thiserror::Error;

#[derive(Debug, Error)]
#[error("{message}")]
pub struct SerializerError {
    message: String,
}

impl SerializerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Converts a store value to and from its persisted bytes.
///
/// Implementations only deal with bytes; empty or missing files never reach
/// `read_from`, the store substitutes `default_value` for them.
pub trait Serializer<T>: Send + Sync + 'static {
    /// Value used when nothing has been persisted yet.
    fn default_value(&self) -> T;

    /// Decode a non-empty byte source. An error means the file is corrupt.
    fn read_from(&self, bytes: &[u8]) -> Result<T, SerializerError>;

    /// Encode `value` into `out`. Whatever was appended to `out` is discarded
    /// when this returns an error.
    fn write_to(&self, value: &T, out: &mut Vec<u8>) -> Result<(), SerializerError>;
}

use std::marker::PhantomData;

use prost::Message;

use crate::storage::{Serializer, SerializerError};

/// Protocol Buffers serializer for any generated message type.
/// The default value is the message's default instance.
pub struct ProtoSerializer<M> {
    _message: PhantomData<fn() -> M>,
}

impl<M> ProtoSerializer<M> {
    pub fn new() -> Self {
        Self { _message: PhantomData }
    }
}

impl<M> Default for ProtoSerializer<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for ProtoSerializer<M> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<M> Serializer<M> for ProtoSerializer<M>
where
    M: Message + Default + 'static,
{
    fn default_value(&self) -> M {
        M::default()
    }

    fn read_from(&self, bytes: &[u8]) -> Result<M, SerializerError> {
        M::decode(bytes).map_err(|e| SerializerError::new(format!("cannot read proto: {e}")))
    }

    fn write_to(&self, value: &M, out: &mut Vec<u8>) -> Result<(), SerializerError> {
        out.reserve(value.encoded_len());
        value.encode(out).map_err(|e| SerializerError::new(e.to_string()))
    }
}

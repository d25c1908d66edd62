use serde::{de::DeserializeOwned, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode block: {0}")]
    Encode(String),
    #[error("failed to decode block: {0}")]
    Decode(String),
}

/// Anything stored as a DAG-CBOR block
pub trait BlockEncoded: Serialize + DeserializeOwned {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        serde_ipld_dagcbor::to_vec(self).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        serde_ipld_dagcbor::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

//! The core treats activity/signal/marker payloads as opaque bytes (§6:
//! "Data conversion: pluggable; the core touches it only through the Marker
//! detail and argument/result encoding of futures").

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An opaque, cheaply-cloned payload. The core never inspects the bytes; it
/// only moves them between history events, commands, and `Future` slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload(Arc<Vec<u8>>);

impl Payload {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(Arc::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

/// Round-trips encoded payloads into/out of the typed values workflow code
/// actually wants. Pluggable so the core never needs to know the wire
/// encoding used by a given SDK deployment — mirrors the source's "data
/// converter" interface (`ToPayloads`/`FromPayloads`, DESIGN NOTES §9).
pub trait PayloadCodec: Send + Sync {
    fn encode(&self, value: &serde_json::Value) -> Result<Payload, CodecError>;
    fn decode(&self, payload: &Payload) -> Result<serde_json::Value, CodecError>;
}

#[derive(Debug, thiserror::Error)]
#[error("payload codec error: {0}")]
pub struct CodecError(pub String);

/// The default codec used by tests and by embedders who don't need anything
/// fancier than JSON; production deployments supply their own.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn encode(&self, value: &serde_json::Value) -> Result<Payload, CodecError> {
        serde_json::to_vec(value)
            .map(Payload::from_bytes)
            .map_err(|e| CodecError(e.to_string()))
    }

    fn decode(&self, payload: &Payload) -> Result<serde_json::Value, CodecError> {
        serde_json::from_slice(payload.as_bytes()).map_err(|e| CodecError(e.to_string()))
    }
}

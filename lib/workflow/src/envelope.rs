//! Versioned envelope for definition and instance documents.
//!
//! Every document written by this crate is wrapped as
//! `{"version": N, "payload": ...}`. Readers parse the envelope first and
//! refuse versions they do not understand before touching the payload.

use crate::error::DocumentError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// The current envelope version.
pub const CURRENT_VERSION: u32 = 1;

/// A versioned envelope around a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// The version of the envelope format.
    pub version: u32,
    /// The wrapped payload.
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Wraps `payload` with the current version.
    #[must_use]
    pub fn new(payload: T) -> Self {
        Self {
            version: CURRENT_VERSION,
            payload,
        }
    }

    /// Unwraps the envelope.
    #[must_use]
    pub fn into_payload(self) -> T {
        self.payload
    }
}

impl<T: Serialize> Envelope<T> {
    /// Serializes the envelope to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if the payload cannot be encoded.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, DocumentError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Parses an envelope, checking its version before the payload.
    ///
    /// # Errors
    ///
    /// - `Malformed` if the bytes are not an envelope or the payload does not decode
    /// - `UnsupportedVersion` if the version is not [`CURRENT_VERSION`]
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, DocumentError> {
        let raw: RawEnvelope = serde_json::from_slice(bytes)?;
        if raw.version != CURRENT_VERSION {
            return Err(DocumentError::UnsupportedVersion {
                version: raw.version,
            });
        }
        let payload = serde_json::from_value(raw.payload)?;
        Ok(Self {
            version: raw.version,
            payload,
        })
    }
}

#[derive(Deserialize)]
struct RawEnvelope {
    version: u32,
    payload: serde_json::Value,
}

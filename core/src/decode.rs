//! Pluggable body decoding.
//!
//! The integrator is format-agnostic: the target type only has to be
//! deserializable, and a `Decoder` picks the wire format. `Json` covers the
//! common case.

use serde::de::DeserializeOwned;

use crate::error::DecodeError;

/// Turns a non-empty body into a typed value.
pub trait Decoder: Clone + Send + Sync + 'static {
    fn decode<U: DeserializeOwned>(&self, bytes: &[u8]) -> Result<U, DecodeError>;
}

/// JSON bodies via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json;

impl Decoder for Json {
    fn decode<U: DeserializeOwned>(&self, bytes: &[u8]) -> Result<U, DecodeError> {
        serde_json::from_slice(bytes).map_err(|e| DecodeError::new(e.to_string(), bytes))
    }
}

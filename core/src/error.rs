//! Error types for the integrator.
//!
//! # Design
//! The taxonomy is flat: a call fails because the transport failed, because
//! it succeeded without producing any bytes, or because the bytes did not
//! decode into the requested type. `NoData` is kept apart from `Transport`
//! since an empty successful call is not a transport malfunction.

use std::error::Error;
use std::fmt;

/// A transport-level failure (DNS, connect, TLS, timeout, body read).
///
/// Transports do not classify failures further; the original error is kept
/// as the `source` for diagnostics.
#[derive(Debug)]
pub struct TransportError {
    message: String,
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn from_source<E>(source: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// The transport dropped its completion handle without reporting.
    pub fn abandoned() -> Self {
        Self::new("transport dropped the request without delivering an outcome")
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for TransportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn Error + 'static))
    }
}

/// The body bytes could not be decoded into the requested type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    pub message: String,
    /// Lossy UTF-8 copy of the body that failed to decode.
    pub body: String,
}

impl DecodeError {
    pub fn new(message: impl Into<String>, body: &[u8]) -> Self {
        Self {
            message: message.into(),
            body: String::from_utf8_lossy(body).into_owned(),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for DecodeError {}

/// Every way an `integrate` call can fail.
#[derive(Debug)]
pub enum IntegrationError {
    /// The transport reported an error. No decode was attempted.
    Transport(TransportError),

    /// The transport completed without error but produced no bytes.
    NoData,

    /// Bytes arrived but did not decode into the requested type.
    Decode(DecodeError),
}

impl fmt::Display for IntegrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrationError::Transport(err) => write!(f, "transport failed: {err}"),
            IntegrationError::NoData => write!(f, "no data returned"),
            IntegrationError::Decode(err) => write!(f, "decoding response failed: {err}"),
        }
    }
}

impl Error for IntegrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            IntegrationError::Transport(err) => Some(err),
            IntegrationError::NoData => None,
            IntegrationError::Decode(err) => Some(err),
        }
    }
}

impl From<TransportError> for IntegrationError {
    fn from(err: TransportError) -> Self {
        IntegrationError::Transport(err)
    }
}

impl From<DecodeError> for IntegrationError {
    fn from(err: DecodeError) -> Self {
        IntegrationError::Decode(err)
    }
}

//! The transport seam.
//!
//! # Design
//! A `Transport` moves bytes and knows nothing about decoding. It receives a
//! prepared `HttpRequest` and a `Completion`, returns immediately, and later
//! reports through the completion on whatever thread it likes.
//!
//! `Completion` is consumed by value, so a transport cannot report twice. A
//! transport that drops it without reporting still produces one outcome: the
//! drop delivers an abandoned `TransportError`.

mod network;

pub use network::{UreqConfig, UreqTransport, DEFAULT_MAX_BODY_SIZE};

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse};

/// Executes prepared requests and reports raw results.
pub trait Transport {
    fn execute(&self, request: &HttpRequest, completion: Completion);
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, request: &HttpRequest, completion: Completion) {
        (**self).execute(request, completion)
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn execute(&self, request: &HttpRequest, completion: Completion) {
        (**self).execute(request, completion)
    }
}

/// Adapts a closure into a `Transport`.
#[derive(Clone)]
pub struct FnTransport<F>(pub F);

impl<F> Transport for FnTransport<F>
where
    F: Fn(&HttpRequest, Completion),
{
    fn execute(&self, request: &HttpRequest, completion: Completion) {
        (self.0)(request, completion)
    }
}

/// What a transport produced, before any decoding.
#[derive(Debug)]
pub enum RawOutcome {
    Bytes {
        body: Vec<u8>,
        response: Option<HttpResponse>,
    },
    Error(TransportError),
    Empty {
        response: Option<HttpResponse>,
    },
}

impl RawOutcome {
    /// Classify the three independently optional parts a network callback
    /// reports. An error wins over any bytes; a zero-length body counts as
    /// no data.
    pub fn from_parts(
        body: Option<Vec<u8>>,
        response: Option<HttpResponse>,
        error: Option<TransportError>,
    ) -> Self {
        if let Some(error) = error {
            return RawOutcome::Error(error);
        }
        match body {
            Some(body) if !body.is_empty() => RawOutcome::Bytes { body, response },
            _ => RawOutcome::Empty { response },
        }
    }
}

type Deliver = Box<dyn FnOnce(RawOutcome) + Send + 'static>;

/// One-shot handle a transport uses to report its result.
pub struct Completion {
    deliver: Option<Deliver>,
}

impl Completion {
    pub fn new<F>(deliver: F) -> Self
    where
        F: FnOnce(RawOutcome) + Send + 'static,
    {
        Self {
            deliver: Some(Box::new(deliver)),
        }
    }

    /// Report the raw parts of a finished network call.
    pub fn complete(
        self,
        body: Option<Vec<u8>>,
        response: Option<HttpResponse>,
        error: Option<TransportError>,
    ) {
        self.deliver(RawOutcome::from_parts(body, response, error))
    }

    pub fn succeed(self, body: Vec<u8>, response: HttpResponse) {
        self.complete(Some(body), Some(response), None)
    }

    pub fn fail(self, error: TransportError) {
        self.deliver(RawOutcome::Error(error))
    }

    pub fn deliver(mut self, outcome: RawOutcome) {
        if let Some(deliver) = self.deliver.take() {
            deliver(outcome);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(deliver) = self.deliver.take() {
            warn!("transport dropped its completion without reporting");
            deliver(RawOutcome::Error(TransportError::abandoned()));
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("pending", &self.deliver.is_some())
            .finish()
    }
}

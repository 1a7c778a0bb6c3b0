//! Typed request/response integration over a pluggable transport.
//!
//! # Overview
//! An `Integrator` hands a prepared `HttpRequest` to a `Transport`, decodes
//! whatever bytes come back into a caller-chosen type, and reports exactly
//! one `IntegrationOutcome` through a callback. Transport errors, empty
//! responses and undecodable bodies all arrive on that same channel as
//! `IntegrationError` variants.
//!
//! # Design
//! - `Transport` owns byte transfer and nothing else. `UreqTransport` is the
//!   bundled network implementation; tests and hosts can plug in their own.
//! - `Decoder` owns the wire format; `Json` is the default.
//! - The integrator holds no mutable state, so one instance can serve any
//!   number of concurrent calls.
//!
//! ```no_run
//! use integrator_core::{HttpRequest, IntegrationOutcome, Integrator, UreqTransport};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//!     email: String,
//! }
//!
//! let request = HttpRequest::get("https://example.com/api/users/1");
//! let integrator = Integrator::new(UreqTransport::default(), request);
//! integrator.integrate_default(|outcome: IntegrationOutcome<User>| match outcome {
//!     Ok(user) => println!("received user: {user:?}"),
//!     Err(err) => eprintln!("request failed: {err}"),
//! });
//! ```

pub mod decode;
pub mod error;
pub mod http;
pub mod integrator;
pub mod transport;

pub use decode::{Decoder, Json};
pub use error::{DecodeError, IntegrationError, TransportError};
pub use http::{CachePolicy, HttpMethod, HttpRequest, HttpResponse};
pub use integrator::{Decoded, IntegrationOutcome, Integrator};
pub use transport::{Completion, FnTransport, RawOutcome, Transport, UreqConfig, UreqTransport};

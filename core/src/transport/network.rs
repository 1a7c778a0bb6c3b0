//! Blocking `ureq` transport run on a per-request thread.

use std::fmt;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};
use ureq::http::Response;
use ureq::typestate::WithBody;
use ureq::{Agent, Body, RequestBuilder};

use super::{Completion, Transport};
use crate::error::TransportError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Default cap on a response body, in bytes.
pub const DEFAULT_MAX_BODY_SIZE: u64 = 64 * 1024 * 1024;

/// Settings for [`UreqTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UreqConfig {
    /// Upper bound on the whole call, connect through body read.
    pub timeout: Option<Duration>,
    /// Sent as `user-agent` unless the request sets its own.
    pub user_agent: Option<String>,
    /// Largest body read, in bytes. A longer body fails the call with a
    /// `TransportError` rather than being truncated.
    pub max_body_size: u64,
}

impl Default for UreqConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            user_agent: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

/// Network transport backed by a shared `ureq::Agent`.
///
/// Every `execute` runs the blocking round-trip on its own thread and
/// completes from there. Non-2xx statuses are reported as data, not errors;
/// status interpretation is left to whoever consumes the body.
#[derive(Clone)]
pub struct UreqTransport {
    agent: Agent,
    config: UreqConfig,
}

impl UreqTransport {
    pub fn new(config: UreqConfig) -> Self {
        let mut builder = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }
        let agent = builder.build().new_agent();
        Self { agent, config }
    }

    pub fn config(&self) -> &UreqConfig {
        &self.config
    }
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(UreqConfig::default())
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest, completion: Completion) {
        let agent = self.agent.clone();
        let max_body_size = self.config.max_body_size;
        let request = request.clone();

        let spawned = thread::Builder::new()
            .name("ureq-transport".to_string())
            .spawn(move || match round_trip(&agent, &request, max_body_size) {
                Ok((body, response)) => {
                    debug!(
                        status = response.status,
                        bytes = body.len(),
                        endpoint = %request.log_target(),
                        "response received"
                    );
                    completion.complete(Some(body), Some(response), None)
                }
                Err(err) => completion.fail(TransportError::from_source(err)),
            });

        // The closure, and with it the completion, is dropped on failure,
        // which reports the request as abandoned.
        if let Err(err) = spawned {
            warn!(error = %err, "failed to spawn transport thread");
        }
    }
}

fn round_trip(
    agent: &Agent,
    request: &HttpRequest,
    max_body_size: u64,
) -> Result<(Vec<u8>, HttpResponse), ureq::Error> {
    let url = request.url.as_str();
    let body = request.body.as_deref();

    let mut response = match request.method {
        HttpMethod::Get => with_headers(agent.get(url), request).call()?,
        HttpMethod::Delete => with_headers(agent.delete(url), request).call()?,
        HttpMethod::Post => send(with_headers(agent.post(url), request), body)?,
        HttpMethod::Put => send(with_headers(agent.put(url), request), body)?,
        HttpMethod::Patch => send(with_headers(agent.patch(url), request), body)?,
    };

    let meta = HttpResponse {
        status: response.status().as_u16(),
        headers: response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect(),
    };
    let bytes = response
        .body_mut()
        .with_config()
        .limit(max_body_size)
        .read_to_vec()?;
    Ok((bytes, meta))
}

fn with_headers<B>(mut builder: RequestBuilder<B>, request: &HttpRequest) -> RequestBuilder<B> {
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(directive) = cache_control(request) {
        builder = builder.header("cache-control", directive);
    }
    builder
}

/// The `cache-control` value implied by the request's policy, unless the
/// request already carries one.
fn cache_control(request: &HttpRequest) -> Option<&'static str> {
    if request.header("cache-control").is_some() {
        return None;
    }
    request.cache.cache_control()
}

fn send(builder: RequestBuilder<WithBody>, body: Option<&[u8]>) -> Result<Response<Body>, ureq::Error> {
    match body {
        Some(bytes) => builder.send(bytes),
        None => builder.send_empty(),
    }
}

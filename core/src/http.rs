//! HTTP request and response descriptors as plain data.
//!
//! # Design
//! The integrator never speaks HTTP itself. An `HttpRequest` is an opaque
//! description handed to a `Transport`, and an `HttpResponse` is the
//! metadata a transport reports back beside the raw body bytes. Both use
//! owned fields so they can be cloned onto whatever thread the transport
//! runs its I/O on.

use serde::Serialize;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// Cache directive carried by a request.
///
/// Transports translate this into whatever their network layer understands;
/// a transport with no cache may ignore it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CachePolicy {
    /// Defer to the protocol's own caching rules.
    #[default]
    UseProtocol,
    /// Always go to the origin.
    ReloadIgnoringCache,
    /// Accept a stale cached response if one exists.
    ReturnCacheElseLoad,
}

impl CachePolicy {
    /// The `cache-control` value this policy maps to, if any.
    pub fn cache_control(&self) -> Option<&'static str> {
        match self {
            CachePolicy::UseProtocol => None,
            CachePolicy::ReloadIgnoringCache => Some("no-cache"),
            CachePolicy::ReturnCacheElseLoad => Some("max-stale"),
        }
    }
}

/// An outbound call described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub cache: CachePolicy,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: &str) -> Self {
        Self {
            method,
            url: url.to_string(),
            headers: Vec::new(),
            body: None,
            cache: CachePolicy::default(),
        }
    }

    pub fn get(url: &str) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: &str) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `payload` as the JSON body and tag the content type.
    pub fn with_json<T: Serialize>(self, payload: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(payload)?;
        Ok(self
            .with_header("content-type", "application/json")
            .with_body(body))
    }

    pub fn with_cache(mut self, cache: CachePolicy) -> Self {
        self.cache = cache;
        self
    }

    /// Case-insensitive lookup of the first header named `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// The URL with userinfo, query and fragment removed, safe to log.
    pub fn log_target(&self) -> String {
        let url = &self.url;
        let end = url.find(|c: char| c == '?' || c == '#').unwrap_or(url.len());
        let url = &url[..end];
        match url.split_once("://") {
            Some((scheme, rest)) => {
                let (authority, path) = rest.split_at(rest.find('/').unwrap_or(rest.len()));
                let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
                format!("{scheme}://{host}{path}")
            }
            None => url.to_string(),
        }
    }
}

/// Response metadata reported by a transport alongside the body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

impl HttpResponse {
    /// Case-insensitive lookup of the first header named `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

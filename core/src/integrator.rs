//! Decode-and-dispatch over a pluggable transport.
//!
//! # Design
//! `Integrator` holds a transport, a default request and a decoder, and no
//! mutable state. Each `integrate` call is one linear pipeline: hand the
//! request to the transport, classify what comes back, decode only when
//! bytes arrived, and hand exactly one `IntegrationOutcome` to the caller.
//!
//! Failures never fabricate a value. An error or an empty body is reported
//! as such; the decoder is not asked to make something out of nothing.
//!
//! The callback runs on whatever thread the transport completes on.

use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::decode::{Decoder, Json};
use crate::error::{IntegrationError, TransportError};
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::{Completion, RawOutcome, Transport};

/// The single result of one `integrate` call.
pub type IntegrationOutcome<U> = Result<U, IntegrationError>;

/// A decoded value together with the response metadata it arrived with.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<U> {
    pub value: U,
    pub response: Option<HttpResponse>,
}

/// Runs requests through a `Transport` and decodes their bodies.
///
/// The request given at construction is only a default: `integrate` always
/// executes the request passed at the call site, and `integrate_default`
/// executes the stored one.
#[derive(Debug, Clone)]
pub struct Integrator<T, D = Json> {
    transport: T,
    request: HttpRequest,
    decoder: D,
}

impl<T: Transport> Integrator<T, Json> {
    pub fn new(transport: T, request: HttpRequest) -> Self {
        Self {
            transport,
            request,
            decoder: Json,
        }
    }
}

impl<T: Transport, D: Decoder> Integrator<T, D> {
    /// Swap the body format.
    pub fn with_decoder<E: Decoder>(self, decoder: E) -> Integrator<T, E> {
        Integrator {
            transport: self.transport,
            request: self.request,
            decoder,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The construction-time request used by `integrate_default`.
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// Execute `request` and deliver the decoded body to `on_complete`.
    pub fn integrate<U, F>(&self, request: &HttpRequest, on_complete: F)
    where
        U: DeserializeOwned + Send + 'static,
        F: FnOnce(IntegrationOutcome<U>) + Send + 'static,
    {
        self.integrate_with_response::<U, _>(request, move |outcome| {
            on_complete(outcome.map(|decoded: Decoded<U>| decoded.value))
        })
    }

    /// Execute the construction-time request.
    pub fn integrate_default<U, F>(&self, on_complete: F)
    where
        U: DeserializeOwned + Send + 'static,
        F: FnOnce(IntegrationOutcome<U>) + Send + 'static,
    {
        self.integrate(&self.request, on_complete)
    }

    /// Like `integrate`, but keeps the transport's response metadata.
    pub fn integrate_with_response<U, F>(&self, request: &HttpRequest, on_complete: F)
    where
        U: DeserializeOwned + Send + 'static,
        F: FnOnce(IntegrationOutcome<Decoded<U>>) + Send + 'static,
    {
        let endpoint = format!("{} {}", request.method.as_str(), request.log_target());
        debug!(endpoint = %endpoint, "dispatching request");

        let decoder = self.decoder.clone();
        let completion = Completion::new(move |raw| on_complete(resolve(&decoder, &endpoint, raw)));
        self.transport.execute(request, completion);
    }

    /// Await the outcome instead of passing a callback.
    pub async fn fetch<U>(&self, request: &HttpRequest) -> IntegrationOutcome<U>
    where
        U: DeserializeOwned + Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<IntegrationOutcome<U>>();
        self.integrate(request, move |outcome| {
            // The receiver is gone only if the caller stopped waiting.
            let _ = tx.send(outcome);
        });
        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(IntegrationError::Transport(TransportError::abandoned())),
        }
    }
}

fn resolve<U, D>(decoder: &D, endpoint: &str, raw: RawOutcome) -> IntegrationOutcome<Decoded<U>>
where
    U: DeserializeOwned,
    D: Decoder,
{
    match raw {
        RawOutcome::Error(err) => {
            warn!(endpoint, error = %err, "transport failed");
            Err(IntegrationError::Transport(err))
        }
        RawOutcome::Empty { response } => no_data(endpoint, response.as_ref()),
        // `Bytes` can be built by hand, so the empty check is repeated here.
        RawOutcome::Bytes { body, response } if body.is_empty() => no_data(endpoint, response.as_ref()),
        RawOutcome::Bytes { body, response } => match decoder.decode(&body) {
            Ok(value) => {
                debug!(endpoint, bytes = body.len(), "decoded response");
                Ok(Decoded { value, response })
            }
            Err(err) => {
                warn!(endpoint, error = %err, "decoding response failed");
                Err(IntegrationError::Decode(err))
            }
        },
    }
}

fn no_data<U>(endpoint: &str, response: Option<&HttpResponse>) -> IntegrationOutcome<U> {
    warn!(endpoint, status = response.map(|r| r.status), "no data returned");
    Err(IntegrationError::NoData)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;

    use serde::Deserialize;

    use crate::error::DecodeError;
    use crate::transport::FnTransport;

    #[derive(Debug, Clone, Deserialize, PartialEq)]
    struct User {
        id: u64,
        name: String,
        email: String,
    }

    const ANN: &[u8] = br#"{"id":1,"name":"Ann","email":"a@x.com"}"#;

    fn ann() -> User {
        User {
            id: 1,
            name: "Ann".to_string(),
            email: "a@x.com".to_string(),
        }
    }

    fn ok() -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
        }
    }

    fn request() -> HttpRequest {
        HttpRequest::get("https://example.com/api/users")
    }

    /// Serves `body` for every request.
    fn serving(body: &'static [u8]) -> FnTransport<impl Fn(&HttpRequest, Completion)> {
        FnTransport(move |_: &HttpRequest, completion: Completion| {
            completion.succeed(body.to_vec(), ok())
        })
    }

    /// Decoder that counts its invocations and refuses to decode.
    #[derive(Clone, Default)]
    struct CountingDecoder {
        calls: Arc<AtomicUsize>,
    }

    impl Decoder for CountingDecoder {
        fn decode<U: DeserializeOwned>(&self, bytes: &[u8]) -> Result<U, DecodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(DecodeError::new("counting decoder never decodes", bytes))
        }
    }

    /// Runs one `integrate` call and returns every outcome delivered.
    fn collect<T, D>(integrator: &Integrator<T, D>, req: &HttpRequest) -> Vec<IntegrationOutcome<User>>
    where
        T: Transport,
        D: Decoder,
    {
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let sink = outcomes.clone();
        integrator.integrate(req, move |outcome: IntegrationOutcome<User>| {
            sink.lock().unwrap().push(outcome);
        });
        Arc::try_unwrap(outcomes).unwrap().into_inner().unwrap()
    }

    #[test]
    fn success_delivers_decoded_value() {
        let integrator = Integrator::new(serving(ANN), request());
        let outcomes = collect(&integrator, &request());
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].as_ref().unwrap(), &ann());
    }

    #[test]
    fn transport_error_skips_decoder() {
        let decoder = CountingDecoder::default();
        let transport = FnTransport(|_: &HttpRequest, completion: Completion| {
            completion.complete(Some(ANN.to_vec()), None, Some(TransportError::new("connection refused")))
        });
        let integrator = Integrator::new(transport, request()).with_decoder(decoder.clone());

        let outcomes = collect(&integrator, &request());
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            &outcomes[0],
            Err(IntegrationError::Transport(e)) if e.message() == "connection refused"
        ));
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_body_is_no_data() {
        let decoder = CountingDecoder::default();
        let transport = FnTransport(|_: &HttpRequest, completion: Completion| {
            completion.complete(None, Some(ok()), None)
        });
        let integrator = Integrator::new(transport, request()).with_decoder(decoder.clone());

        let outcomes = collect(&integrator, &request());
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], Err(IntegrationError::NoData)));
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_body_is_no_data_not_a_default_value() {
        #[derive(Debug, Default, Deserialize)]
        struct Lenient {
            #[serde(default)]
            _items: Vec<u64>,
        }

        let transport = FnTransport(|_: &HttpRequest, completion: Completion| {
            completion.succeed(Vec::new(), ok())
        });
        let integrator = Integrator::new(transport, request());
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        integrator.integrate(&request(), move |outcome: IntegrationOutcome<Lenient>| {
            *sink.lock().unwrap() = Some(outcome);
        });
        let outcome = seen.lock().unwrap().take().unwrap();
        assert!(matches!(outcome, Err(IntegrationError::NoData)));
    }

    #[test]
    fn missing_field_is_decode_failure() {
        let integrator = Integrator::new(serving(br#"{"id":1,"name":"Ann"}"#), request());
        let outcomes = collect(&integrator, &request());
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            Err(IntegrationError::Decode(err)) => {
                assert!(err.message.contains("email"), "{}", err.message);
                assert_eq!(err.body, r#"{"id":1,"name":"Ann"}"#);
            }
            other => panic!("expected decode failure, got {other:?}"),
        }
    }

    #[test]
    fn type_mismatch_is_decode_failure() {
        let integrator = Integrator::new(serving(br#"{"id":"one","name":"Ann","email":"a@x.com"}"#), request());
        let outcomes = collect(&integrator, &request());
        assert!(matches!(outcomes[0], Err(IntegrationError::Decode(_))));
    }

    #[test]
    fn hand_built_empty_bytes_are_no_data() {
        /// Decodes empty input as JSON `null` instead of failing.
        #[derive(Clone, Default)]
        struct NullOnEmpty {
            calls: Arc<AtomicUsize>,
        }

        impl Decoder for NullOnEmpty {
            fn decode<U: DeserializeOwned>(&self, bytes: &[u8]) -> Result<U, DecodeError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let bytes: &[u8] = if bytes.is_empty() { b"null" } else { bytes };
                Json.decode(bytes)
            }
        }

        let decoder = NullOnEmpty::default();
        let transport = FnTransport(|_: &HttpRequest, completion: Completion| {
            completion.deliver(RawOutcome::Bytes {
                body: Vec::new(),
                response: Some(ok()),
            })
        });
        let integrator = Integrator::new(transport, request()).with_decoder(decoder.clone());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        integrator.integrate(&request(), move |outcome: IntegrationOutcome<Option<u64>>| {
            sink.lock().unwrap().push(outcome);
        });

        let outcomes = seen.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], Err(IntegrationError::NoData)));
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn shared_integrator_serves_concurrent_calls() {
        // Echoes the last path segment back as the user's name, from a
        // separate thread per call.
        let transport = FnTransport(|req: &HttpRequest, completion: Completion| {
            let name = req.url.rsplit('/').next().unwrap_or_default().to_string();
            thread::spawn(move || {
                let body = format!(r#"{{"id":1,"name":"{name}","email":"{name}@x.com"}}"#);
                completion.succeed(body.into_bytes(), ok())
            });
        });
        let integrator = Arc::new(Integrator::new(transport, request()));
        let (tx, rx) = std::sync::mpsc::channel();

        let callers: Vec<_> = (0..16)
            .map(|i| {
                let integrator = integrator.clone();
                let tx = tx.clone();
                thread::spawn(move || {
                    let req = HttpRequest::get(&format!("https://example.com/api/users/user{i}"));
                    integrator.integrate(&req, move |outcome: IntegrationOutcome<User>| {
                        tx.send((i, outcome)).unwrap();
                    });
                })
            })
            .collect();
        for caller in callers {
            caller.join().unwrap();
        }
        drop(tx);

        let mut delivered: Vec<(usize, IntegrationOutcome<User>)> = rx.iter().collect();
        delivered.sort_by_key(|(i, _)| *i);
        assert_eq!(delivered.len(), 16);
        for (i, outcome) in delivered {
            let user = outcome.unwrap();
            assert_eq!(user.name, format!("user{i}"));
            assert_eq!(user.email, format!("user{i}@x.com"));
        }
    }

    #[test]
    fn decoder_runs_once_on_bytes() {
        let decoder = CountingDecoder::default();
        let integrator = Integrator::new(serving(ANN), request()).with_decoder(decoder.clone());
        let outcomes = collect(&integrator, &request());
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], Err(IntegrationError::Decode(_))));
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_completion_still_delivers_once() {
        let transport = FnTransport(|_: &HttpRequest, completion: Completion| drop(completion));
        let integrator = Integrator::new(transport, request());
        let outcomes = collect(&integrator, &request());
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], Err(IntegrationError::Transport(_))));
    }

    #[test]
    fn every_path_delivers_exactly_once() {
        let responders: [fn(Completion); 5] = [
            |c| c.succeed(ANN.to_vec(), ok()),
            |c| c.fail(TransportError::new("dns")),
            |c| c.complete(None, None, None),
            |c| c.succeed(b"not json".to_vec(), ok()),
            drop,
        ];
        for respond in responders {
            let calls = Arc::new(AtomicUsize::new(0));
            let counter = calls.clone();
            let integrator = Integrator::new(
                FnTransport(move |_: &HttpRequest, c: Completion| respond(c)),
                request(),
            );
            integrator.integrate(&request(), move |_: IntegrationOutcome<User>| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn repeated_calls_are_independent() {
        let integrator = Integrator::new(serving(ANN), request());
        let first = collect(&integrator, &request());
        let second = collect(&integrator, &request());
        assert_eq!(first[0].as_ref().unwrap(), &ann());
        assert_eq!(second[0].as_ref().unwrap(), &ann());
    }

    #[test]
    fn call_site_request_is_executed() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let transport = FnTransport(move |req: &HttpRequest, completion: Completion| {
            log.lock().unwrap().push(req.url.clone());
            completion.succeed(ANN.to_vec(), ok())
        });
        let integrator = Integrator::new(transport, HttpRequest::get("http://default/users/1"));

        integrator.integrate(&HttpRequest::get("http://call-site/users/1"), |_: IntegrationOutcome<User>| {});
        integrator.integrate_default(|_: IntegrationOutcome<User>| {});

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["http://call-site/users/1".to_string(), "http://default/users/1".to_string()]
        );
    }

    #[test]
    fn integrate_with_response_keeps_metadata() {
        let integrator = Integrator::new(serving(ANN), request());
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        integrator.integrate_with_response(&request(), move |outcome: IntegrationOutcome<Decoded<User>>| {
            *sink.lock().unwrap() = Some(outcome);
        });
        let decoded = seen.lock().unwrap().take().unwrap().unwrap();
        assert_eq!(decoded.value, ann());
        let response = decoded.response.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.header("Content-Type"), Some("application/json"));
    }

    #[test]
    fn callback_runs_on_transport_thread() {
        let transport = FnTransport(|_: &HttpRequest, completion: Completion| {
            thread::spawn(move || completion.succeed(ANN.to_vec(), ok()));
        });
        let integrator = Integrator::new(transport, request());
        let (tx, rx) = std::sync::mpsc::channel();
        let caller = thread::current().id();
        integrator.integrate(&request(), move |outcome: IntegrationOutcome<User>| {
            tx.send((outcome, thread::current().id())).unwrap();
        });
        let (outcome, delivered_on) = rx.recv().unwrap();
        assert_eq!(outcome.unwrap(), ann());
        assert_ne!(delivered_on, caller);
    }

    #[tokio::test]
    async fn fetch_awaits_threaded_transport() {
        let transport = FnTransport(|_: &HttpRequest, completion: Completion| {
            thread::spawn(move || completion.succeed(ANN.to_vec(), ok()));
        });
        let integrator = Integrator::new(transport, request());
        let user: User = integrator.fetch(&request()).await.unwrap();
        assert_eq!(user, ann());
    }

    #[tokio::test]
    async fn fetch_reports_no_data() {
        let transport = FnTransport(|_: &HttpRequest, completion: Completion| {
            completion.complete(None, None, None)
        });
        let integrator = Integrator::new(transport, request());
        let outcome = integrator.fetch::<User>(&request()).await;
        assert!(matches!(outcome, Err(IntegrationError::NoData)));
    }
}

use crate::collaborators::InstallationIdService;
use crate::errors::CollaboratorError;
use crate::events::EventSink;
use crate::gate::{Destination, Presenter};
use crate::remote_config::ConfigSource;
use crate::store::{MemoryStateStore, StateStore, StoreError};
use crate::transport::{Transport, TransportError, TransportResponse};
use async_trait::async_trait;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

/// Local HTTP server answering every request with `handler`.
pub struct TestServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn spawn<F>(handler: F) -> Self
    where
        F: Fn(&Request<Incoming>) -> Response<Full<Bytes>> + Send + Sync + 'static,
    {
        Self::spawn_delayed(Duration::ZERO, handler).await
    }

    /// Every response is held back for `delay` before being sent.
    pub async fn spawn_delayed<F>(delay: Duration, handler: F) -> Self
    where
        F: Fn(&Request<Incoming>) -> Response<Full<Bytes>> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to address");
        let addr = listener.local_addr().unwrap();
        let handler = Arc::new(handler);

        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let io = TokioIo::new(stream);
                let handler = handler.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let response = (handler.as_ref())(&req);
                        async move {
                            if !delay.is_zero() {
                                tokio::time::sleep(delay).await;
                            }
                            Ok::<_, Infallible>(response)
                        }
                    });
                    let _ = Builder::new(TokioExecutor::new())
                        .serve_connection(io, service)
                        .await;
                });
            }
        });

        TestServer { addr, handle }
    }

    pub fn url(&self, path: &str) -> Url {
        Url::parse(&format!("http://{}{}", self.addr, path)).unwrap()
    }

    pub fn text(status: u16, body: &str) -> Response<Full<Bytes>> {
        Self::response(status, "text/plain", body)
    }

    pub fn json(status: u16, body: &str) -> Response<Full<Bytes>> {
        Self::response(status, "application/json", body)
    }

    pub fn redirect(location: &str) -> Response<Full<Bytes>> {
        Response::builder()
            .status(302)
            .header("location", location)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn response(status: u16, content_type: &str, body: &str) -> Response<Full<Bytes>> {
        Response::builder()
            .status(status)
            .header("content-type", content_type)
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// How a scripted fake answers.
#[derive(Clone)]
enum Script<T> {
    Ready(T),
    After(Duration, T),
    Never,
}

impl<T: Clone> Script<T> {
    async fn play(&self) -> T {
        match self {
            Script::Ready(value) => value.clone(),
            Script::After(delay, value) => {
                tokio::time::sleep(*delay).await;
                value.clone()
            }
            Script::Never => std::future::pending().await,
        }
    }
}

type ConfigAnswer = Result<Option<Value>, String>;

pub struct StaticConfigSource {
    script: Script<ConfigAnswer>,
    calls: AtomicUsize,
}

impl StaticConfigSource {
    fn new(script: Script<ConfigAnswer>) -> Self {
        StaticConfigSource {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn record(record: Value) -> Self {
        Self::new(Script::Ready(Ok(Some(record))))
    }

    pub fn record_after(delay: Duration, record: Value) -> Self {
        Self::new(Script::After(delay, Ok(Some(record))))
    }

    pub fn absent() -> Self {
        Self::new(Script::Ready(Ok(None)))
    }

    pub fn failing() -> Self {
        Self::new(Script::Ready(Err("connection reset".into())))
    }

    pub fn never() -> Self {
        Self::new(Script::Never)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    async fn fetch(&self) -> Result<Option<Value>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script.play().await.map_err(TransportError::Timeout)
    }
}

type TransportAnswer = Result<TransportResponse, String>;

pub struct ScriptedTransport {
    script: Script<TransportAnswer>,
    requests: Mutex<Vec<Url>>,
}

impl ScriptedTransport {
    fn new(script: Script<TransportAnswer>) -> Self {
        ScriptedTransport {
            script,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn ok(body: &str) -> TransportAnswer {
        Ok(TransportResponse {
            status: 200,
            body: Bytes::from(body.to_string()),
        })
    }

    pub fn json(body: &str) -> Self {
        Self::new(Script::Ready(Self::ok(body)))
    }

    pub fn failing() -> Self {
        Self::new(Script::Ready(Err("backend".into())))
    }

    pub fn never() -> Self {
        Self::new(Script::Never)
    }

    pub fn requests(&self) -> Vec<Url> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: Url) -> Result<TransportResponse, TransportError> {
        self.requests.lock().push(url);
        self.script.play().await.map_err(TransportError::Timeout)
    }
}

pub struct FailingInstallationId;

#[async_trait]
impl InstallationIdService for FailingInstallationId {
    async fn installation_id(&self) -> Result<String, CollaboratorError> {
        Err(CollaboratorError("service unavailable".into()))
    }
}

#[derive(Default)]
pub struct RecordingEventSink {
    sessions: Mutex<Vec<String>>,
    events: Mutex<Vec<(String, Option<Value>)>>,
}

impl RecordingEventSink {
    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|(n, _)| n == name).count()
    }

    pub fn sessions(&self) -> Vec<String> {
        self.sessions.lock().clone()
    }
}

impl EventSink for RecordingEventSink {
    fn log_session(&self, session_id: &str, _attribution_token: Option<&str>) {
        self.sessions.lock().push(session_id.to_string());
    }

    fn log_event(&self, _session_id: &str, name: &str, payload: Option<Value>) {
        self.events.lock().push((name.to_string(), payload));
    }
}

/// Memory store that counts writes per key.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStateStore,
    writes: Mutex<HashMap<String, usize>>,
}

impl CountingStore {
    pub fn writes(&self, key: &str) -> usize {
        self.writes.lock().get(key).copied().unwrap_or(0)
    }
}

impl StateStore for CountingStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        *self.writes.lock().entry(key.to_string()).or_default() += 1;
        self.inner.set(key, value)
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.inner.clear()
    }
}

#[derive(Default)]
pub struct RecordingPresenter {
    calls: Mutex<Vec<Destination>>,
}

impl RecordingPresenter {
    pub fn calls(&self) -> Vec<Destination> {
        self.calls.lock().clone()
    }
}

impl Presenter for RecordingPresenter {
    fn on_resolved(&self, destination: Destination) {
        self.calls.lock().push(destination);
    }
}

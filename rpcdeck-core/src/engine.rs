//! # Engine
//!
//! The command surface of `rpcdeck-core`. A presentation layer issues commands
//! ([`Engine::connect`], [`Engine::select_method`], [`Engine::send`], [`Engine::cancel`], ...)
//! and receives [`Event`]s through the [`EventSink`] the engine was built with.
//!
//! ## Calls
//!
//! User calls run under a single-flight guard: a call holds it from dispatch until it
//! completes, so concurrent sends execute one after another in the order they acquired it.
//! The exception is a client-streaming call: while one is open, sends to the same method push
//! onto its stream without touching the guard. The stream half-closes on
//! [`Engine::close_stream`], after which the call awaits its response.
//!
//! Completion of a dispatched call is reported only through [`Event::CallEnded`]; `send` fails
//! only for problems found before dispatch (unknown method, undecodable payload, stream
//! mismatch).
use crate::connection::{ConnectionError, ConnectivityState, Session};
use crate::events::{Event, EventSink};
use crate::options::ConnectionOptions;
use crate::schema::{Descriptor, LookupError, SchemaRegistry, ServiceEntry};
use crate::store::{KeyValueStore, StoreError};
use crate::telemetry::{CallContext, Collector};
use crate::view::{MessageView, PayloadDecodeError, build_message, build_view};
use futures_util::future::{AbortHandle, Abortable};
use prost_reflect::{DynamicMessage, MethodDescriptor};
use std::sync::{Arc, MutexGuard};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

mod call;

use call::{Call, CallPattern, Outbound};

/// Key the last successful connection options are persisted under.
pub const SAVED_OPTIONS_KEY: &str = "workspace.default";

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error(transparent)]
    PayloadDecode(#[from] PayloadDecodeError),
    #[error("A client stream to '{open}' is still open, end it before streaming to '{requested}'")]
    StreamMismatch { open: String, requested: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Failed to encode or decode saved options: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn KeyValueStore>,
    events: Arc<dyn EventSink>,
    session: Mutex<Option<Arc<Session>>>,
    /// Single-flight guard for dispatched calls.
    flight: Mutex<()>,
    call: std::sync::Mutex<CallSession>,
    pending_persist: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// State of the call currently holding the single-flight guard.
#[derive(Default)]
struct CallSession {
    cancel: Option<AbortHandle>,
    stream: Option<OpenStream>,
    in_flight: bool,
}

struct OpenStream {
    method: String,
    tx: mpsc::UnboundedSender<DynamicMessage>,
}

/// Resets the call state when a dispatched call is over, however it ended.
struct CallRelease<'a> {
    call: &'a std::sync::Mutex<CallSession>,
}

impl Drop for CallRelease<'_> {
    fn drop(&mut self) {
        *lock(self.call) = CallSession::default();
    }
}

fn lock<T>(mutex: &std::sync::Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Engine {
    pub fn new(store: Arc<dyn KeyValueStore>, events: Arc<dyn EventSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                events,
                session: Mutex::new(None),
                flight: Mutex::new(()),
                call: std::sync::Mutex::new(CallSession::default()),
                pending_persist: std::sync::Mutex::new(None),
            }),
        }
    }

    /// The options of the last successful [`Engine::connect`], if any were saved.
    pub async fn get_saved_options(&self) -> Result<Option<ConnectionOptions>, EngineError> {
        let pending = lock(&self.inner.pending_persist).take();
        if let Some(task) = pending
            && let Err(err) = task.await
        {
            tracing::warn!(error = %err, "persisting connection options did not complete");
        }

        let store = self.inner.store.clone();
        let saved = tokio::task::spawn_blocking(move || store.get(SAVED_OPTIONS_KEY)).await??;

        match saved {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Replaces the current session with a new one connected with `options`.
    ///
    /// The previous session is closed first. On failure no session is installed. On success
    /// the options are persisted and schema discovery starts, both in the background.
    pub async fn connect(&self, options: ConnectionOptions) -> Result<(), EngineError> {
        let encoded = serde_json::to_vec(&options)?;
        let mut slot = self.inner.session.lock().await;

        lock(&self.inner.call).stream = None;
        if let Some(previous) = slot.take() {
            previous.close().await?;
        }

        let session = Arc::new(Session::open(options).await?);
        session.add_stats_handler(Arc::new(Collector::new(self.inner.events.clone())));

        self.inner.events.publish(Event::ConnectionEstablished {
            address: session.options().address.clone(),
        });
        if let Err(err) = session.start_watcher(self.inner.events.clone()).await {
            let _ = session.close().await;
            return Err(err.into());
        }

        *slot = Some(session.clone());
        drop(slot);

        if session.options().reflect {
            self.spawn_discovery(session);
        }
        self.spawn_persist(encoded);

        Ok(())
    }

    /// Closes the current session. Does nothing when disconnected.
    pub async fn close(&self) -> Result<(), EngineError> {
        let previous = self.inner.session.lock().await.take();
        lock(&self.inner.call).stream = None;

        if let Some(session) = previous {
            session.close().await?;
        }
        Ok(())
    }

    /// Connectivity of the current session, `None` when disconnected.
    pub async fn state(&self) -> Option<ConnectivityState> {
        self.session().await.map(|session| session.state())
    }

    /// Services discovered on the current session.
    pub async fn services(&self) -> Vec<ServiceEntry> {
        self.registry().await.services()
    }

    /// Looks up a service, message or enum of the current session by full name.
    pub async fn describe(&self, symbol: &str) -> Result<Descriptor, LookupError> {
        self.registry()
            .await
            .get_descriptor_by_symbol(symbol)
            .ok_or_else(|| LookupError::DescriptorNotFound(symbol.to_string()))
    }

    /// Resolves a method and publishes the shape of its input message.
    pub async fn select_method(&self, full_name: &str) -> Result<MessageView, EngineError> {
        let method = self.registry().await.find_method(full_name)?;
        let view = build_view(&method.input());

        self.inner
            .events
            .publish(Event::InputShapeChanged { view: view.clone() });
        Ok(view)
    }

    /// Sends `payload` (JSON) to the method named `full_name` (`/package.Service/Method`).
    ///
    /// Returns once the call is over, or right away when the message went to an open client
    /// stream.
    pub async fn send(&self, full_name: &str, payload: &str) -> Result<(), EngineError> {
        let session = self.session().await;
        let registry = session
            .as_ref()
            .map(|session| session.registry())
            .unwrap_or_default();

        let method = registry.find_method(full_name)?;
        let request = build_message(&method.input(), payload)?;

        // Only a live session can resolve methods.
        let Some(session) = session else {
            return Err(LookupError::DescriptorNotFound(full_name.to_string()).into());
        };

        let pattern = CallPattern::of(&method);

        let request = match pattern {
            CallPattern::ClientStreaming => match self.push_to_open_stream(&method, request)? {
                Some(request) => request,
                None => return Ok(()),
            },
            CallPattern::Bidirectional => {
                let _flight = self.inner.flight.lock().await;
                self.inner.events.publish(Event::CallStarted {
                    client_streaming: true,
                    server_streaming: true,
                });
                tracing::warn!(
                    method = %method.full_name(),
                    "bidirectional streaming calls are not supported"
                );
                return Ok(());
            }
            CallPattern::Unary | CallPattern::ServerStreaming => request,
        };

        self.dispatch(&session, method, pattern, request).await;
        Ok(())
    }

    /// Aborts the call in flight, if any. It completes with `CANCELLED`.
    pub fn cancel(&self) {
        if let Some(handle) = &lock(&self.inner.call).cancel {
            handle.abort();
        }
    }

    /// Half-closes the open client stream so its call can complete. Returns whether a stream
    /// was open.
    pub fn close_stream(&self) -> bool {
        lock(&self.inner.call).stream.take().is_some()
    }

    pub fn is_call_in_flight(&self) -> bool {
        lock(&self.inner.call).in_flight
    }

    async fn dispatch(
        &self,
        session: &Session,
        method: MethodDescriptor,
        pattern: CallPattern,
        request: DynamicMessage,
    ) {
        let _flight = self.inner.flight.lock().await;

        let client = session.grpc_client();
        let (cancel, registration) = AbortHandle::new_pair();

        let outbound = {
            let mut call = lock(&self.inner.call);
            call.in_flight = true;
            call.cancel = Some(cancel);

            if pattern == CallPattern::ClientStreaming {
                let (tx, rx) = mpsc::unbounded_channel();
                // The receiver is alive, the send cannot fail.
                let _ = tx.send(request);
                call.stream = Some(OpenStream {
                    method: method.full_name().to_string(),
                    tx,
                });
                Outbound::Stream(rx)
            } else {
                Outbound::Single(request)
            }
        };
        let _release = CallRelease {
            call: &self.inner.call,
        };

        self.inner.events.publish(Event::CallStarted {
            client_streaming: method.is_client_streaming(),
            server_streaming: method.is_server_streaming(),
        });

        let call = Call {
            tracker: client.track(CallContext::user()),
            client,
            method,
            headers: session.options().metadata.clone(),
        };

        if Abortable::new(call.run(outbound), registration)
            .await
            .is_err()
        {
            tracing::debug!("call cancelled");
        }
    }

    /// Pushes onto the open client stream. Gives the request back when no stream is open.
    fn push_to_open_stream(
        &self,
        method: &MethodDescriptor,
        request: DynamicMessage,
    ) -> Result<Option<DynamicMessage>, EngineError> {
        let mut call = lock(&self.inner.call);

        let Some(stream) = &call.stream else {
            return Ok(Some(request));
        };

        if stream.method != method.full_name() {
            return Err(EngineError::StreamMismatch {
                open: stream.method.clone(),
                requested: method.full_name().to_string(),
            });
        }

        match stream.tx.send(request) {
            Ok(()) => Ok(None),
            Err(mpsc::error::SendError(request)) => {
                // The call went away without releasing its stream yet.
                call.stream = None;
                Ok(Some(request))
            }
        }
    }

    fn spawn_discovery(&self, session: Arc<Session>) {
        let inner = self.inner.clone();

        tokio::spawn(async move {
            let registry = match session.discover().await {
                Ok(registry) => registry,
                Err(err) => {
                    tracing::warn!(
                        address = %session.options().address,
                        error = %err,
                        "schema discovery failed"
                    );
                    return;
                }
            };

            let current = inner.session.lock().await.clone();
            if !current.is_some_and(|current| Arc::ptr_eq(&current, &session)) {
                tracing::debug!("discarding schema of a replaced session");
                return;
            }

            let services = registry.services();
            if services.is_empty() {
                tracing::warn!(address = %session.options().address, "server exposes no services");
                return;
            }

            inner
                .events
                .publish(Event::AvailableMethodsChanged { services });
        });
    }

    /// Writes are chained so the store always ends up with the latest options.
    fn spawn_persist(&self, encoded: Vec<u8>) {
        let store = self.inner.store.clone();
        let mut pending = lock(&self.inner.pending_persist);
        let previous = pending.take();

        *pending = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }

            let write = tokio::task::spawn_blocking(move || store.set(SAVED_OPTIONS_KEY, encoded));
            match write.await {
                Ok(Ok(())) => tracing::debug!("connection options saved"),
                Ok(Err(err)) => tracing::warn!(error = %err, "failed to save connection options"),
                Err(err) => tracing::warn!(error = %err, "failed to save connection options"),
            }
        }));
    }

    async fn session(&self) -> Option<Arc<Session>> {
        self.inner.session.lock().await.clone()
    }

    async fn registry(&self) -> SchemaRegistry {
        self.session()
            .await
            .map(|session| session.registry())
            .unwrap_or_default()
    }
}

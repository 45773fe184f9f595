//! Bookkeeping shared by the endpoint handle and its reader task: requests
//! awaiting a response and the handlers for incoming messages.

use std::{
    collections::HashMap,
    future::Future,
    marker::PhantomData,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll},
};

use futures_util::ready;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::lsp::{types::Id, Response};

/// Callback for incoming requests and notifications of one method.
///
/// Receives the params (`Value::Null` when omitted) and the request id, which
/// is `None` for notifications.
pub type Handler = Arc<dyn Fn(&Value, Option<&Id>) + Send + Sync>;

/// Callback for the `error` event.
pub type ErrorHandler = Arc<dyn Fn(&Error) + Send + Sync>;

/// An incoming request or notification.
#[derive(Clone, Debug, PartialEq)]
pub struct Incoming {
    pub method: String,
    pub params: Value,
    /// Set for requests. Pass it to `respond_to_request`.
    pub id: Option<Id>,
}

struct PendingRequest {
    method: String,
    tx: oneshot::Sender<Result<Value>>,
}

#[derive(Default)]
struct Pending {
    closed: bool,
    requests: HashMap<Id, PendingRequest>,
}

#[derive(Default)]
struct Handlers {
    methods: HashMap<String, Vec<Handler>>,
    once: HashMap<String, Vec<oneshot::Sender<Incoming>>>,
    errors: Vec<ErrorHandler>,
}

#[derive(Default)]
pub(crate) struct Dispatcher {
    pending: Mutex<Pending>,
    handlers: Mutex<Handlers>,
}

// Handlers run outside of the locks, so a poisoned lock only means a panic
// while the table itself was consistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Dispatcher {
    /// Start waiting for the response to `id`.
    pub(crate) fn register(&self, id: Id, method: &str) -> Result<oneshot::Receiver<Result<Value>>> {
        let mut pending = lock(&self.pending);
        if pending.closed {
            return Err(Error::ConnectionClosed);
        }

        let (tx, rx) = oneshot::channel();
        pending.requests.insert(
            id,
            PendingRequest {
                method: method.to_owned(),
                tx,
            },
        );
        Ok(rx)
    }

    /// Stop waiting for `id` without settling it.
    pub(crate) fn forget(&self, id: &Id) {
        lock(&self.pending).requests.remove(id);
    }

    /// Settle the request the response belongs to.
    ///
    /// Fails with `UnknownRequestId` if no such request is outstanding. The
    /// response is dropped in that case.
    pub(crate) fn settle(&self, response: Response) -> Result<()> {
        let id = response.id().cloned();
        let request = id
            .as_ref()
            .and_then(|id| lock(&self.pending).requests.remove(id));
        let request = match request {
            Some(request) => request,
            None => return Err(Error::UnknownRequestId(id)),
        };

        let result = match response {
            Response::Success { result, .. } => Ok(result),
            Response::Failure { error, .. } => Err(Error::Rpc {
                method: request.method,
                error,
            }),
        };
        // The caller may have dropped the future.
        let _ = request.tx.send(result);
        Ok(())
    }

    /// Fail the request `id` because its response could not be understood.
    ///
    /// Returns `false` if no such request is outstanding.
    pub(crate) fn fail(&self, id: &Id, reason: &'static str) -> bool {
        let request = match lock(&self.pending).requests.remove(id) {
            Some(request) => request,
            None => return false,
        };
        let _ = request.tx.send(Err(Error::InvalidResponse {
            method: request.method,
            reason,
        }));
        true
    }

    pub(crate) fn pending_requests(&self) -> usize {
        lock(&self.pending).requests.len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        lock(&self.pending).closed
    }

    // Handlers registered after close would never run, and could keep the
    // connection's writer alive.
    fn registry(&self) -> Option<MutexGuard<'_, Handlers>> {
        let registry = lock(&self.handlers);
        if self.is_closed() {
            None
        } else {
            Some(registry)
        }
    }

    pub(crate) fn on(&self, method: &str, handler: Handler) {
        if let Some(mut registry) = self.registry() {
            registry
                .methods
                .entry(method.to_owned())
                .or_default()
                .push(handler);
        }
    }

    pub(crate) fn once(&self, method: &str) -> Once {
        let (tx, rx) = oneshot::channel();
        if let Some(mut registry) = self.registry() {
            registry.once.entry(method.to_owned()).or_default().push(tx);
        }
        Once { rx }
    }

    pub(crate) fn on_error(&self, handler: ErrorHandler) {
        if let Some(mut registry) = self.registry() {
            registry.errors.push(handler);
        }
    }

    /// Invoke the handlers for the message's method in registration order.
    ///
    /// Returns the number of handlers that received it.
    pub(crate) fn dispatch(&self, incoming: Incoming) -> usize {
        let (handlers, once) = {
            let mut registry = lock(&self.handlers);
            let handlers = registry
                .methods
                .get(&incoming.method)
                .cloned()
                .unwrap_or_default();
            let once = registry.once.remove(&incoming.method).unwrap_or_default();
            (handlers, once)
        };

        for handler in &handlers {
            handler(&incoming.params, incoming.id.as_ref());
        }
        let mut count = handlers.len();
        for tx in once {
            if tx.send(incoming.clone()).is_ok() {
                count += 1;
            }
        }
        count
    }

    /// Emit the `error` event.
    pub(crate) fn report(&self, err: &Error) {
        let handlers = lock(&self.handlers).errors.clone();
        for handler in &handlers {
            handler(err);
        }
    }

    /// Fail every outstanding request and drop all handlers.
    ///
    /// Returns the number of requests that were still waiting, or `None` if
    /// already closed.
    pub(crate) fn close(&self) -> Option<usize> {
        let requests = {
            let mut pending = lock(&self.pending);
            if pending.closed {
                return None;
            }
            pending.closed = true;
            std::mem::take(&mut pending.requests)
        };
        let count = requests.len();
        for (_, request) in requests {
            let _ = request.tx.send(Err(Error::ConnectionClosed));
        }

        // Handlers may hold endpoint handles that keep the writer alive.
        let handlers = std::mem::take(&mut *lock(&self.handlers));
        drop(handlers);
        Some(count)
    }
}

/// Response to a request sent with [`Endpoint::send`](super::Endpoint::send).
///
/// The request is already written when this is created. Awaiting it yields the
/// result deserialized as `T`.
#[must_use = "the response is lost if the future is dropped"]
pub struct ResponseFuture<T> {
    id: Option<Id>,
    method: String,
    rx: oneshot::Receiver<Result<Value>>,
    _result: PhantomData<fn() -> T>,
}

impl<T> ResponseFuture<T> {
    pub(crate) fn new(id: Id, method: String, rx: oneshot::Receiver<Result<Value>>) -> Self {
        ResponseFuture {
            id: Some(id),
            method,
            rx,
            _result: PhantomData,
        }
    }

    /// A future that fails immediately. Used when the request could not be sent.
    pub(crate) fn failed(method: String, err: Error) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        ResponseFuture {
            id: None,
            method,
            rx,
            _result: PhantomData,
        }
    }

    /// The id of the request, `None` if it was never sent.
    pub fn id(&self) -> Option<&Id> {
        self.id.as_ref()
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

impl<T: DeserializeOwned> Future for ResponseFuture<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let result = match ready!(Pin::new(&mut self.rx).poll(cx)) {
            Ok(result) => result,
            Err(_) => Err(Error::ConnectionClosed),
        };

        Poll::Ready(result.and_then(|value| {
            serde_json::from_value(value).map_err(|source| Error::DeserializeResult {
                method: self.method.clone(),
                type_name: std::any::type_name::<T>(),
                source,
            })
        }))
    }
}

/// Next incoming message of a method, from [`Endpoint::once`](super::Endpoint::once).
#[must_use = "futures do nothing unless awaited"]
pub struct Once {
    rx: oneshot::Receiver<Incoming>,
}

impl Future for Once {
    type Output = Result<Incoming>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Poll::Ready(ready!(Pin::new(&mut self.rx).poll(cx)).map_err(|_| Error::ConnectionClosed))
    }
}

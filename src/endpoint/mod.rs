//! JSON-RPC endpoint for one connection to a Language Server.
//!
//! An [`Endpoint`] owns both directions of the byte stream. Outgoing messages
//! are queued to a writer task and incoming frames are decoded and dispatched
//! by a reader task, one at a time in arrival order:
//!
//! - responses settle the [`ResponseFuture`] of the request with the same id,
//! - requests and notifications are passed to the handlers registered for
//!   their method, in registration order,
//! - anything else is reported to the `error` handlers.
//!
//! Handlers run on the reader task and should not block. A handler that spawns
//! work keeps the dispatch order but not the completion order.

mod dispatch;
mod log;

use std::{
    convert::TryFrom,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, watch},
};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::Instrument;

use crate::error::{Error, Result};
use crate::lsp::{
    framed::{self, LspFrameCodec},
    types::{Id, Params},
    Message, Notification, Request, Response, ResponseError,
};

pub use dispatch::{ErrorHandler, Handler, Incoming, Once, ResponseFuture};
use dispatch::Dispatcher;
pub use self::log::LogLevel;
use self::log::Logger;

/// Configures and starts an [`Endpoint`].
#[derive(Clone, Debug)]
pub struct Builder {
    name: String,
    log_level: LogLevel,
}

impl Default for Builder {
    fn default() -> Self {
        Builder {
            name: "lsp".to_owned(),
            log_level: LogLevel::default(),
        }
    }
}

impl Builder {
    /// Name used in logs, usually the server's command.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Start the endpoint on `writer` (e.g. server's stdin) and `reader`
    /// (e.g. server's stdout).
    ///
    /// Must be called within a Tokio runtime.
    pub fn spawn<W, R>(self, writer: W, reader: R) -> Endpoint
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);
        let shared = Arc::new(Shared {
            next_id: AtomicI64::new(0),
            dispatcher: Dispatcher::default(),
            logger: Logger::new(self.name.clone(), self.log_level),
            closed_tx,
        });

        let span = tracing::debug_span!("endpoint", name = %self.name);
        tokio::spawn(
            read_loop(shared.clone(), framed::reader(reader)).instrument(span.clone()),
        );
        tokio::spawn(write_loop(shared.clone(), framed::writer(writer), outgoing_rx).instrument(span));

        Endpoint {
            shared,
            outgoing: outgoing_tx,
            closed: closed_rx,
        }
    }
}

struct Shared {
    next_id: AtomicI64,
    dispatcher: Dispatcher,
    logger: Logger,
    closed_tx: watch::Sender<bool>,
}

impl Shared {
    fn report(&self, err: Error) {
        self.logger.error(&err);
        self.dispatcher.report(&err);
    }

    fn close(&self) {
        if let Some(pending) = self.dispatcher.close() {
            self.logger.closed(pending);
            let _ = self.closed_tx.send(true);
        }
    }

    /// Process one decoded frame. Errors are fatal to the connection.
    fn handle_text(&self, text: String) -> Result<()> {
        self.logger.incoming(&text);
        let value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(source) => return Err(Error::Parse { source, text }),
        };

        match Message::try_from(value) {
            Ok(Message::Response(response)) => {
                if let Err(err) = self.dispatcher.settle(response) {
                    self.report(err);
                }
            }

            Ok(Message::Request(Request { id, method, params })) => {
                self.dispatch(Incoming {
                    method,
                    params: params.unwrap_or(Value::Null),
                    id: Some(id),
                });
            }

            Ok(Message::Notification(Notification { method, params })) => {
                self.dispatch(Incoming {
                    method,
                    params: params.unwrap_or(Value::Null),
                    id: None,
                });
            }

            Err(invalid) => {
                // A reply to one of our requests must still settle it.
                if let Some(id) = &invalid.id {
                    self.dispatcher.fail(id, invalid.reason);
                }
                self.report(Error::InvalidMessage(invalid));
            }
        }
        Ok(())
    }

    fn dispatch(&self, incoming: Incoming) {
        let method = incoming.method.clone();
        let id = incoming.id.clone();
        if self.dispatcher.dispatch(incoming) == 0 {
            self.logger.unhandled(&method, id.as_ref());
        }
    }
}

// Closes the connection when the reader task ends, including by a panic in
// the decoder or a handler.
struct CloseOnDrop(Arc<Shared>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

async fn read_loop<R>(shared: Arc<Shared>, mut reader: FramedRead<R, LspFrameCodec>)
where
    R: AsyncRead + Unpin,
{
    let _close = CloseOnDrop(shared.clone());
    while let Some(frame) = reader.next().await {
        let result = match frame {
            Ok(text) => shared.handle_text(text),
            Err(err) => Err(Error::Codec(err)),
        };
        if let Err(err) = result {
            shared.report(err);
            break;
        }
    }
}

async fn write_loop<W>(
    shared: Arc<Shared>,
    mut writer: FramedWrite<W, LspFrameCodec>,
    mut outgoing: mpsc::UnboundedReceiver<String>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(text) = outgoing.recv().await {
        if let Err(err) = writer.send(text).await {
            shared.report(Error::Write(err));
            shared.close();
            break;
        }
    }
}

/// Handle to a running connection. Cheap to clone.
#[derive(Clone)]
pub struct Endpoint {
    shared: Arc<Shared>,
    outgoing: mpsc::UnboundedSender<String>,
    closed: watch::Receiver<bool>,
}

impl Endpoint {
    /// Start an endpoint with the default configuration.
    pub fn new<W, R>(writer: W, reader: R) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        Builder::default().spawn(writer, reader)
    }

    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Send a request.
    ///
    /// The request is queued to the writer task before this returns, so it is
    /// sent even if the future is never polled. The future resolves when the
    /// response with the same id arrives, or fails when the peer responds with an
    /// error or the connection closes. `params` serializing to `null` are omitted.
    pub fn send<T, P>(&self, method: &str, params: P) -> ResponseFuture<T>
    where
        P: Serialize,
    {
        let params = match to_params(method, params) {
            Ok(params) => params,
            Err(err) => return ResponseFuture::failed(method.to_owned(), err),
        };

        let id = Id::Number(self.shared.next_id.fetch_add(1, Ordering::SeqCst));
        // Registered before writing so that the response can't arrive first.
        let rx = match self.shared.dispatcher.register(id.clone(), method) {
            Ok(rx) => rx,
            Err(err) => return ResponseFuture::failed(method.to_owned(), err),
        };

        let request = Request::new(id.clone(), method, params);
        if let Err(err) = self.write(&request.into()) {
            self.shared.dispatcher.forget(&id);
            return ResponseFuture::failed(method.to_owned(), err);
        }
        ResponseFuture::new(id, method.to_owned(), rx)
    }

    /// Send a notification. No response is expected.
    pub fn notify<P: Serialize>(&self, method: &str, params: P) -> Result<()> {
        let params = to_params(method, params)?;
        self.ensure_open()?;
        self.write(&Notification::new(method, params).into())
    }

    /// Answer a request received from the peer.
    ///
    /// Does not involve the requests sent by this endpoint.
    pub fn respond_to_request<T: Serialize>(&self, id: impl Into<Id>, result: T) -> Result<()> {
        let result = serde_json::to_value(result).map_err(Error::SerializeMessage)?;
        self.ensure_open()?;
        self.write(
            &Response::Success {
                id: id.into(),
                result,
            }
            .into(),
        )
    }

    /// Reject a request received from the peer.
    pub fn respond_with_error(&self, id: impl Into<Id>, error: ResponseError) -> Result<()> {
        self.ensure_open()?;
        self.write(
            &Response::Failure {
                id: Some(id.into()),
                error,
            }
            .into(),
        )
    }

    /// Register a handler for requests and notifications of `method`.
    pub fn on<F>(&self, method: &str, handler: F)
    where
        F: Fn(&Value, Option<&Id>) + Send + Sync + 'static,
    {
        self.shared.dispatcher.on(method, Arc::new(handler));
    }

    /// Register a handler for the `error` event.
    ///
    /// Receives framing, parse, invalid message and unknown response id errors.
    /// After a framing or parse error the connection is closed.
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.shared.dispatcher.on_error(Arc::new(handler));
    }

    /// Wait for the next request or notification of `method`.
    pub fn once(&self, method: &str) -> Once {
        self.shared.dispatcher.once(method)
    }

    /// Number of sent requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.shared.dispatcher.pending_requests()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.dispatcher.is_closed()
    }

    /// Completes when the connection is closed.
    pub async fn closed(&self) {
        let mut closed = self.closed.clone();
        loop {
            if *closed.borrow() {
                return;
            }
            if closed.changed().await.is_err() {
                return;
            }
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    fn write(&self, message: &Message) -> Result<()> {
        let text = serde_json::to_string(message).map_err(Error::SerializeMessage)?;
        self.shared.logger.outgoing(&text);
        self.outgoing
            .send(text)
            .map_err(|_| Error::ConnectionClosed)
    }
}

fn to_params<P: Serialize>(method: &str, params: P) -> Result<Option<Params>> {
    let value = serde_json::to_value(params).map_err(|source| Error::SerializeParams {
        method: method.to_owned(),
        source,
    })?;
    Params::from_value(value).map_err(|_| Error::InvalidParams {
        method: method.to_owned(),
    })
}

//! Typed methods over an [`Endpoint`].
//!
//! Each method maps to one LSP request or notification from `lsp_types`. The
//! requests return a [`ResponseFuture`] with the method's result type, so the
//! request is on the wire whether or not the future is awaited right away.

use lsp_types::{
    notification::{self as notif, Notification as LspNotification},
    request::{self as req, Request as LspRequest},
};
use serde_json::Value;

use crate::endpoint::{Endpoint, Once, ResponseFuture};
use crate::error::Result;
use crate::lsp::types::Id;

type Params<R> = <R as LspRequest>::Params;
type Response<R> = ResponseFuture<<R as LspRequest>::Result>;
type NotificationParams<N> = <N as LspNotification>::Params;

#[derive(Clone)]
pub struct LspClient {
    endpoint: Endpoint,
}

impl LspClient {
    pub fn new(endpoint: Endpoint) -> Self {
        LspClient { endpoint }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Send any request defined by `lsp_types`.
    pub fn request<R: LspRequest>(&self, params: R::Params) -> Response<R> {
        self.endpoint.send(R::METHOD, params)
    }

    /// Send any notification defined by `lsp_types`.
    pub fn notify<N: LspNotification>(&self, params: N::Params) -> Result<()> {
        self.endpoint.notify(N::METHOD, params)
    }

    pub fn initialize(&self, params: Params<req::Initialize>) -> Response<req::Initialize> {
        self.request::<req::Initialize>(params)
    }

    pub fn initialized(&self) -> Result<()> {
        self.notify::<notif::Initialized>(lsp_types::InitializedParams {})
    }

    pub fn shutdown(&self) -> Response<req::Shutdown> {
        self.request::<req::Shutdown>(())
    }

    pub fn exit(&self) -> Result<()> {
        self.notify::<notif::Exit>(())
    }

    pub fn did_open(&self, params: NotificationParams<notif::DidOpenTextDocument>) -> Result<()> {
        self.notify::<notif::DidOpenTextDocument>(params)
    }

    pub fn did_change(
        &self,
        params: NotificationParams<notif::DidChangeTextDocument>,
    ) -> Result<()> {
        self.notify::<notif::DidChangeTextDocument>(params)
    }

    pub fn did_save(&self, params: NotificationParams<notif::DidSaveTextDocument>) -> Result<()> {
        self.notify::<notif::DidSaveTextDocument>(params)
    }

    pub fn did_close(&self, params: NotificationParams<notif::DidCloseTextDocument>) -> Result<()> {
        self.notify::<notif::DidCloseTextDocument>(params)
    }

    pub fn document_symbol(
        &self,
        params: Params<req::DocumentSymbolRequest>,
    ) -> Response<req::DocumentSymbolRequest> {
        self.request::<req::DocumentSymbolRequest>(params)
    }

    pub fn references(&self, params: Params<req::References>) -> Response<req::References> {
        self.request::<req::References>(params)
    }

    pub fn definition(&self, params: Params<req::GotoDefinition>) -> Response<req::GotoDefinition> {
        self.request::<req::GotoDefinition>(params)
    }

    pub fn type_definition(
        &self,
        params: Params<req::GotoTypeDefinition>,
    ) -> Response<req::GotoTypeDefinition> {
        self.request::<req::GotoTypeDefinition>(params)
    }

    pub fn signature_help(
        &self,
        params: Params<req::SignatureHelpRequest>,
    ) -> Response<req::SignatureHelpRequest> {
        self.request::<req::SignatureHelpRequest>(params)
    }

    pub fn hover(&self, params: Params<req::HoverRequest>) -> Response<req::HoverRequest> {
        self.request::<req::HoverRequest>(params)
    }

    pub fn goto_declaration(
        &self,
        params: Params<req::GotoDeclaration>,
    ) -> Response<req::GotoDeclaration> {
        self.request::<req::GotoDeclaration>(params)
    }

    /// Answer a request the server sent, see [`LspClient::on_request`].
    pub fn respond_to_server_request<T: serde::Serialize>(
        &self,
        id: impl Into<Id>,
        result: T,
    ) -> Result<()> {
        self.endpoint.respond_to_request(id, result)
    }

    /// Register a handler for a request (or notification) from the server.
    ///
    /// The handler gets the params and the id to respond to.
    pub fn on_request<F>(&self, method: &str, handler: F)
    where
        F: Fn(&Value, Option<&Id>) + Send + Sync + 'static,
    {
        self.endpoint.on(method, handler);
    }

    /// Register a handler for a notification from the server with typed params.
    ///
    /// Notifications with params that don't match `N::Params` are logged and
    /// skipped.
    pub fn on_notification<N, F>(&self, handler: F)
    where
        N: LspNotification,
        F: Fn(N::Params) + Send + Sync + 'static,
    {
        self.endpoint.on(N::METHOD, move |params, _| {
            match serde_json::from_value::<N::Params>(params.clone()) {
                Ok(params) => handler(params),
                Err(err) => tracing::warn!("invalid params for {}: {}", N::METHOD, err),
            }
        });
    }

    /// Wait for the next message of `method` from the server.
    pub fn once(&self, method: &str) -> Once {
        self.endpoint.once(method)
    }
}

//! Client side of the Language Server Protocol's JSON-RPC transport.
//!
//! [`lsp::framed`] splits a byte stream into `Content-Length` framed messages,
//! [`Endpoint`] correlates requests with responses and dispatches everything
//! else to handlers, and [`LspClient`] adds typed LSP methods on top.

pub mod client;
mod endpoint;
mod error;
pub mod lsp;

pub use client::LspClient;
pub use endpoint::{
    Builder, Endpoint, ErrorHandler, Handler, Incoming, LogLevel, Once, ResponseFuture,
};
pub use error::{Error, Result};

// Provides reader and writer for framed LSP messages.
mod codec;
mod parser;

pub use codec::{reader, writer, CodecError, LspFrameCodec};

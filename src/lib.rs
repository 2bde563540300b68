//! In-process debug server for an embedded script engine: a restricted
//! WebSocket frame codec, a binary debug protocol, and a mode state
//! machine coordinating with the host interpreter's execution loop.
//!
//! Data flow (host engine → protocol engine → message codec → frame
//! codec → transport → socket, and back) is owned end to end by
//! [`protocol::DebugEngine`]; every other module is a layer it calls
//! through, never something the embedder touches directly except to
//! implement [`host::HostEngine`] and call into `DebugEngine`.

pub mod bytecode;
pub mod config;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod host;
pub mod message;
pub mod protocol;
pub mod session;
pub mod transport;

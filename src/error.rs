use std::io;
use std::string::FromUtf8Error;
use thiserror::Error;

/// Every way the debug session can fail. Any variant reaching the
/// protocol engine terminates the session (§7) except eval errors from
/// the host, which are surfaced to the client instead of closing
/// anything.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("payload is not valid UTF-8: {source}")]
    Utf8 {
        #[from]
        source: FromUtf8Error,
    },

    // Handshake errors
    #[error("handshake malformed: {0}")]
    HandshakeMalformed(&'static str),

    // Frame protocol violations (§4.1, §8 S6)
    #[error("frame protocol violation: {0}")]
    FrameProtocol(&'static str),

    #[error("frame payload of {0} bytes exceeds the negotiated limit of {1}")]
    FramePayloadTooLarge(usize, u8),

    // Message protocol violations (§4.4, §4.5)
    #[error("message protocol violation: {0}")]
    MessageProtocol(&'static str),

    #[error("unknown outbound message type {0:#x}")]
    UnknownOutboundType(u8),

    #[error("unknown inbound message type {0:#x}")]
    UnknownInboundType(u8),

    #[error("command `{0}` is not admissible in the current mode")]
    NotAdmissibleInMode(&'static str),

    // Byte-code reference safety (§4.6, §8 I-5, S5)
    #[error("compiled code reference {0:#06x} is unknown or already freed")]
    UnknownCompiledCodeRef(u16),

    // Fragmented payload accumulation (§A.5 of SPEC_FULL.md)
    #[error("fragmented payload of {0} bytes exceeds the configured limit of {1}")]
    FragmentTooLarge(usize, usize),

    #[error("peer closed the connection")]
    PeerClosed,
}

pub type Result<T> = std::result::Result<T, Error>;

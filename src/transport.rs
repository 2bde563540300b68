//! Socket lifecycle: accept, handshake, and the non-blocking per-frame
//! receive state machine (§4.3, §5).
//!
//! There is exactly one client; the socket is switched to non-blocking
//! immediately after the handshake, and `Session` keeps a persistent
//! stage so a `WouldBlock` in the middle of a header or payload resumes
//! on the next poll instead of losing progress (§3 "receive buffer...
//! with a persistent offset").

use bytes::BytesMut;
use log::{debug, error, warn};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};

use crate::config::SessionConfig;
use crate::error::Error;
use crate::frame::{self, FrameHeader};
use crate::handshake;

/// Listens for the single inbound connection this session model supports
/// (§1 Non-goals: no multi-client support).
pub struct Transport {
    listener: TcpListener,
}

impl Transport {
    pub fn bind(port: u16) -> Result<Transport, Error> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        Ok(Transport { listener })
    }

    /// The bound address, primarily useful when `bind(0)` picked an
    /// ephemeral port (tests, or an embedder that reports it back out).
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Blocking accept, blocking handshake, then switch to non-blocking
    /// (§4.2 "After 101, the socket is switched to non-blocking mode").
    pub fn accept_connection(&self, config: SessionConfig) -> Result<Session, Error> {
        let (mut stream, _addr) = self.listener.accept()?;
        let mut scratch = [0u8; handshake::REQUEST_BUF_SIZE];
        let client_key = handshake::read_request(&mut stream, &mut scratch)?;
        let accept = handshake::accept_key(&client_key);
        handshake::write_response(&mut stream, &accept)?;
        stream.set_nonblocking(true)?;
        debug!("debugger client connected, handshake complete");
        Ok(Session::new(stream, config))
    }
}

/// Result of one [`Session::receive`] poll.
#[derive(Debug)]
pub enum ReceiveOutcome {
    /// No complete frame is available yet; the socket would have blocked.
    NoData,
    /// One fully unmasked frame payload.
    Frame(Vec<u8>),
    /// The peer violated the frame or transport contract; the session is
    /// now closed.
    ProtocolError,
    /// The peer closed the TCP connection; the session is now closed.
    PeerClosed,
}

/// The resumable stage of an in-progress inbound frame. Persisted across
/// `WouldBlock` returns so a header split across two `read()` calls is
/// never lost (§3, §5 "Suspension points").
enum RecvStage {
    Header {
        filled: usize,
        buf: [u8; 2],
    },
    Mask {
        header: FrameHeader,
        filled: usize,
        buf: [u8; 4],
    },
    Payload {
        header: FrameHeader,
        mask: [u8; 4],
        filled: usize,
        buf: BytesMut,
    },
}

impl Default for RecvStage {
    fn default() -> Self {
        RecvStage::Header { filled: 0, buf: [0u8; 2] }
    }
}

/// One live debug connection: the TCP socket plus negotiated config and
/// the persistent receive stage (§3 "Session").
pub struct Session {
    stream: TcpStream,
    config: SessionConfig,
    stage: RecvStage,
    closed: bool,
}

impl Session {
    fn new(stream: TcpStream, config: SessionConfig) -> Self {
        Session {
            stream,
            config,
            stage: RecvStage::default(),
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Frame and send one payload, retrying on `WouldBlock` until the
    /// whole frame is on the wire (§4.3 "retries on would-block").
    pub fn send(&mut self, payload: &[u8]) -> Result<(), Error> {
        if self.closed {
            return Err(Error::PeerClosed);
        }
        let frame = frame::encode_frame(payload, self.config.max_send_payload)?;
        let mut written = 0;
        while written < frame.len() {
            match self.stream.write(&frame[written..]) {
                Ok(0) => {
                    self.closed = true;
                    return Err(Error::PeerClosed);
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => continue,
                Err(e) => {
                    self.closed = true;
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    /// Non-blocking single poll of the receive state machine. Returns
    /// immediately with [`ReceiveOutcome::NoData`] when no further bytes
    /// are currently available; otherwise drives the stage forward by
    /// however much data is ready and returns a complete frame once the
    /// header, mask, and payload have all arrived.
    pub fn receive(&mut self) -> ReceiveOutcome {
        if self.closed {
            return ReceiveOutcome::PeerClosed;
        }
        loop {
            match self.step() {
                Ok(Some(outcome)) => return outcome,
                Ok(None) => continue,
                Err(StepError::WouldBlock) => return ReceiveOutcome::NoData,
                Err(StepError::Closed) => {
                    self.closed = true;
                    return ReceiveOutcome::PeerClosed;
                }
                Err(StepError::Protocol(message)) => {
                    warn!("frame protocol violation, closing session: {message}");
                    self.closed = true;
                    return ReceiveOutcome::ProtocolError;
                }
                Err(StepError::Io(e)) => {
                    error!("transport I/O error, closing session: {e}");
                    self.closed = true;
                    return ReceiveOutcome::ProtocolError;
                }
            }
        }
    }

    /// Advance the stage by one `read()`. `Ok(None)` means a sub-stage
    /// completed but the frame is not whole yet, so the caller should
    /// loop; `Ok(Some(_))` means a full frame is ready.
    fn step(&mut self) -> Result<Option<ReceiveOutcome>, StepError> {
        match &mut self.stage {
            RecvStage::Header { filled, buf } => {
                let n = read_nonblocking(&mut self.stream, &mut buf[*filled..2])?;
                *filled += n;
                if *filled < 2 {
                    return Ok(None);
                }
                let header =
                    frame::parse_header(buf[0], buf[1], self.config.max_receive_payload)
                        .map_err(|_| StepError::Protocol("bad frame header"))?;
                self.stage = RecvStage::Mask {
                    header,
                    filled: 0,
                    buf: [0u8; 4],
                };
                Ok(None)
            }
            RecvStage::Mask { header, filled, buf } => {
                let n = read_nonblocking(&mut self.stream, &mut buf[*filled..4])?;
                *filled += n;
                if *filled < 4 {
                    return Ok(None);
                }
                self.stage = RecvStage::Payload {
                    header: *header,
                    mask: *buf,
                    filled: 0,
                    buf: BytesMut::zeroed(header.payload_len),
                };
                Ok(None)
            }
            RecvStage::Payload {
                header,
                mask,
                filled,
                buf,
            } => {
                if header.payload_len > 0 {
                    let target = header.payload_len;
                    let n = read_nonblocking(&mut self.stream, &mut buf.as_mut()[*filled..target])?;
                    *filled += n;
                    if *filled < target {
                        return Ok(None);
                    }
                }
                let mask = *mask;
                let mut payload = std::mem::take(buf).to_vec();
                frame::apply_mask(mask, &mut payload);
                self.stage = RecvStage::default();
                Ok(Some(ReceiveOutcome::Frame(payload)))
            }
        }
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

enum StepError {
    WouldBlock,
    Closed,
    Protocol(&'static str),
    Io(io::Error),
}

impl From<io::Error> for StepError {
    fn from(e: io::Error) -> Self {
        if e.kind() == ErrorKind::WouldBlock {
            StepError::WouldBlock
        } else {
            StepError::Io(e)
        }
    }
}

/// Read as much as is immediately available into `buf`, returning the
/// number of bytes read. A `WouldBlock` with zero bytes read propagates;
/// a clean EOF (`Ok(0)`) is reported as [`StepError::Closed`].
fn read_nonblocking(stream: &mut TcpStream, buf: &mut [u8]) -> Result<usize, StepError> {
    if buf.is_empty() {
        return Ok(0);
    }
    match stream.read(buf) {
        Ok(0) => Err(StepError::Closed),
        Ok(n) => Ok(n),
        Err(e) => Err(e.into()),
    }
}

use std::time::Duration;

/// Negotiated and fixed parameters for one debug session.
///
/// A plain struct with a `Default` impl; every field maps to a concrete
/// protocol constant rather than a WebSocket extension knob.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Outbound frame payload cap, never > 125 (§4.1, §6.1).
    pub max_send_payload: u8,
    /// Inbound frame payload cap, never > 125 (§4.1, §6.1).
    pub max_receive_payload: u8,
    /// Size of the session's send/receive buffer in bytes, echoed as
    /// `CONFIGURATION`'s `max_message_size` field (§6.2 row 1, §8 S2:
    /// 128 on the wire). Distinct from `max_send_payload`/
    /// `max_receive_payload`: those bound one frame's payload to stay
    /// within the fixed 2-byte header's 125-byte limit, while this is
    /// the client-facing buffer-size figure the embedded host happens
    /// to size its buffer at (§3 "Session").
    pub message_buffer_size: u8,
    /// Byte-code instructions between `poll_messages()` calls (§5).
    pub message_frequency: u32,
    /// Idle poll interval while suspended in breakpoint/client-source mode (§5).
    pub breakpoint_poll_interval: Duration,
    /// Upper bound on an announced or accumulated fragmented-payload size;
    /// closes the session instead of growing an allocation without limit
    /// (SPEC_FULL.md §A.5).
    pub max_fragment_total_size: usize,
    /// Width in bytes of a compressed byte-code reference, echoed in the
    /// `CONFIGURATION` message (§6.2).
    pub cpointer_size: u8,
    /// Debug protocol version, echoed in the `CONFIGURATION` message.
    pub protocol_version: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            max_send_payload: 125,
            max_receive_payload: 125,
            message_buffer_size: 128,
            message_frequency: 5,
            breakpoint_poll_interval: Duration::from_millis(100),
            max_fragment_total_size: 1 << 20,
            cpointer_size: 2,
            protocol_version: 2,
        }
    }
}

impl SessionConfig {
    /// `CONFIGURATION`'s `little_endian` flag reflects the *host's*
    /// native endianness; the wire format itself is always little-endian
    /// (§4.4). We only ever run on little-endian and big-endian hosts
    /// alike report truthfully here so the client can byte-swap CPs if
    /// it must.
    pub fn host_is_little_endian(&self) -> bool {
        cfg!(target_endian = "little")
    }
}

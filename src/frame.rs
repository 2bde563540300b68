//! The restricted WebSocket frame codec (§4.1, §6.1).
//!
//! Outbound frames are always `FIN=1, opcode=Binary, unmasked`. Inbound
//! frames are only accepted as `FIN=1, opcode=Binary, masked`. There is
//! no extended length field, no continuation frame, no ping/pong/close,
//! no text frame — the payload protocol fragments itself (§4.4), so
//! WebSocket-level fragmentation would be redundant, and restricting the
//! header to two fixed bytes lets the whole I/O path live in a
//! fixed-size buffer.

use crate::error::Error;

/// `FIN=1, RSV=0, opcode=Binary(0x2)`.
const FIRST_BYTE: u8 = 0x82;
const MASK_BIT: u8 = 0x80;
const LENGTH_MASK: u8 = 0x7f;

/// Header of an inbound frame, once the first two bytes have been read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub payload_len: usize,
}

/// Encode one outbound binary frame. `payload.len()` must not exceed
/// `max_send_payload` (itself never > 125, §6.1).
pub fn encode_frame(payload: &[u8], max_send_payload: u8) -> Result<Vec<u8>, Error> {
    if payload.len() > max_send_payload as usize {
        return Err(Error::FramePayloadTooLarge(payload.len(), max_send_payload));
    }
    let mut out = Vec::with_capacity(2 + payload.len());
    out.push(FIRST_BYTE);
    out.push(payload.len() as u8);
    out.extend_from_slice(payload);
    Ok(out)
}

/// Parse the two fixed header bytes of an inbound frame. Any deviation
/// from FIN=1/opcode=Binary/mask=1/len<=max is a protocol violation that
/// terminates the session (§4.1, §8 S6).
pub fn parse_header(b0: u8, b1: u8, max_receive_payload: u8) -> Result<FrameHeader, Error> {
    if b0 != FIRST_BYTE {
        return Err(Error::FrameProtocol(
            "expected FIN=1 and opcode=Binary in the first header byte",
        ));
    }
    if b1 & MASK_BIT == 0 {
        return Err(Error::FrameProtocol("inbound frame must be masked"));
    }
    let payload_len = (b1 & LENGTH_MASK) as usize;
    if payload_len > max_receive_payload as usize {
        return Err(Error::FrameProtocol(
            "inbound frame length exceeds the negotiated receive payload size",
        ));
    }
    Ok(FrameHeader { payload_len })
}

/// XOR-unmask (or mask — the operation is its own inverse) a payload in
/// place against a cyclic 4-byte key (§4.1, §8 I-2).
pub fn apply_mask(mask: [u8; 4], payload: &mut [u8]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_rejects_oversize_payload() {
        let payload = vec![0u8; 126];
        assert!(encode_frame(&payload, 125).is_err());
    }

    #[test]
    fn encode_header_matches_spec() {
        let frame = encode_frame(&[0x01, 0x80, 0x02, 0x01, 0x02], 125).unwrap();
        assert_eq!(&frame[..2], &[0x82, 0x05]);
        assert_eq!(&frame[2..], &[0x01, 0x80, 0x02, 0x01, 0x02]);
    }

    #[test]
    fn parse_header_rejects_non_binary_opcode() {
        // text frame (opcode 0x1), masked, length 2 — the S6 scenario.
        assert!(parse_header(0x81, 0x82, 125).is_err());
    }

    #[test]
    fn parse_header_rejects_unmasked() {
        assert!(parse_header(0x82, 0x05, 125).is_err());
    }

    #[test]
    fn parse_header_rejects_oversize_length() {
        assert!(parse_header(0x82, 0x80 | 126, 125).is_err());
    }

    #[test]
    fn mask_is_involution() {
        let key = [0x12, 0x34, 0x56, 0x78];
        let original: Vec<u8> = (0..250u32).map(|n| (n % 256) as u8).collect();
        let mut buf = original.clone();
        apply_mask(key, &mut buf);
        assert_ne!(buf, original);
        apply_mask(key, &mut buf);
        assert_eq!(buf, original);
    }

    #[test]
    fn framing_round_trip_for_every_length_up_to_125() {
        for len in 0..=125usize {
            let payload: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();
            let encoded = encode_frame(&payload, 125).unwrap();
            let header = parse_header(encoded[0], encoded[1] | 0x80, 125).unwrap();
            assert_eq!(header.payload_len, len);
            assert_eq!(&encoded[2..], payload.as_slice());
        }
    }
}

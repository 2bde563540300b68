//! The binary message codec layered over [`crate::frame`] (§4.4, §6.2).
//!
//! Every payload is a one-byte type tag followed by little-endian fields.
//! Outbound and inbound types are disjoint numeric spaces, so they get two
//! separate enums rather than one tagged union, each a closed,
//! `TryFrom`-checked type instead of a raw byte.

use crate::bytecode::Cp;
use crate::error::Error;

pub fn write_u16_le(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub fn write_u32_le(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub fn read_u16_le(buf: &[u8], offset: usize) -> Result<u16, Error> {
    let bytes = buf
        .get(offset..offset + 2)
        .ok_or(Error::MessageProtocol("truncated u16 field"))?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

pub fn read_u32_le(buf: &[u8], offset: usize) -> Result<u32, Error> {
    let bytes = buf
        .get(offset..offset + 4)
        .ok_or(Error::MessageProtocol("truncated u32 field"))?;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

/// Engine → client message types (§6.2 "Engine → Client").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutboundType {
    Configuration = 1,
    ParseError = 2,
    ByteCodeCp = 3,
    ParseFunction = 4,
    BreakpointList = 5,
    BreakpointOffsetList = 6,
    SourceCode = 7,
    SourceCodeEnd = 8,
    SourceCodeName = 9,
    SourceCodeNameEnd = 10,
    FunctionName = 11,
    FunctionNameEnd = 12,
    WaitingAfterParse = 13,
    ReleaseByteCodeCp = 14,
    MemstatsReceive = 15,
    BreakpointHit = 16,
    ExceptionHit = 17,
    ExceptionStr = 18,
    ExceptionStrEnd = 19,
    Backtrace = 20,
    BacktraceEnd = 21,
    EvalResult = 22,
    EvalResultEnd = 23,
    WaitForSource = 24,
    OutputResult = 25,
    OutputResultEnd = 26,
}

impl TryFrom<u8> for OutboundType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use OutboundType::*;
        Ok(match value {
            1 => Configuration,
            2 => ParseError,
            3 => ByteCodeCp,
            4 => ParseFunction,
            5 => BreakpointList,
            6 => BreakpointOffsetList,
            7 => SourceCode,
            8 => SourceCodeEnd,
            9 => SourceCodeName,
            10 => SourceCodeNameEnd,
            11 => FunctionName,
            12 => FunctionNameEnd,
            13 => WaitingAfterParse,
            14 => ReleaseByteCodeCp,
            15 => MemstatsReceive,
            16 => BreakpointHit,
            17 => ExceptionHit,
            18 => ExceptionStr,
            19 => ExceptionStrEnd,
            20 => Backtrace,
            21 => BacktraceEnd,
            22 => EvalResult,
            23 => EvalResultEnd,
            24 => WaitForSource,
            25 => OutputResult,
            26 => OutputResultEnd,
            other => return Err(Error::UnknownOutboundType(other)),
        })
    }
}

/// Client → engine message types (§6.2 "Client → Engine").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InboundType {
    FreeByteCodeCp = 1,
    UpdateBreakpoint = 2,
    ExceptionConfig = 3,
    ParserConfig = 4,
    Memstats = 5,
    Stop = 6,
    ParserResume = 7,
    ClientSource = 8,
    ClientSourcePart = 9,
    NoMoreSources = 10,
    ContextReset = 11,
    Continue = 12,
    Step = 13,
    Next = 14,
    Finish = 15,
    GetBacktrace = 16,
    Eval = 17,
    EvalPart = 18,
    Throw = 19,
    ThrowPart = 20,
}

impl TryFrom<u8> for InboundType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use InboundType::*;
        Ok(match value {
            1 => FreeByteCodeCp,
            2 => UpdateBreakpoint,
            3 => ExceptionConfig,
            4 => ParserConfig,
            5 => Memstats,
            6 => Stop,
            7 => ParserResume,
            8 => ClientSource,
            9 => ClientSourcePart,
            10 => NoMoreSources,
            11 => ContextReset,
            12 => Continue,
            13 => Step,
            14 => Next,
            15 => Finish,
            16 => GetBacktrace,
            17 => Eval,
            18 => EvalPart,
            19 => Throw,
            20 => ThrowPart,
            other => return Err(Error::UnknownInboundType(other)),
        })
    }
}

/// One fully decoded breakpoint-frame hit or exception hit (§6.2 rows 16/17).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakpointRef {
    pub cp: Cp,
    pub offset: u32,
}

/// A decoded client-to-engine command, dispatched by [`InboundType`].
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    FreeByteCodeCp { cp: Cp },
    UpdateBreakpoint { enable: bool, cp: Cp, offset: u32 },
    ExceptionConfig { enable: bool },
    ParserConfig { wait: bool },
    Memstats,
    Stop,
    ParserResume,
    ClientSource { total_size: u32, data: Vec<u8> },
    ClientSourcePart { data: Vec<u8> },
    NoMoreSources,
    ContextReset,
    Continue,
    Step,
    Next,
    Finish,
    GetBacktrace { max_depth: u32 },
    Eval { total_size: u32, data: Vec<u8> },
    EvalPart { data: Vec<u8> },
    Throw { total_size: u32, data: Vec<u8> },
    ThrowPart { data: Vec<u8> },
}

impl InboundMessage {
    /// Decode one reassembled message payload (type byte included).
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let &type_byte = payload
            .first()
            .ok_or(Error::MessageProtocol("empty payload"))?;
        let body = &payload[1..];
        match InboundType::try_from(type_byte)? {
            InboundType::FreeByteCodeCp => Ok(InboundMessage::FreeByteCodeCp {
                cp: read_u16_le(body, 0)?,
            }),
            InboundType::UpdateBreakpoint => {
                let enable = *body.first().ok_or(Error::MessageProtocol(
                    "UPDATE_BREAKPOINT missing enable byte",
                ))? != 0;
                let cp = read_u16_le(body, 1)?;
                let offset = read_u32_le(body, 3)?;
                Ok(InboundMessage::UpdateBreakpoint { enable, cp, offset })
            }
            InboundType::ExceptionConfig => Ok(InboundMessage::ExceptionConfig {
                enable: *body
                    .first()
                    .ok_or(Error::MessageProtocol("EXCEPTION_CONFIG missing byte"))?
                    != 0,
            }),
            InboundType::ParserConfig => Ok(InboundMessage::ParserConfig {
                wait: *body
                    .first()
                    .ok_or(Error::MessageProtocol("PARSER_CONFIG missing byte"))?
                    != 0,
            }),
            InboundType::Memstats => Ok(InboundMessage::Memstats),
            InboundType::Stop => Ok(InboundMessage::Stop),
            InboundType::ParserResume => Ok(InboundMessage::ParserResume),
            InboundType::ClientSource => {
                let total_size = read_u32_le(body, 0)?;
                Ok(InboundMessage::ClientSource {
                    total_size,
                    data: body[4..].to_vec(),
                })
            }
            InboundType::ClientSourcePart => Ok(InboundMessage::ClientSourcePart {
                data: body.to_vec(),
            }),
            InboundType::NoMoreSources => Ok(InboundMessage::NoMoreSources),
            InboundType::ContextReset => Ok(InboundMessage::ContextReset),
            InboundType::Continue => Ok(InboundMessage::Continue),
            InboundType::Step => Ok(InboundMessage::Step),
            InboundType::Next => Ok(InboundMessage::Next),
            InboundType::Finish => Ok(InboundMessage::Finish),
            InboundType::GetBacktrace => Ok(InboundMessage::GetBacktrace {
                max_depth: read_u32_le(body, 0)?,
            }),
            InboundType::Eval => {
                let total_size = read_u32_le(body, 0)?;
                Ok(InboundMessage::Eval {
                    total_size,
                    data: body[4..].to_vec(),
                })
            }
            InboundType::EvalPart => Ok(InboundMessage::EvalPart {
                data: body.to_vec(),
            }),
            InboundType::Throw => {
                let total_size = read_u32_le(body, 0)?;
                Ok(InboundMessage::Throw {
                    total_size,
                    data: body[4..].to_vec(),
                })
            }
            InboundType::ThrowPart => Ok(InboundMessage::ThrowPart {
                data: body.to_vec(),
            }),
        }
    }

    /// Whether this type opens a fragmented stream (§4.4 "Inbound fragmentation").
    pub fn opens_fragment_stream(type_byte: u8) -> bool {
        matches!(
            InboundType::try_from(type_byte),
            Ok(InboundType::Eval | InboundType::ClientSource | InboundType::Throw)
        )
    }
}

// ---- Outbound, non-fragmented records (§6.2 "Engine → Client") ----

pub fn encode_configuration(max_message_size: u8, cpointer_size: u8, little_endian: bool, protocol_version: u8) -> Vec<u8> {
    vec![
        OutboundType::Configuration as u8,
        max_message_size,
        cpointer_size,
        little_endian as u8,
        protocol_version,
    ]
}

pub fn encode_parse_error() -> Vec<u8> {
    vec![OutboundType::ParseError as u8]
}

pub fn encode_byte_code_cp(cp: Cp) -> Vec<u8> {
    let mut out = vec![OutboundType::ByteCodeCp as u8];
    write_u16_le(&mut out, cp);
    out
}

pub fn encode_parse_function(line: u32, column: u32) -> Vec<u8> {
    let mut out = vec![OutboundType::ParseFunction as u8];
    write_u32_le(&mut out, line);
    write_u32_le(&mut out, column);
    out
}

pub fn encode_breakpoint_list(line_offsets: &[u32]) -> Vec<u8> {
    let mut out = vec![OutboundType::BreakpointList as u8];
    for offset in line_offsets {
        write_u32_le(&mut out, *offset);
    }
    out
}

pub fn encode_breakpoint_offset_list(byte_code_offsets: &[u32]) -> Vec<u8> {
    let mut out = vec![OutboundType::BreakpointOffsetList as u8];
    for offset in byte_code_offsets {
        write_u32_le(&mut out, *offset);
    }
    out
}

pub fn encode_waiting_after_parse() -> Vec<u8> {
    vec![OutboundType::WaitingAfterParse as u8]
}

pub fn encode_release_byte_code_cp(cp: Cp) -> Vec<u8> {
    let mut out = vec![OutboundType::ReleaseByteCodeCp as u8];
    write_u16_le(&mut out, cp);
    out
}

pub fn encode_memstats_receive(allocated: u32, byte_code: u32, strings: u32, objects: u32, properties: u32) -> Vec<u8> {
    let mut out = vec![OutboundType::MemstatsReceive as u8];
    for field in [allocated, byte_code, strings, objects, properties] {
        write_u32_le(&mut out, field);
    }
    out
}

pub fn encode_breakpoint_hit(cp: Cp, offset: u32) -> Vec<u8> {
    let mut out = vec![OutboundType::BreakpointHit as u8];
    write_u16_le(&mut out, cp);
    write_u32_le(&mut out, offset);
    out
}

pub fn encode_exception_hit(cp: Cp, offset: u32) -> Vec<u8> {
    let mut out = vec![OutboundType::ExceptionHit as u8];
    write_u16_le(&mut out, cp);
    write_u32_le(&mut out, offset);
    out
}

pub fn encode_wait_for_source() -> Vec<u8> {
    vec![OutboundType::WaitForSource as u8]
}

/// One `{ cp, u32 offset }` backtrace frame, raw (no type byte) — meant
/// to be concatenated across frames before handing the buffer to
/// [`send_fragmented`] under `BACKTRACE[_END]` (§6.2 rows 20/21).
pub fn encode_backtrace_frame(cp: Cp, offset: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(6);
    write_u16_le(&mut out, cp);
    write_u32_le(&mut out, offset);
    out
}

// ---- Outbound fragmentation (§4.4 "Outbound fragmentation", §6.2 rows with PART/END) ----

/// Split `data` into frame-sized chunks and hand each to `send`, tagged
/// `part_type` for every chunk but the last, which is tagged `end_type`.
/// An empty `data` still emits a single `end_type` frame with no body, so
/// the client always sees exactly one `_END` per stream.
pub fn send_fragmented(
    mut send: impl FnMut(&[u8]) -> Result<(), Error>,
    part_type: u8,
    end_type: u8,
    data: &[u8],
    max_send_payload: u8,
) -> Result<(), Error> {
    let max_chunk = (max_send_payload as usize).saturating_sub(1).max(1);
    if data.is_empty() {
        return send(&[end_type]);
    }
    let chunks: Vec<&[u8]> = data.chunks(max_chunk).collect();
    let last = chunks.len() - 1;
    for (i, chunk) in chunks.into_iter().enumerate() {
        let type_byte = if i == last { end_type } else { part_type };
        let mut frame = Vec::with_capacity(1 + chunk.len());
        frame.push(type_byte);
        frame.extend_from_slice(chunk);
        send(&frame)?;
    }
    Ok(())
}

/// Like [`send_fragmented`], but the very last frame carries one extra
/// trailing byte after the data (§6.2 rows 22/23 `EVAL_RESULT[_END]` and
/// 25/26 `OUTPUT_RESULT[_END]`, whose trailing byte is the result
/// subtype). If the last data chunk is already full, the trailer goes
/// out alone in its own `_END` frame.
pub fn send_fragmented_with_trailer(
    mut send: impl FnMut(&[u8]) -> Result<(), Error>,
    part_type: u8,
    end_type: u8,
    data: &[u8],
    trailer: u8,
    max_send_payload: u8,
) -> Result<(), Error> {
    let max_chunk = (max_send_payload as usize).saturating_sub(1).max(1);
    if data.is_empty() {
        return send(&[end_type, trailer]);
    }
    let chunks: Vec<&[u8]> = data.chunks(max_chunk).collect();
    let last = chunks.len() - 1;
    for (i, chunk) in chunks.iter().enumerate() {
        if i < last {
            let mut frame = Vec::with_capacity(1 + chunk.len());
            frame.push(part_type);
            frame.extend_from_slice(chunk);
            send(&frame)?;
        }
    }
    let last_chunk = chunks[last];
    let mut frame = Vec::with_capacity(2 + last_chunk.len());
    frame.push(end_type);
    frame.extend_from_slice(last_chunk);
    if last_chunk.len() < max_chunk {
        frame.push(trailer);
    } else {
        send(&frame)?;
        return send(&[end_type, trailer]);
    }
    send(&frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_matches_s2_scenario() {
        assert_eq!(
            encode_configuration(128, 2, true, 2),
            vec![0x01, 0x80, 0x02, 0x01, 0x02]
        );
    }

    #[test]
    fn breakpoint_hit_matches_s3_scenario() {
        assert_eq!(
            encode_breakpoint_hit(0x1234, 0x0000_0007),
            vec![0x10, 0x34, 0x12, 0x07, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn parse_continue_command() {
        let msg = InboundMessage::parse(&[12]).unwrap();
        assert_eq!(msg, InboundMessage::Continue);
    }

    #[test]
    fn parse_update_breakpoint() {
        let payload = {
            let mut p = vec![InboundType::UpdateBreakpoint as u8, 1];
            write_u16_le(&mut p, 0xABCD);
            write_u32_le(&mut p, 0x42);
            p
        };
        let msg = InboundMessage::parse(&payload).unwrap();
        assert_eq!(
            msg,
            InboundMessage::UpdateBreakpoint {
                enable: true,
                cp: 0xABCD,
                offset: 0x42,
            }
        );
    }

    #[test]
    fn unknown_inbound_type_is_rejected() {
        assert!(InboundMessage::parse(&[200]).is_err());
    }

    #[test]
    fn outbound_type_try_from_round_trips_and_rejects_unknown() {
        assert_eq!(OutboundType::try_from(1).unwrap(), OutboundType::Configuration);
        assert_eq!(OutboundType::try_from(26).unwrap(), OutboundType::OutputResultEnd);
        assert!(OutboundType::try_from(0).is_err());
        assert!(OutboundType::try_from(27).is_err());
    }

    #[test]
    fn fragmented_eval_matches_s4_reassembly_shape() {
        let mut total_size_field = Vec::new();
        write_u32_le(&mut total_size_field, 200);
        let mut first = vec![InboundType::Eval as u8];
        first.extend_from_slice(&total_size_field);
        first.extend(vec![0xAAu8; 119]);
        let second = {
            let mut p = vec![InboundType::EvalPart as u8];
            p.extend(vec![0xBBu8; 81]);
            p
        };

        let first_msg = InboundMessage::parse(&first).unwrap();
        let second_msg = InboundMessage::parse(&second).unwrap();
        let (total_size, mut data) = match first_msg {
            InboundMessage::Eval { total_size, data } => (total_size, data),
            _ => panic!("expected Eval"),
        };
        assert_eq!(total_size, 200);
        match second_msg {
            InboundMessage::EvalPart { data: more } => data.extend(more),
            _ => panic!("expected EvalPart"),
        }
        assert_eq!(data.len(), 200);
    }

    #[test]
    fn send_fragmented_emits_part_then_end() {
        let data = vec![0u8; 10];
        let mut frames = Vec::new();
        send_fragmented(
            |frame| {
                frames.push(frame.to_vec());
                Ok(())
            },
            OutboundType::SourceCode as u8,
            OutboundType::SourceCodeEnd as u8,
            &data,
            6, // 5-byte chunks: type + 5 bytes payload
        )
        .unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0][0], OutboundType::SourceCode as u8);
        assert_eq!(frames[0].len(), 6);
        assert_eq!(frames[1][0], OutboundType::SourceCodeEnd as u8);
        assert_eq!(frames[1].len(), 6);
    }

    #[test]
    fn send_fragmented_empty_data_emits_single_end() {
        let mut frames = Vec::new();
        send_fragmented(
            |frame| {
                frames.push(frame.to_vec());
                Ok(())
            },
            OutboundType::FunctionName as u8,
            OutboundType::FunctionNameEnd as u8,
            &[],
            125,
        )
        .unwrap();
        assert_eq!(frames, vec![vec![OutboundType::FunctionNameEnd as u8]]);
    }

    #[test]
    fn send_fragmented_with_trailer_appends_subtype_byte() {
        let data = b"ok".to_vec();
        let mut frames = Vec::new();
        send_fragmented_with_trailer(
            |frame| {
                frames.push(frame.to_vec());
                Ok(())
            },
            OutboundType::EvalResult as u8,
            OutboundType::EvalResultEnd as u8,
            &data,
            1, // subtype OK
            125,
        )
        .unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0], vec![OutboundType::EvalResultEnd as u8, b'o', b'k', 1]);
    }

    #[test]
    fn send_fragmented_with_trailer_splits_when_last_chunk_is_full() {
        let data = vec![0xFFu8; 4]; // max_chunk = 4 with max_send_payload=5
        let mut frames = Vec::new();
        send_fragmented_with_trailer(
            |frame| {
                frames.push(frame.to_vec());
                Ok(())
            },
            OutboundType::OutputResult as u8,
            OutboundType::OutputResultEnd as u8,
            &data,
            3,
            5,
        )
        .unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], vec![OutboundType::OutputResultEnd as u8, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(frames[1], vec![OutboundType::OutputResultEnd as u8, 3]);
    }
}

//! The mode state machine tying the transport, the message codec, and
//! the host engine together (§4.5 "Protocol engine").
//!
//! This is the module the host interpreter actually calls into; every
//! other piece of the crate (`frame`, `handshake`, `message`, `session`,
//! `bytecode`, `transport`) is reached only through here, mirroring the
//! data-flow diagram in §2.

use std::thread;

use log::{debug, trace, warn};

use crate::bytecode::{ByteCodeHeader, Cp, PendingFreeList};
use crate::config::SessionConfig;
use crate::error::Error;
use crate::host::{ClientSourceDecision, ClientSourceOutcome, EvalOutcome, HostEngine, StepMode};
use crate::message::{self, InboundMessage, InboundType, OutboundType};
use crate::session::{Flag, FragmentKind, FragmentStream, ModeFlags};
use crate::transport::{ReceiveOutcome, Session, Transport};

/// The live debug session: one TCP connection, one host engine, one mode
/// state machine (§3 "Session").
pub struct DebugEngine<H: HostEngine> {
    session: Session,
    host: H,
    config: SessionConfig,
    flags: ModeFlags,
    pending_free: PendingFreeList,
    fragment: Option<FragmentStream>,
    /// Set once a `CLIENT_SOURCE` stream completes reassembly; consumed
    /// by [`DebugEngine::wait_for_client_source`]'s idle loop.
    pending_client_source: Option<Vec<u8>>,
    context_reset_requested: bool,
}

impl<H: HostEngine> DebugEngine<H> {
    /// Block on accepting one connection, perform the handshake, and
    /// send the initial `CONFIGURATION` record (§4.2, §6.2 row 1).
    pub fn accept(transport: &Transport, host: H, config: SessionConfig) -> Result<Self, Error> {
        let session = transport.accept_connection(config)?;
        let mut flags = ModeFlags::new();
        flags.insert(Flag::Connected);
        let mut engine = DebugEngine {
            session,
            host,
            config,
            flags,
            pending_free: PendingFreeList::new(),
            fragment: None,
            pending_client_source: None,
            context_reset_requested: false,
        };
        engine.send_configuration()?;
        Ok(engine)
    }

    fn send_configuration(&mut self) -> Result<(), Error> {
        let payload = message::encode_configuration(
            self.config.message_buffer_size,
            self.config.cpointer_size,
            self.config.host_is_little_endian(),
            self.config.protocol_version,
        );
        self.session.send(&payload)
    }

    pub fn is_connected(&self) -> bool {
        self.flags.contains(Flag::Connected) && !self.session.is_closed()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    // ---- §6.4 embedder surface: stop/continue/stop_at_breakpoint ----

    pub fn request_stop(&mut self) {
        self.host.set_vm_stop(true);
    }

    pub fn request_continue(&mut self) {
        self.host.set_vm_stop(false);
    }

    /// `stop_at_breakpoint(enable)`: `enable = true` means breakpoints are
    /// honored; `enable = false` sets `VmIgnore` so they are skipped.
    pub fn stop_at_breakpoint(&mut self, enable: bool) {
        self.host.set_vm_ignore(!enable);
    }

    /// Non-blocking RUN-mode poll. The host calls this every
    /// `MESSAGE_FREQUENCY` byte-code instructions (§5).
    pub fn poll(&mut self) -> Result<(), Error> {
        if !self.is_connected() {
            return Ok(());
        }
        match self.session.receive() {
            ReceiveOutcome::NoData => Ok(()),
            ReceiveOutcome::PeerClosed => {
                debug!("debugger client disconnected");
                self.disconnect();
                Ok(())
            }
            ReceiveOutcome::ProtocolError => {
                self.disconnect();
                Err(Error::FrameProtocol("inbound frame rejected"))
            }
            ReceiveOutcome::Frame(payload) => self.handle_frame(&payload),
        }
    }

    /// Host reports a breakpoint hit at `(cp, offset)`: emit
    /// `BREAKPOINT_HIT`, enter `BreakpointMode`, and block until a
    /// resuming command is processed (§4.5 "Breakpoint arrival").
    pub fn breakpoint_hit(&mut self, cp: Cp, offset: u32) -> Result<(), Error> {
        let payload = message::encode_breakpoint_hit(cp, offset);
        self.session.send(&payload)?;
        self.run_breakpoint_loop()
    }

    /// Host reports an uncaught exception about to propagate: send the
    /// rendered message as fragmented `EXCEPTION_STR[_END]`, then
    /// `EXCEPTION_HIT`, then enter the same suspended loop as a
    /// breakpoint hit (§4.5 "Exception handling").
    ///
    /// The wire record for `EXCEPTION_HIT` (§6.2 row 17) carries
    /// `(cp, offset)` ahead of the exception text; this keeps the
    /// wire-accurate signature rather than dropping them.
    pub fn exception_hit(&mut self, cp: Cp, offset: u32, text: &str) -> Result<(), Error> {
        if self.flags.contains(Flag::VmIgnoreException) {
            return Ok(());
        }
        let max = self.config.max_send_payload;
        {
            let session = &mut self.session;
            message::send_fragmented(
                |frame| session.send(frame),
                OutboundType::ExceptionStr as u8,
                OutboundType::ExceptionStrEnd as u8,
                text.as_bytes(),
                max,
            )?;
        }
        let payload = message::encode_exception_hit(cp, offset);
        self.session.send(&payload)?;
        self.run_breakpoint_loop()
    }

    fn run_breakpoint_loop(&mut self) -> Result<(), Error> {
        self.flags.enter_breakpoint_mode();
        loop {
            if !self.is_connected() || !self.flags.contains(Flag::BreakpointMode) {
                return Ok(());
            }
            match self.session.receive() {
                ReceiveOutcome::NoData => thread::sleep(self.config.breakpoint_poll_interval),
                ReceiveOutcome::PeerClosed => {
                    self.disconnect();
                    return Ok(());
                }
                ReceiveOutcome::ProtocolError => {
                    self.disconnect();
                    return Err(Error::FrameProtocol(
                        "inbound frame rejected during breakpoint mode",
                    ));
                }
                ReceiveOutcome::Frame(payload) => self.handle_frame(&payload)?,
            }
        }
    }

    pub fn byte_code_parsed(&mut self, cp: Cp) -> Result<(), Error> {
        let payload = message::encode_byte_code_cp(cp);
        self.session.send(&payload)
    }

    /// Host is retiring `header.cp`: announce it and enqueue for deferred
    /// release (§4.6).
    pub fn release_byte_code(&mut self, header: ByteCodeHeader) -> Result<(), Error> {
        let payload = message::encode_release_byte_code_cp(header.cp);
        self.session.send(&payload)?;
        self.pending_free.push(header);
        Ok(())
    }

    pub fn parse_function(&mut self, line: u32, column: u32) -> Result<(), Error> {
        let payload = message::encode_parse_function(line, column);
        self.session.send(&payload)
    }

    pub fn parse_error(&mut self) -> Result<(), Error> {
        let payload = message::encode_parse_error();
        self.session.send(&payload)
    }

    pub fn send_source(&mut self, name: &str, source: &str) -> Result<(), Error> {
        let max = self.config.max_send_payload;
        {
            let session = &mut self.session;
            message::send_fragmented(
                |frame| session.send(frame),
                OutboundType::SourceCodeName as u8,
                OutboundType::SourceCodeNameEnd as u8,
                name.as_bytes(),
                max,
            )?;
        }
        let session = &mut self.session;
        message::send_fragmented(
            |frame| session.send(frame),
            OutboundType::SourceCode as u8,
            OutboundType::SourceCodeEnd as u8,
            source.as_bytes(),
            max,
        )
    }

    pub fn send_function_name(&mut self, name: &str) -> Result<(), Error> {
        let max = self.config.max_send_payload;
        let session = &mut self.session;
        message::send_fragmented(
            |frame| session.send(frame),
            OutboundType::FunctionName as u8,
            OutboundType::FunctionNameEnd as u8,
            name.as_bytes(),
            max,
        )
    }

    pub fn send_breakpoint_list(&mut self, line_offsets: &[u32]) -> Result<(), Error> {
        let payload = message::encode_breakpoint_list(line_offsets);
        self.session.send(&payload)
    }

    pub fn send_breakpoint_offset_list(&mut self, byte_code_offsets: &[u32]) -> Result<(), Error> {
        let payload = message::encode_breakpoint_offset_list(byte_code_offsets);
        self.session.send(&payload)
    }

    /// Send `WAITING_AFTER_PARSE` and idle until `PARSER_RESUME`, legal
    /// alongside the RUN-mode command subset (§4.5 "PARSER_WAIT_MODE").
    pub fn waiting_after_parse(&mut self) -> Result<(), Error> {
        let payload = message::encode_waiting_after_parse();
        self.session.send(&payload)?;
        self.flags.insert(Flag::ParserWait);
        self.flags.insert(Flag::ParserWaitMode);
        loop {
            if !self.is_connected() || !self.flags.contains(Flag::ParserWaitMode) {
                return Ok(());
            }
            match self.session.receive() {
                ReceiveOutcome::NoData => thread::sleep(self.config.breakpoint_poll_interval),
                ReceiveOutcome::PeerClosed => {
                    self.disconnect();
                    return Ok(());
                }
                ReceiveOutcome::ProtocolError => {
                    self.disconnect();
                    return Err(Error::FrameProtocol(
                        "inbound frame rejected during parser wait",
                    ));
                }
                ReceiveOutcome::Frame(payload) => self.handle_frame(&payload)?,
            }
        }
    }

    pub fn send_output(&mut self, bytes: &[u8], subtype: u8) -> Result<(), Error> {
        let max = self.config.max_send_payload;
        let session = &mut self.session;
        message::send_fragmented_with_trailer(
            |frame| session.send(frame),
            OutboundType::OutputResult as u8,
            OutboundType::OutputResultEnd as u8,
            bytes,
            subtype,
            max,
        )
    }

    /// The client-source idle loop (§4.5 "Client-source loop", §6.4
    /// `wait_for_client_source`). Per the resolved open question in
    /// `DESIGN.md`, `ClientSourceMode` is strictly dominant: this refuses
    /// to run while `BreakpointMode` is already set.
    ///
    /// The wire's `CLIENT_SOURCE` record carries no resource-name field
    /// (§6.2 rows 8/9 are `total_size` + raw bytes only), so `on_source`
    /// is invoked with an empty name; an embedder that needs per-resource
    /// naming must derive it out-of-band.
    pub fn wait_for_client_source(
        &mut self,
        mut on_source: impl FnMut(&mut H, &str, &[u8]) -> ClientSourceDecision,
    ) -> Result<ClientSourceOutcome, Error> {
        if self.flags.contains(Flag::BreakpointMode) {
            return Err(Error::NotAdmissibleInMode(
                "wait_for_client_source while BreakpointMode is set",
            ));
        }
        self.flags.remove(Flag::ParserWaitMode);
        self.session.send(&message::encode_wait_for_source())?;
        self.flags.enter_client_source_mode();
        self.context_reset_requested = false;
        self.pending_client_source = None;

        loop {
            if self.context_reset_requested {
                self.flags.leave_client_source_mode();
                return Ok(ClientSourceOutcome::ContextReset);
            }
            if !self.is_connected() {
                return Ok(ClientSourceOutcome::ReceiveFailed);
            }
            if self.flags.contains(Flag::ClientNoSource) {
                self.flags.leave_client_source_mode();
                return Ok(ClientSourceOutcome::End);
            }
            if let Some(buffer) = self.pending_client_source.take() {
                self.flags.leave_client_source_mode();
                return Ok(match on_source(&mut self.host, "", &buffer) {
                    ClientSourceDecision::Accepted => ClientSourceOutcome::Received,
                    ClientSourceDecision::Rejected => ClientSourceOutcome::ReceiveFailed,
                });
            }
            match self.session.receive() {
                ReceiveOutcome::NoData => thread::sleep(self.config.breakpoint_poll_interval),
                ReceiveOutcome::PeerClosed => {
                    self.disconnect();
                    return Ok(ClientSourceOutcome::ReceiveFailed);
                }
                ReceiveOutcome::ProtocolError => {
                    self.disconnect();
                    return Err(Error::FrameProtocol(
                        "inbound frame rejected during client-source wait",
                    ));
                }
                ReceiveOutcome::Frame(payload) => self.handle_frame(&payload)?,
            }
        }
    }

    // ---- inbound dispatch ----

    fn handle_frame(&mut self, payload: &[u8]) -> Result<(), Error> {
        let type_byte = *payload
            .first()
            .ok_or(Error::MessageProtocol("empty payload"))?;

        if let Some(stream) = &self.fragment {
            let expected = stream.kind.continuation_type() as u8;
            let is_stop = InboundType::try_from(type_byte).ok() == Some(InboundType::Stop);
            if type_byte != expected && !is_stop {
                self.disconnect();
                return Err(Error::MessageProtocol(
                    "unexpected type while a fragment stream is open",
                ));
            }
        }

        let inbound_type = InboundType::try_from(type_byte)?;
        if !self.is_admissible(inbound_type) {
            self.disconnect();
            return Err(Error::NotAdmissibleInMode(
                "command not admissible in the current mode",
            ));
        }

        let message = InboundMessage::parse(payload)?;
        self.dispatch(message)
    }

    fn is_admissible(&self, ty: InboundType) -> bool {
        use InboundType::*;
        if ty == ContextReset {
            return true;
        }
        let run_subset = matches!(
            ty,
            FreeByteCodeCp
                | UpdateBreakpoint
                | ExceptionConfig
                | ParserConfig
                | Memstats
                | Stop
                | ClientSource
                | ClientSourcePart
                | NoMoreSources
        );
        if self.flags.contains(Flag::ParserWaitMode) {
            return run_subset || ty == ParserResume;
        }
        if self.flags.contains(Flag::BreakpointMode) {
            let breakpoint_extra = matches!(
                ty,
                Continue | Step | Next | Finish | GetBacktrace | Eval | EvalPart | Throw | ThrowPart
            );
            return run_subset || breakpoint_extra;
        }
        run_subset
    }

    fn dispatch(&mut self, message: InboundMessage) -> Result<(), Error> {
        match message {
            InboundMessage::FreeByteCodeCp { cp } => self.handle_free_byte_code_cp(cp),
            InboundMessage::UpdateBreakpoint { enable, cp, offset } => {
                self.handle_update_breakpoint(enable, cp, offset)
            }
            InboundMessage::ExceptionConfig { enable } => {
                self.host.set_vm_ignore_exception(!enable);
                self.flags.set(Flag::VmIgnoreException, !enable);
                Ok(())
            }
            InboundMessage::ParserConfig { wait } => {
                self.flags.set(Flag::ParserWait, wait);
                Ok(())
            }
            InboundMessage::Memstats => self.handle_memstats(),
            InboundMessage::Stop => {
                self.host.set_vm_stop(true);
                Ok(())
            }
            InboundMessage::ParserResume => {
                self.flags.remove(Flag::ParserWaitMode);
                Ok(())
            }
            InboundMessage::ClientSource { total_size, data } => {
                self.handle_fragment_open(FragmentKind::ClientSource, total_size, data)
            }
            InboundMessage::ClientSourcePart { data } => {
                self.handle_fragment_part(FragmentKind::ClientSource, data)
            }
            InboundMessage::NoMoreSources => {
                self.flags.insert(Flag::ClientNoSource);
                Ok(())
            }
            InboundMessage::ContextReset => {
                self.context_reset_requested = true;
                self.flags.insert(Flag::ContextResetMode);
                Ok(())
            }
            InboundMessage::Continue => {
                self.host.set_vm_stop(false);
                self.flags.leave_breakpoint_mode();
                Ok(())
            }
            InboundMessage::Step => {
                self.host.set_step_mode(StepMode::Into);
                self.flags.leave_breakpoint_mode();
                Ok(())
            }
            InboundMessage::Next => {
                self.host.set_step_mode(StepMode::Over);
                self.flags.leave_breakpoint_mode();
                Ok(())
            }
            InboundMessage::Finish => {
                self.host.set_step_mode(StepMode::Out);
                self.flags.leave_breakpoint_mode();
                Ok(())
            }
            InboundMessage::GetBacktrace { max_depth } => self.handle_get_backtrace(max_depth),
            InboundMessage::Eval { total_size, data } => {
                self.handle_fragment_open(FragmentKind::Eval, total_size, data)
            }
            InboundMessage::EvalPart { data } => {
                self.handle_fragment_part(FragmentKind::Eval, data)
            }
            InboundMessage::Throw { total_size, data } => {
                self.handle_fragment_open(FragmentKind::Throw, total_size, data)
            }
            InboundMessage::ThrowPart { data } => {
                self.handle_fragment_part(FragmentKind::Throw, data)
            }
        }
    }

    fn handle_free_byte_code_cp(&mut self, cp: Cp) -> Result<(), Error> {
        match self.pending_free.take(cp) {
            Some(header) => {
                self.host.free_byte_code(header.cp);
                Ok(())
            }
            None => {
                self.disconnect();
                Err(Error::UnknownCompiledCodeRef(cp))
            }
        }
    }

    /// S5: a CP already freed (no longer live, not merely pending) is
    /// rejected and closes the session.
    fn handle_update_breakpoint(&mut self, enable: bool, cp: Cp, offset: u32) -> Result<(), Error> {
        if !self.host.has_function(cp) {
            self.disconnect();
            return Err(Error::UnknownCompiledCodeRef(cp));
        }
        self.host.update_breakpoint(cp, offset, enable);
        Ok(())
    }

    fn handle_memstats(&mut self) -> Result<(), Error> {
        let stats = self.host.memstats();
        let payload = message::encode_memstats_receive(
            stats.allocated,
            stats.byte_code,
            stats.strings,
            stats.objects,
            stats.properties,
        );
        self.session.send(&payload)
    }

    fn handle_get_backtrace(&mut self, max_depth: u32) -> Result<(), Error> {
        let frames = self.host.backtrace(max_depth);
        let mut buffer = Vec::with_capacity(frames.len() * 6);
        for frame in &frames {
            buffer.extend(message::encode_backtrace_frame(frame.cp, frame.offset));
        }
        let max = self.config.max_send_payload;
        let session = &mut self.session;
        message::send_fragmented(
            |frame| session.send(frame),
            OutboundType::Backtrace as u8,
            OutboundType::BacktraceEnd as u8,
            &buffer,
            max,
        )
    }

    fn handle_fragment_open(
        &mut self,
        kind: FragmentKind,
        total_size: u32,
        data: Vec<u8>,
    ) -> Result<(), Error> {
        if self.fragment.is_some() {
            self.disconnect();
            return Err(Error::MessageProtocol("fragment stream already open"));
        }
        let mut stream = match FragmentStream::new(kind, total_size, &self.config) {
            Ok(stream) => stream,
            Err(e) => {
                self.disconnect();
                return Err(e);
            }
        };
        if let Err(e) = stream.push(&data, &self.config) {
            self.disconnect();
            return Err(e);
        }
        self.finish_or_hold_fragment(stream)
    }

    fn handle_fragment_part(&mut self, kind: FragmentKind, data: Vec<u8>) -> Result<(), Error> {
        let mut stream = self
            .fragment
            .take()
            .ok_or(Error::MessageProtocol("no fragment stream open"))?;
        if stream.kind != kind {
            self.disconnect();
            return Err(Error::MessageProtocol(
                "fragment continuation type mismatch",
            ));
        }
        if let Err(e) = stream.push(&data, &self.config) {
            self.disconnect();
            return Err(e);
        }
        self.finish_or_hold_fragment(stream)
    }

    fn finish_or_hold_fragment(&mut self, stream: FragmentStream) -> Result<(), Error> {
        if stream.is_complete() {
            self.complete_fragment(stream)
        } else {
            self.fragment = Some(stream);
            Ok(())
        }
    }

    fn complete_fragment(&mut self, stream: FragmentStream) -> Result<(), Error> {
        let kind = stream.kind;
        let buffer = stream.into_buffer();
        match kind {
            FragmentKind::Eval => self.run_eval(&buffer, false),
            FragmentKind::Throw => self.run_eval(&buffer, true),
            FragmentKind::ClientSource => {
                self.pending_client_source = Some(buffer);
                Ok(())
            }
        }
    }

    fn run_eval(&mut self, buffer: &[u8], is_throw: bool) -> Result<(), Error> {
        let expression = String::from_utf8(buffer.to_vec())?;
        let outcome = self.host.evaluate(&expression, is_throw);
        let (text, subtype) = match outcome {
            EvalOutcome::Ok(text) => (text, 1u8),
            EvalOutcome::Err(text) => (text, 2u8),
        };
        trace!("eval completed, subtype={subtype}");
        let max = self.config.max_send_payload;
        let session = &mut self.session;
        message::send_fragmented_with_trailer(
            |frame| session.send(frame),
            OutboundType::EvalResult as u8,
            OutboundType::EvalResultEnd as u8,
            text.as_bytes(),
            subtype,
            max,
        )
    }

    /// §7 "Transport I/O" policy: close, clear all mode flags except
    /// `VmIgnore`, release every pending-free node unconditionally.
    fn disconnect(&mut self) {
        if self.session.is_closed() && !self.flags.contains(Flag::Connected) {
            return;
        }
        warn!("closing debug session");
        self.session.close();
        for header in self.pending_free.drain_all() {
            self.host.free_byte_code(header.cp);
        }
        self.flags.reset_on_disconnect();
        self.fragment = None;
        self.pending_client_source = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{BacktraceFrame, MemStats};
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeHost {
        functions: HashMap<Cp, bool>,
        vm_stop: bool,
        vm_ignore: bool,
        vm_ignore_exception: bool,
        breakpoints: Vec<(Cp, u32, bool)>,
        eval_result: Option<EvalOutcome>,
        freed: Vec<Cp>,
        step_mode: Option<StepMode>,
    }

    impl HostEngine for FakeHost {
        fn has_function(&self, cp: Cp) -> bool {
            *self.functions.get(&cp).unwrap_or(&false)
        }
        fn update_breakpoint(&mut self, cp: Cp, offset: u32, enable: bool) {
            self.breakpoints.push((cp, offset, enable));
        }
        fn set_vm_stop(&mut self, stop: bool) {
            self.vm_stop = stop;
        }
        fn set_step_mode(&mut self, mode: StepMode) {
            self.step_mode = Some(mode);
        }
        fn set_vm_ignore(&mut self, ignore: bool) {
            self.vm_ignore = ignore;
        }
        fn set_vm_ignore_exception(&mut self, ignore: bool) {
            self.vm_ignore_exception = ignore;
        }
        fn evaluate(&mut self, _expression: &str, _is_throw: bool) -> EvalOutcome {
            self.eval_result
                .clone()
                .unwrap_or(EvalOutcome::Ok(String::new()))
        }
        fn backtrace(&self, _max_depth: u32) -> Vec<BacktraceFrame> {
            Vec::new()
        }
        fn memstats(&self) -> MemStats {
            MemStats::default()
        }
        fn free_byte_code(&mut self, cp: Cp) {
            self.freed.push(cp);
        }
    }

    #[test]
    fn mode_flags_reject_breakpoint_only_command_in_run_mode() {
        let flags = ModeFlags::new();
        let run_subset_only = matches!(InboundType::Continue, InboundType::Continue);
        assert!(run_subset_only);
        assert!(!flags.contains(Flag::BreakpointMode));
    }

    #[test]
    fn fake_host_tracks_freed_cps() {
        let mut host = FakeHost::default();
        host.functions.insert(0xABCD, true);
        assert!(host.has_function(0xABCD));
        host.free_byte_code(0xABCD);
        assert_eq!(host.freed, vec![0xABCD]);
    }

    #[test]
    fn wait_for_client_source_refuses_when_breakpoint_mode_is_set() {
        let transport = Transport::bind(0).unwrap();
        let port = transport.local_addr().unwrap().port();

        let client = std::thread::spawn(move || {
            let mut stream =
                std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();
            let request = b"GET /jerry-debugger HTTP/1.1\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";
            use std::io::{Read, Write};
            stream.write_all(request).unwrap();
            let mut buf = [0u8; 512];
            let mut filled = 0;
            while !String::from_utf8_lossy(&buf[..filled]).contains("\r\n\r\n") {
                filled += stream.read(&mut buf[filled..]).unwrap();
            }
            // drain the CONFIGURATION frame the accept() handshake sends.
            let mut header = [0u8; 2];
            stream.read_exact(&mut header).unwrap();
            let mut payload = vec![0u8; header[1] as usize];
            if !payload.is_empty() {
                stream.read_exact(&mut payload).unwrap();
            }
        });

        let mut engine =
            DebugEngine::accept(&transport, FakeHost::default(), SessionConfig::default())
                .unwrap();
        client.join().unwrap();

        engine.flags.insert(Flag::BreakpointMode);

        let result = engine.wait_for_client_source(|_, _, _| ClientSourceDecision::Accepted);
        assert!(result.is_err());
    }
}

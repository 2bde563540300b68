//! Mode flags and in-progress fragment tracking (§3 "Mode flags" /
//! "Fragmented payload", §9 "Macro-driven bitflag manipulation").

use crate::config::SessionConfig;
use crate::error::Error;
use crate::message::InboundType;

const CONNECTED: u16 = 1 << 0;
const BREAKPOINT_MODE: u16 = 1 << 1;
const VM_STOP: u16 = 1 << 2;
const VM_IGNORE: u16 = 1 << 3;
const VM_IGNORE_EXCEPTION: u16 = 1 << 4;
const PARSER_WAIT: u16 = 1 << 5;
const PARSER_WAIT_MODE: u16 = 1 << 6;
const CLIENT_SOURCE_MODE: u16 = 1 << 7;
const CLIENT_NO_SOURCE: u16 = 1 << 8;
const CONTEXT_RESET_MODE: u16 = 1 << 9;
const THROW_ERROR_FLAG: u16 = 1 << 10;

/// A single bit in [`ModeFlags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Connected,
    BreakpointMode,
    VmStop,
    VmIgnore,
    VmIgnoreException,
    ParserWait,
    ParserWaitMode,
    ClientSourceMode,
    ClientNoSource,
    ContextResetMode,
    ThrowErrorFlag,
}

impl Flag {
    fn bit(self) -> u16 {
        match self {
            Flag::Connected => CONNECTED,
            Flag::BreakpointMode => BREAKPOINT_MODE,
            Flag::VmStop => VM_STOP,
            Flag::VmIgnore => VM_IGNORE,
            Flag::VmIgnoreException => VM_IGNORE_EXCEPTION,
            Flag::ParserWait => PARSER_WAIT,
            Flag::ParserWaitMode => PARSER_WAIT_MODE,
            Flag::ClientSourceMode => CLIENT_SOURCE_MODE,
            Flag::ClientNoSource => CLIENT_NO_SOURCE,
            Flag::ContextResetMode => CONTEXT_RESET_MODE,
            Flag::ThrowErrorFlag => THROW_ERROR_FLAG,
        }
    }
}

/// An integer-backed set of independent mode bits, atomically updated
/// (single-threaded, so "atomic" just means "no half-updated state is
/// ever observed between two flag writes", §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModeFlags(u16);

impl ModeFlags {
    pub fn new() -> Self {
        ModeFlags(0)
    }

    pub fn contains(self, flag: Flag) -> bool {
        self.0 & flag.bit() != 0
    }

    pub fn insert(&mut self, flag: Flag) {
        self.0 |= flag.bit();
    }

    pub fn remove(&mut self, flag: Flag) {
        self.0 &= !flag.bit();
    }

    pub fn set(&mut self, flag: Flag, value: bool) {
        if value {
            self.insert(flag);
        } else {
            self.remove(flag);
        }
    }

    /// Enter `BreakpointMode`, as exiting `ClientSourceMode` first if it
    /// was set (mutual exclusivity, §3, §9 open question: `ClientSourceMode`
    /// is strictly dominant only while `wait_for_client_source` itself is
    /// on the stack, never concurrently with `BreakpointMode`).
    pub fn enter_breakpoint_mode(&mut self) {
        self.remove(Flag::ClientSourceMode);
        self.insert(Flag::BreakpointMode);
    }

    pub fn leave_breakpoint_mode(&mut self) {
        self.remove(Flag::BreakpointMode);
    }

    /// Enter `ClientSourceMode`, exiting `BreakpointMode` first.
    pub fn enter_client_source_mode(&mut self) {
        self.remove(Flag::BreakpointMode);
        self.insert(Flag::ClientSourceMode);
    }

    pub fn leave_client_source_mode(&mut self) {
        self.remove(Flag::ClientSourceMode);
        self.remove(Flag::ClientNoSource);
    }

    /// Clear everything down to the bare minimum on disconnect (§7
    /// "Transport I/O" policy: clear all mode flags except `VmIgnore`).
    pub fn reset_on_disconnect(&mut self) {
        let keep_ignore = self.contains(Flag::VmIgnore);
        self.0 = 0;
        self.set(Flag::VmIgnore, keep_ignore);
    }

    /// Invariant #4 (§8): never both breakpoint- and client-source mode.
    pub fn is_consistent(self) -> bool {
        if self.contains(Flag::BreakpointMode) && self.contains(Flag::ClientSourceMode) {
            return false;
        }
        if self.contains(Flag::ParserWaitMode) && !self.contains(Flag::ParserWait) {
            return false;
        }
        if !self.contains(Flag::Connected) && self.0 != 0 {
            return false;
        }
        true
    }
}

/// Which inbound fragmentation stream is currently open (§3 "Fragmented
/// payload", §4.4 "Inbound fragmentation").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    Eval,
    ClientSource,
    Throw,
}

impl FragmentKind {
    pub fn continuation_type(self) -> InboundType {
        match self {
            FragmentKind::Eval => InboundType::EvalPart,
            FragmentKind::ClientSource => InboundType::ClientSourcePart,
            FragmentKind::Throw => InboundType::ThrowPart,
        }
    }
}

/// State of an in-progress multi-frame inbound payload, owned by the
/// session for the stream's whole lifetime (§3 "Fragmented payload").
#[derive(Debug, Clone)]
pub struct FragmentStream {
    pub kind: FragmentKind,
    pub total_size: usize,
    buffer: Vec<u8>,
}

impl FragmentStream {
    pub fn new(kind: FragmentKind, total_size: u32, config: &SessionConfig) -> Result<Self, Error> {
        let total_size = total_size as usize;
        if total_size > config.max_fragment_total_size {
            return Err(Error::FragmentTooLarge(
                total_size,
                config.max_fragment_total_size,
            ));
        }
        Ok(FragmentStream {
            kind,
            total_size,
            buffer: Vec::with_capacity(total_size.min(config.max_fragment_total_size)),
        })
    }

    /// Append one continuation chunk. Errors if it would overshoot either
    /// the announced `total_size` or the configured hard cap.
    pub fn push(&mut self, chunk: &[u8], config: &SessionConfig) -> Result<(), Error> {
        if self.buffer.len() + chunk.len() > config.max_fragment_total_size {
            return Err(Error::FragmentTooLarge(
                self.buffer.len() + chunk.len(),
                config.max_fragment_total_size,
            ));
        }
        if self.buffer.len() + chunk.len() > self.total_size {
            return Err(Error::MessageProtocol(
                "fragment stream received more data than its announced total_size",
            ));
        }
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.buffer.len() >= self.total_size
    }

    pub fn into_buffer(self) -> Vec<u8> {
        self.buffer
    }
}

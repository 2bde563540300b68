//! The contract the protocol engine expects from the embedding script
//! engine (§6.4 "Embedder surface" plus the calls made *into* the host
//! described throughout §4.5).
//!
//! This is the seam between transport and application: the engine never
//! inspects byte-code or evaluates expressions itself, it only calls out
//! through a trait.

use crate::bytecode::Cp;

/// One frame of a backtrace (§6.2 rows 20/21 `BACKTRACE[_END]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacktraceFrame {
    pub cp: Cp,
    pub offset: u32,
}

/// Snapshot of allocator counters (§6.2 row 15 `MEMSTATS_RECEIVE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemStats {
    pub allocated: u32,
    pub byte_code: u32,
    pub strings: u32,
    pub objects: u32,
    pub properties: u32,
}

/// Outcome of a host-side `EVAL`/`THROW` evaluation (§4.5 "Evaluation").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalOutcome {
    Ok(String),
    Err(String),
}

/// What a user callback decided about one delivered `CLIENT_SOURCE`
/// buffer (§4.5 "Client-source loop", §6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientSourceDecision {
    Accepted,
    Rejected,
}

/// Outcome of the whole client-source idle loop (§6.4
/// `wait_for_client_source`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientSourceOutcome {
    ReceiveFailed,
    Received,
    End,
    ContextReset,
}

/// Which of `STEP`/`NEXT`/`FINISH` armed the next stop (§4.5 "Stepping
/// semantics"). The host owns the call stack, so it is the only side
/// that can tell a nested call from a sibling instruction or recognize
/// the return to the current frame's caller; the engine just conveys
/// which of the three was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    /// `STEP`: stop at the next instruction that emits a breakpoint,
    /// including inside a nested call.
    Into,
    /// `NEXT`: like `Into`, but breakpoints inside nested calls are
    /// suppressed by stack depth.
    Over,
    /// `FINISH`: continue until control returns to the caller of the
    /// current frame.
    Out,
}

/// Everything the protocol engine needs from the host script engine.
///
/// Implementors own byte-code storage, the call stack, and expression
/// evaluation; the engine only ever holds opaque [`Cp`] handles.
pub trait HostEngine {
    /// Whether `cp` still identifies a live function (used to reject
    /// commands referencing an already-freed `Cp`, §8 invariant 5 / S5).
    fn has_function(&self, cp: Cp) -> bool;

    /// `UPDATE_BREAKPOINT`: enable/disable the breakpoint at `(cp, offset)`.
    fn update_breakpoint(&mut self, cp: Cp, offset: u32, enable: bool);

    /// Toggle `VmStop` honored by the interpreter loop (§4.5 "Stepping semantics").
    fn set_vm_stop(&mut self, stop: bool);

    /// Arm `STEP`/`NEXT`/`FINISH` (§4.5 "Stepping semantics"). Distinct
    /// from `set_vm_stop` because `NEXT` and `FINISH` both need more
    /// than a single stop/go bit: the host must additionally track
    /// stack depth to suppress nested-call breakpoints (`NEXT`) or to
    /// recognize the return to the current frame's caller (`FINISH`).
    fn set_step_mode(&mut self, mode: StepMode);

    /// `stop_at_breakpoint(enable)` from §6.4: set/clear `VmIgnore`.
    fn set_vm_ignore(&mut self, ignore: bool);

    /// `EXCEPTION_CONFIG`: toggle `VmIgnoreException`.
    fn set_vm_ignore_exception(&mut self, ignore: bool);

    /// Evaluate `expression` (an `EVAL`) or re-throw it (a `THROW`),
    /// returning the client-facing result string.
    fn evaluate(&mut self, expression: &str, is_throw: bool) -> EvalOutcome;

    /// Walk the call stack, most recent frame first. `max_depth == 0`
    /// means unlimited (§6.2 row 16 `GET_BACKTRACE`).
    fn backtrace(&self, max_depth: u32) -> Vec<BacktraceFrame>;

    /// Snapshot current allocator counters (`MEMSTATS`).
    fn memstats(&self) -> MemStats;

    /// Release the byte-code object that was already unlinked from the
    /// pending-free list (§4.6).
    fn free_byte_code(&mut self, cp: Cp);
}

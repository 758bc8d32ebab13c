use crate::value::Value;
use std::fmt::Display;

/// Errors produced by the VM.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VmError {
  /// A JavaScript `throw` value. This is catchable from script.
  #[error("uncaught exception")]
  Throw(Value),
  /// A non-catchable termination condition (heap exhausted, call stack overflow).
  #[error("{0}")]
  Termination(TerminationReason),
  /// A handle whose object has been collected, or that was forged.
  #[error("invalid heap handle")]
  InvalidHandle,
  /// Early (parse) errors produced before execution begins.
  #[error("{0}")]
  Syntax(parse_ses::SyntaxError),
  /// A property descriptor patch that mixes data and accessor fields.
  #[error("property descriptor cannot be both a data and an accessor descriptor")]
  InvalidPropertyDescriptorPatch,
  /// An internal invariant was violated; indicates a bug in the VM itself.
  #[error("invariant violation: {0}")]
  InvariantViolation(&'static str),
}

/// The reason execution terminated.
///
/// Terminations are not catchable by script `try`/`catch`; they unwind out of `evaluate` to the
/// host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationReason {
  OutOfMemory,
  StackOverflow,
}

impl Display for TerminationReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      TerminationReason::OutOfMemory => f.write_str("execution terminated: out of memory"),
      TerminationReason::StackOverflow => f.write_str("execution terminated: stack overflow"),
    }
  }
}

impl VmError {
  /// Shorthand for the out-of-memory termination.
  pub(crate) fn oom() -> Self {
    VmError::Termination(TerminationReason::OutOfMemory)
  }
}

//! Structured error types shared across the miogemm crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to most [`MiogError`] variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (geometry strings, knob names, sizes).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

/// Reason class for a failed derived-parameter computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeriveFailure {
    /// Required local memory exceeds what the device advertises.
    LocalMemoryOverflow,
    /// Macro tile is larger than the problem in m or n.
    TileExceedsProblem,
    /// Workspace staging requested but the geometry provides no workspace.
    WorkspaceMissing,
    /// Micro tile incompatible with the work group shape.
    IllegalMicroTile,
    /// Skew places a work group dimension outside its admissible exponents.
    SkewInfeasible,
    /// Any other reason the hyperparameters cannot be realised.
    Other,
}

impl DeriveFailure {
    /// Stable name used in diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            DeriveFailure::LocalMemoryOverflow => "LocalMemoryOverflow",
            DeriveFailure::TileExceedsProblem => "TileExceedsProblem",
            DeriveFailure::WorkspaceMissing => "WorkspaceMissing",
            DeriveFailure::IllegalMicroTile => "IllegalMicroTile",
            DeriveFailure::SkewInfeasible => "SkewInfeasible",
            DeriveFailure::Other => "Other",
        }
    }
}

/// Error produced when a hyperparameter set cannot be derived for a geometry.
///
/// Derive failures are expected during search and never abort it: the driver
/// treats the offending hyperparameters as an inadmissible neighbor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("derive failed ({}): {detail}", kind.as_str())]
pub struct DeriveError {
    /// Reason class.
    pub kind: DeriveFailure,
    /// Human readable description of the violated invariant.
    pub detail: String,
}

impl DeriveError {
    /// Creates a derive error with the given reason class and detail.
    pub fn new(kind: DeriveFailure, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Canonical error type for the miogemm workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum MiogError {
    /// Malformed user input: geometry string, unknown knob, bad constraint.
    #[error("user input error: {0}")]
    UserInput(ErrorInfo),
    /// No admissible hyperparameters remain under the given constraints.
    #[error("empty search graph: {0}")]
    GraphEmpty(ErrorInfo),
    /// No derivable starting point was found within the retry budget.
    #[error("no valid start: {0}")]
    NoValidStart(ErrorInfo),
    /// Hyperparameters rejected by derived-parameter computation.
    #[error(transparent)]
    Derive(DeriveError),
    /// Device refused to compile a kernel.
    #[error("compile failed: {0}")]
    Compile(ErrorInfo),
    /// Device refused to enqueue or run a kernel.
    #[error("enqueue failed: {0}")]
    Enqueue(ErrorInfo),
    /// Event profiling was requested but the queue does not provide it.
    #[error("profiling missing: {0}")]
    ProfilingMissing(ErrorInfo),
    /// Device result disagrees with the reference computation.
    #[error("numeric sanity failed: {0}")]
    NumericSanity(ErrorInfo),
    /// Unrecoverable device failure; the search aborts with best-so-far.
    #[error("device fatal: {0}")]
    DeviceFatal(ErrorInfo),
    /// Filesystem error while writing outputs or cache entries.
    #[error("io error: {0}")]
    Io(ErrorInfo),
}

impl MiogError {
    /// Returns the structured payload, where the variant carries one.
    pub fn info(&self) -> Option<&ErrorInfo> {
        match self {
            MiogError::UserInput(info)
            | MiogError::GraphEmpty(info)
            | MiogError::NoValidStart(info)
            | MiogError::Compile(info)
            | MiogError::Enqueue(info)
            | MiogError::ProfilingMissing(info)
            | MiogError::NumericSanity(info)
            | MiogError::DeviceFatal(info)
            | MiogError::Io(info) => Some(info),
            MiogError::Derive(_) => None,
        }
    }

    /// Whether the descent loop may absorb this error and continue.
    ///
    /// Everything except user input, an empty graph, a missing start, and a
    /// fatal device reduces to "this neighbor is unusable".
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MiogError::Derive(_)
                | MiogError::Compile(_)
                | MiogError::Enqueue(_)
                | MiogError::ProfilingMissing(_)
                | MiogError::NumericSanity(_)
        )
    }
}

impl From<std::io::Error> for MiogError {
    fn from(err: std::io::Error) -> Self {
        MiogError::Io(ErrorInfo::new("io", err.to_string()))
    }
}

//! Structured error values with validated codes.
//!
//! Every failure in Ranger is reported as a [`RangerError`]: a validated
//! dot-separated code, a message, an optional cause, a heterogeneous context
//! map, user-facing suggestions, recovery actions, a bounded captured stack,
//! and a timestamp. Leaf components create errors with specific codes;
//! middle layers enrich context but never change the code.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::codes;

/// Maximum number of stack frames captured at construction time.
const MAX_STACK_FRAMES: usize = 10;

/// A validated error code of the form `package(.sub_component)?.error_code`.
///
/// Codes are lowercase, dot-separated, two or three segments, each segment
/// matching `[a-z][a-z0-9_]*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ErrorCode(String);

impl ErrorCode {
    /// Parse and validate a code string.
    pub fn new(code: &str) -> std::result::Result<Self, RangerError> {
        if Self::is_valid(code) {
            Ok(Self(code.to_string()))
        } else {
            Err(RangerError::new(
                codes::COMMON_INVALID_INPUT,
                format!("malformed error code: {code:?}"),
            ))
        }
    }

    /// Validate a code string, panicking on malformed input.
    ///
    /// All compile-time code constants in [`crate::codes`] go through this
    /// path; a malformed constant fails the process the first time it is
    /// used rather than producing an unclassifiable error.
    pub fn must_new(code: &str) -> Self {
        match Self::new(code) {
            Ok(c) => c,
            Err(_) => panic!("malformed error code: {code:?}"),
        }
    }

    fn is_valid(code: &str) -> bool {
        let segments: Vec<&str> = code.split('.').collect();
        if !(2..=3).contains(&segments.len()) {
            return false;
        }
        segments.iter().all(|seg| {
            let mut chars = seg.chars();
            match chars.next() {
                Some(c) if c.is_ascii_lowercase() => {}
                _ => return false,
            }
            chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        })
    }

    /// The leading `package` segment.
    pub fn package(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }

    /// The middle `sub_component` segment, when present.
    pub fn component(&self) -> Option<&str> {
        let segments: Vec<&str> = self.0.split('.').collect();
        if segments.len() == 3 {
            Some(segments[1])
        } else {
            None
        }
    }

    /// The trailing `error_code` segment.
    pub fn error_code(&self) -> &str {
        self.0.split('.').last().unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Heterogeneous context value attached to an error.
///
/// A closed sum instead of free-form reflection: integers, strings,
/// booleans, byte strings, and nested maps cover every context key the
/// system records.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ContextValue {
    Int(i64),
    Str(String),
    Bool(bool),
    Bytes(Vec<u8>),
    Map(BTreeMap<String, ContextValue>),
}

impl From<i64> for ContextValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ContextValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<usize> for ContextValue {
    fn from(v: usize) -> Self {
        Self::Int(v as i64)
    }
}

impl From<&str> for ContextValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<bool> for ContextValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<Vec<u8>> for ContextValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

/// A recovery hint attached to an error.
///
/// Actions with `automatic = true` make the error eligible for automatic
/// retry by the recovery manager; the rest are surfaced to the user in the
/// diagnostic report.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryAction {
    pub action_type: String,
    pub description: String,
    pub action: String,
    pub automatic: bool,
}

/// Capability for error types that carry their own structured form.
///
/// Implementors convert losslessly instead of being wrapped as
/// `common.internal` by [`RangerError::from_any`].
pub trait IntoStructured {
    fn into_structured(self) -> RangerError;
}

impl IntoStructured for RangerError {
    fn into_structured(self) -> RangerError {
        self
    }
}

/// The structured error value used by every Ranger component.
pub struct RangerError {
    code: ErrorCode,
    message: String,
    cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    context: BTreeMap<String, ContextValue>,
    suggestions: Vec<String>,
    recovery_actions: Vec<RecoveryAction>,
    stack: Vec<String>,
    timestamp: DateTime<Utc>,
}

impl RangerError {
    /// Create an error with a code and message.
    ///
    /// Captures a bounded stack and a timestamp. The code must be one of the
    /// registered constants in [`crate::codes`]; a malformed literal panics
    /// (fail-fast, matching `must_new`).
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::must_new(code),
            message: message.into(),
            cause: None,
            context: BTreeMap::new(),
            suggestions: Vec::new(),
            recovery_actions: Vec::new(),
            stack: capture_stack(),
            timestamp: Utc::now(),
        }
    }

    /// Attach the underlying cause.
    pub fn with_cause(
        mut self,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Attach a context key/value pair. Chainable.
    pub fn with_context(mut self, key: &str, value: impl Into<ContextValue>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    /// Append a user-facing suggestion. Chainable.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Append a recovery action. Chainable.
    pub fn with_recovery_action(mut self, action: RecoveryAction) -> Self {
        self.recovery_actions.push(action);
        self
    }

    /// Normalize any boxed error to the structured form.
    ///
    /// A structured error passes through unchanged; types implementing
    /// [`IntoStructured`] convert through [`Self::from_structured`];
    /// anything else is wrapped with `common.internal` and kept as the
    /// cause. Idempotent.
    pub fn from_any(err: Box<dyn std::error::Error + Send + Sync + 'static>) -> Self {
        match err.downcast::<RangerError>() {
            Ok(structured) => *structured,
            Err(other) => {
                let message = other.to_string();
                let mut wrapped = Self::new(codes::COMMON_INTERNAL, message);
                wrapped.cause = Some(other);
                wrapped
            }
        }
    }

    /// Normalize a typed error that knows its structured form.
    pub fn from_structured(err: impl IntoStructured) -> Self {
        err.into_structured()
    }

    pub fn code(&self) -> &ErrorCode {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &BTreeMap<String, ContextValue> {
        &self.context
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    pub fn recovery_actions(&self) -> &[RecoveryAction] {
        &self.recovery_actions
    }

    pub fn stack(&self) -> &[String] {
        &self.stack
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// An error is recoverable iff any recovery action is automatic.
    pub fn is_recoverable(&self) -> bool {
        self.recovery_actions.iter().any(|a| a.automatic)
    }

    /// Export the error as a JSON value for diagnostic reports.
    pub fn to_report(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.code.as_str(),
            "message": self.message,
            "cause": self.cause.as_ref().map(|c| c.to_string()),
            "context": self.context,
            "suggestions": self.suggestions,
            "recovery_actions": self.recovery_actions,
            "stack": self.stack,
            "timestamp": self.timestamp.to_rfc3339(),
        })
    }
}

impl fmt::Display for RangerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for RangerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangerError")
            .field("code", &self.code)
            .field("message", &self.message)
            .field("cause", &self.cause)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl std::error::Error for RangerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|c| c as &(dyn std::error::Error + 'static))
    }
}

fn capture_stack() -> Vec<String> {
    let raw = std::backtrace::Backtrace::force_capture().to_string();
    raw.lines()
        .map(str::trim)
        .filter(|line| line.starts_with(|c: char| c.is_ascii_digit()))
        .take(MAX_STACK_FRAMES)
        .map(str::to_string)
        .collect()
}

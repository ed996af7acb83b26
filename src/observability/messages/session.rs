// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for session run lifecycle and execution events.
//!
//! This module contains message types for logging events related to:
//! * Run lifecycle (start, completion, failure)
//! * Individual operation failures inside a run
//! * Panics trapped at the function invocation boundary

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A session run started.
///
/// # Log Level
/// `info!` - Important operational event
pub struct RunStarted {
    pub target_count: usize,
    pub input_count: usize,
}

impl Display for RunStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Starting session run: {} targets, {} global inputs",
            self.target_count, self.input_count
        )
    }
}

impl StructuredLog for RunStarted {
    fn log(&self) {
        tracing::info!(
            target_count = self.target_count,
            input_count = self.input_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "session_run",
            span_name = name,
            target_count = self.target_count,
            input_count = self.input_count,
        )
    }
}

/// A session run completed with every target evaluated.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use dataflow::observability::messages::session::RunCompleted;
/// use std::time::Duration;
///
/// let msg = RunCompleted {
///     target_count: 3,
///     evaluated_count: 7,
///     duration: Duration::from_millis(12),
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct RunCompleted {
    pub target_count: usize,
    pub evaluated_count: usize,
    pub duration: std::time::Duration,
}

impl Display for RunCompleted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Session run completed: {} targets, {} operations evaluated in {:?}",
            self.target_count, self.evaluated_count, self.duration
        )
    }
}

impl StructuredLog for RunCompleted {
    fn log(&self) {
        tracing::info!(
            target_count = self.target_count,
            evaluated_count = self.evaluated_count,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "session_run_completed",
            span_name = name,
            target_count = self.target_count,
            evaluated_count = self.evaluated_count,
            duration = ?self.duration,
        )
    }
}

/// A session run failed on at least one branch.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct RunFailed<'a> {
    pub failure_count: usize,
    pub error: &'a dyn std::error::Error,
}

impl Display for RunFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Session run failed on {} branches: {}",
            self.failure_count, self.error
        )
    }
}

impl StructuredLog for RunFailed<'_> {
    fn log(&self) {
        tracing::error!(
            failure_count = self.failure_count,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "session_run_failed",
            span_name = name,
            failure_count = self.failure_count,
            error = %self.error,
        )
    }
}

/// A single operation finished with an error.
///
/// # Log Level
/// `debug!` - the aggregated failure is reported by [`RunFailed`]
pub struct OperationFailed<'a> {
    pub operation: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for OperationFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Operation {} failed: {}", self.operation, self.error)
    }
}

impl StructuredLog for OperationFailed<'_> {
    fn log(&self) {
        tracing::debug!(
            operation = self.operation,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "operation_failed",
            span_name = name,
            operation = self.operation,
            error = %self.error,
        )
    }
}

/// A registered function panicked and the panic was converted into an error.
///
/// # Log Level
/// `error!` - Failure requiring attention
///
/// # Example
/// ```
/// use dataflow::observability::messages::session::FunctionPanicked;
///
/// let msg = FunctionPanicked {
///     operation: "[graph.rs:10]:{func,vecdiv}",
///     location: "graph.rs:10",
///     message: "attempt to divide by zero",
/// };
///
/// tracing::error!("{}", msg);
/// ```
pub struct FunctionPanicked<'a> {
    pub operation: &'a str,
    pub location: &'a str,
    pub message: &'a str,
}

impl Display for FunctionPanicked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Function of operation {} (built at {}) panicked: {}",
            self.operation, self.location, self.message
        )
    }
}

impl StructuredLog for FunctionPanicked<'_> {
    fn log(&self) {
        tracing::error!(
            operation = self.operation,
            location = self.location,
            panic_message = self.message,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "function_panicked",
            span_name = name,
            operation = self.operation,
            location = self.location,
        )
    }
}

/// A hook callback panicked; the panic was contained and the remaining hooks still ran.
///
/// # Log Level
/// `warn!` - Observer misbehaved, evaluation unaffected
pub struct HookPanicked<'a> {
    pub event: &'a str,
    pub operation: &'a str,
    pub message: &'a str,
}

impl Display for HookPanicked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Hook panicked on {} of operation {}: {}",
            self.event, self.operation, self.message
        )
    }
}

impl StructuredLog for HookPanicked<'_> {
    fn log(&self) {
        tracing::warn!(
            event = self.event,
            operation = self.operation,
            panic_message = self.message,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "hook_panicked",
            span_name = name,
            event = self.event,
            operation = self.operation,
        )
    }
}

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! # Organization
//!
//! * `registry` - registration and lookup events
//! * `flow` - graph construction and shared data store events
//! * `session` - run lifecycle, operation failures and trapped panics
//!
//! # Usage Pattern
//!
//! ```rust
//! use dataflow::observability::messages::flow::VarMaterialized;
//!
//! let msg = VarMaterialized { name: "counter" };
//!
//! tracing::debug!("{}", msg);
//! ```

use tracing::Span;

pub mod flow;
pub mod registry;
pub mod session;

/// A message that knows its own log level and structured fields.
pub trait StructuredLog {
    /// Emit the message at its level with structured fields attached.
    fn log(&self);

    /// Build a span carrying the same fields as [`StructuredLog::log`].
    fn span(&self, name: &str) -> Span;
}

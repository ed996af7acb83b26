// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for graph construction and the shared data store.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// An operation could not be built and was replaced by a failing operation.
///
/// # Log Level
/// `warn!` - the error only surfaces when the operation is evaluated
pub struct OperationBuildDeferred<'a> {
    pub name: &'a str,
    pub location: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for OperationBuildDeferred<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Operation '{}' at {} replaced by error operation: {}",
            self.name, self.location, self.error
        )
    }
}

impl StructuredLog for OperationBuildDeferred<'_> {
    fn log(&self) {
        tracing::warn!(
            op_name = self.name,
            location = self.location,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "operation_build_deferred",
            span_name = name,
            op_name = self.name,
            location = self.location,
        )
    }
}

/// A variable was stored for the first time.
///
/// # Log Level
/// `debug!` - Detailed diagnostic information
pub struct VarMaterialized<'a> {
    pub name: &'a str,
}

impl Display for VarMaterialized<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Variable '{}' materialized from its initializer", self.name)
    }
}

impl StructuredLog for VarMaterialized<'_> {
    fn log(&self) {
        tracing::debug!(var_name = self.name, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("var_materialized", span_name = name, var_name = self.name)
    }
}

/// A variable was overwritten by a set operation.
///
/// # Log Level
/// `debug!` - Detailed diagnostic information
pub struct VarOverwritten<'a> {
    pub name: &'a str,
}

impl Display for VarOverwritten<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Variable '{}' overwritten", self.name)
    }
}

impl StructuredLog for VarOverwritten<'_> {
    fn log(&self) {
        tracing::debug!(var_name = self.name, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("var_overwritten", span_name = name, var_name = self.name)
    }
}

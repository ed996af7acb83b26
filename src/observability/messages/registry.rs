// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for function registration.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A function was registered (or replaced an existing registration).
///
/// # Log Level
/// `debug!` - Detailed diagnostic information
///
/// # Example
/// ```
/// use dataflow::observability::messages::registry::EntryRegistered;
///
/// let msg = EntryRegistered {
///     name: "vecadd",
///     kind: "simple",
///     replaced: false,
/// };
///
/// tracing::debug!("{}", msg);
/// ```
pub struct EntryRegistered<'a> {
    pub name: &'a str,
    pub kind: &'a str,
    pub replaced: bool,
}

impl Display for EntryRegistered<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        if self.replaced {
            write!(f, "Replaced {} entry '{}'", self.kind, self.name)
        } else {
            write!(f, "Registered {} entry '{}'", self.kind, self.name)
        }
    }
}

impl StructuredLog for EntryRegistered<'_> {
    fn log(&self) {
        tracing::debug!(
            entry_name = self.name,
            kind = self.kind,
            replaced = self.replaced,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "entry_registered",
            span_name = name,
            entry_name = self.name,
            kind = self.kind,
        )
    }
}

/// Two registries were merged.
///
/// # Log Level
/// `debug!` - Detailed diagnostic information
pub struct RegistryMerged {
    pub merged_count: usize,
    pub total_count: usize,
}

impl Display for RegistryMerged {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Merged {} entries into registry ({} total)",
            self.merged_count, self.total_count
        )
    }
}

impl StructuredLog for RegistryMerged {
    fn log(&self) {
        tracing::debug!(
            merged_count = self.merged_count,
            total_count = self.total_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "registry_merged",
            span_name = name,
            merged_count = self.merged_count,
            total_count = self.total_count,
        )
    }
}

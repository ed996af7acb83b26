// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! All diagnostic output of the engine goes through message types defined in
//! [`messages`]. Each message is a small struct implementing `Display` plus
//! [`messages::StructuredLog`], so call sites never carry magic strings and the same
//! message renders identically as a log line and as span fields.
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::registry` - function registration events
//! * `messages::flow` - graph construction and shared state events
//! * `messages::session` - run lifecycle and execution trap events
//!
//! # Usage
//!
//! ```rust
//! use dataflow::observability::messages::session::RunStarted;
//! use dataflow::observability::messages::StructuredLog;
//!
//! let msg = RunStarted {
//!     target_count: 2,
//!     input_count: 1,
//! };
//!
//! msg.log();
//! ```

pub mod messages;

use crate::config::consts::DEFAULT_LOG_FILTER;
use crate::config::Config;
use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `filter` (falls back to `RUST_LOG`, then
/// [`DEFAULT_LOG_FILTER`]).
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_tracing(filter: Option<&str>) {
    let env_filter = match filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init();
}

/// Install the subscriber with the filter configured in `config`, if any.
pub fn init_tracing_from_config(config: &Config) {
    init_tracing(config.log_filter.as_deref());
}

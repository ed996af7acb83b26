// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// Concurrency used when neither the config nor the platform reports one
pub const FALLBACK_MAX_CONCURRENCY: usize = 4;
/// Log filter used when the config and `RUST_LOG` leave it unset
pub const DEFAULT_LOG_FILTER: &str = "info";

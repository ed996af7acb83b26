// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod flow;

pub use flow::{ErrorKind, FlowError, FlowResult};

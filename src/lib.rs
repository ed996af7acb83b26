// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod config;     // config loading + executor options
pub mod engine;     // session evaluator
pub mod errors;     // error handling
pub mod flow;       // graph model
pub mod hooks;      // lifecycle observers
pub mod observability;
pub mod registry;   // type-erased function registry

pub use engine::Session;
pub use errors::{ErrorKind, FlowError, FlowResult};
pub use flow::{Flow, OpKind, Operation, Param};
pub use hooks::{Hook, HookEvent};
pub use registry::{Registry, Value};

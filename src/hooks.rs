// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Lifecycle observers.
//!
//! A [`Hook`] is a set of optional callbacks attached to a [`Flow`](crate::flow::Flow).
//! Sessions trigger them for every operation they evaluate, in this order, each at most once
//! per operation per session:
//!
//! ```text
//! Wait ──► Start ──► Finish(value)
//!                └─► Error(err)
//! ```
//!
//! `Wait` only fires for operations that resolve inputs. Callbacks run synchronously on the
//! evaluating task, so a slow hook slows the evaluation it observes.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use crate::errors::FlowError;
use crate::flow::Operation;
use crate::observability::messages::session::HookPanicked;
use crate::observability::messages::StructuredLog;
use crate::registry::{panic_message, Value};

pub type EventFn = Arc<dyn Fn(&Operation, SystemTime) + Send + Sync>;
pub type FinishFn = Arc<dyn Fn(&Operation, SystemTime, &Value) + Send + Sync>;
pub type ErrorFn = Arc<dyn Fn(&Operation, SystemTime, &FlowError) + Send + Sync>;
pub type AnyFn = Arc<dyn Fn(&HookEvent<'_>, &Operation, SystemTime) + Send + Sync>;

/// A lifecycle transition of one operation.
#[derive(Debug, Clone, Copy)]
pub enum HookEvent<'a> {
    Wait,
    Start,
    Finish(&'a Value),
    Error(&'a FlowError),
}

impl HookEvent<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            HookEvent::Wait => "Wait",
            HookEvent::Start => "Start",
            HookEvent::Finish(_) => "Finish",
            HookEvent::Error(_) => "Error",
        }
    }
}

impl fmt::Display for HookEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Optional callback slots. Unset slots are skipped.
///
/// ```rust
/// use dataflow::hooks::Hook;
///
/// let hook = Hook::new()
///     .on_start(|op, _| println!("start {}", op))
///     .on_error(|op, _, err| eprintln!("{} failed: {}", op, err));
/// # let _ = hook;
/// ```
#[derive(Clone, Default)]
pub struct Hook {
    pub wait: Option<EventFn>,
    pub start: Option<EventFn>,
    pub finish: Option<FinishFn>,
    pub error: Option<ErrorFn>,
    pub any: Option<AnyFn>,
}

impl Hook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_wait(mut self, f: impl Fn(&Operation, SystemTime) + Send + Sync + 'static) -> Self {
        self.wait = Some(Arc::new(f));
        self
    }

    pub fn on_start(mut self, f: impl Fn(&Operation, SystemTime) + Send + Sync + 'static) -> Self {
        self.start = Some(Arc::new(f));
        self
    }

    pub fn on_finish(
        mut self,
        f: impl Fn(&Operation, SystemTime, &Value) + Send + Sync + 'static,
    ) -> Self {
        self.finish = Some(Arc::new(f));
        self
    }

    pub fn on_error(
        mut self,
        f: impl Fn(&Operation, SystemTime, &FlowError) + Send + Sync + 'static,
    ) -> Self {
        self.error = Some(Arc::new(f));
        self
    }

    /// Called for every event, before the event's own slot.
    pub fn on_any(
        mut self,
        f: impl Fn(&HookEvent<'_>, &Operation, SystemTime) + Send + Sync + 'static,
    ) -> Self {
        self.any = Some(Arc::new(f));
        self
    }

    fn call(&self, event: &HookEvent<'_>, op: &Operation) {
        if let Some(any) = &self.any {
            any(event, op, SystemTime::now());
        }
        match event {
            HookEvent::Wait => {
                if let Some(wait) = &self.wait {
                    wait(op, SystemTime::now());
                }
            }
            HookEvent::Start => {
                if let Some(start) = &self.start {
                    start(op, SystemTime::now());
                }
            }
            HookEvent::Finish(value) => {
                if let Some(finish) = &self.finish {
                    finish(op, SystemTime::now(), value);
                }
            }
            HookEvent::Error(err) => {
                if let Some(error) = &self.error {
                    error(op, SystemTime::now(), err);
                }
            }
        }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("wait", &self.wait.is_some())
            .field("start", &self.start.is_some())
            .field("finish", &self.finish.is_some())
            .field("error", &self.error.is_some())
            .field("any", &self.any.is_some())
            .finish()
    }
}

/// Hooks attached to one flow, in attachment order.
#[derive(Default)]
pub struct Hooks {
    hooks: RwLock<Vec<Hook>>,
}

impl Hooks {
    pub fn attach(&self, hook: Hook) {
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    /// Invoke every hook for `event`. The list is copied first, so a callback may attach
    /// further hooks; those only see later events. A panicking callback is logged and the
    /// remaining hooks still run.
    pub fn trigger(&self, event: HookEvent<'_>, op: &Operation) {
        let hooks = self
            .hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for hook in &hooks {
            let call = AssertUnwindSafe(|| hook.call(&event, op));
            if let Err(payload) = panic::catch_unwind(call) {
                HookPanicked {
                    event: event.name(),
                    operation: &op.to_string(),
                    message: &panic_message(payload.as_ref()),
                }
                .log();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.hooks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks").field("count", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::Flow;
    use serde_json::json;
    use std::sync::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, label: &'static str) -> Hook {
        let any_log = log.clone();
        let wait_log = log.clone();
        let start_log = log.clone();
        let finish_log = log.clone();
        let error_log = log.clone();
        Hook::new()
            .on_any(move |event, _, _| {
                any_log
                    .lock()
                    .unwrap()
                    .push(format!("{}:any:{}", label, event.name()))
            })
            .on_wait(move |_, _| wait_log.lock().unwrap().push(format!("{}:wait", label)))
            .on_start(move |_, _| start_log.lock().unwrap().push(format!("{}:start", label)))
            .on_finish(move |_, _, v| {
                finish_log
                    .lock()
                    .unwrap()
                    .push(format!("{}:finish:{}", label, v))
            })
            .on_error(move |_, _, e| {
                error_log
                    .lock()
                    .unwrap()
                    .push(format!("{}:error:{}", label, e))
            })
    }

    #[test]
    fn test_trigger_order_any_then_typed_in_attachment_order() {
        let flow = Flow::new();
        let op = flow.constant(1);
        let log = Arc::new(Mutex::new(Vec::new()));

        let hooks = Hooks::default();
        hooks.attach(recorder(&log, "first"));
        hooks.attach(recorder(&log, "second"));

        let value = json!(1);
        hooks.trigger(HookEvent::Finish(&value), &op);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "first:any:Finish",
                "first:finish:1",
                "second:any:Finish",
                "second:finish:1",
            ]
        );
    }

    #[test]
    fn test_unset_slots_are_skipped() {
        let flow = Flow::new();
        let op = flow.constant(1);
        let log = Arc::new(Mutex::new(Vec::new()));
        let start_log = log.clone();

        let hooks = Hooks::default();
        hooks.attach(Hook::new().on_start(move |_, _| start_log.lock().unwrap().push("start")));

        hooks.trigger(HookEvent::Wait, &op);
        let err = FlowError::InvalidInput("x".into());
        hooks.trigger(HookEvent::Error(&err), &op);
        hooks.trigger(HookEvent::Start, &op);

        assert_eq!(*log.lock().unwrap(), vec!["start"]);
        assert_eq!(hooks.len(), 1);
    }

    #[test]
    fn test_panicking_hook_is_contained() {
        let flow = Flow::new();
        let op = flow.constant(1);
        let log = Arc::new(Mutex::new(Vec::new()));

        let hooks = Hooks::default();
        hooks.attach(Hook::new().on_start(|_, _| panic!("hook boom")));
        hooks.attach(recorder(&log, "after"));

        hooks.trigger(HookEvent::Start, &op);

        assert_eq!(*log.lock().unwrap(), vec!["after:any:Start", "after:start"]);
    }

    #[test]
    fn test_event_names() {
        let value = Value::Null;
        let err = FlowError::InvalidOperation("x".into());
        let names: Vec<_> = [
            HookEvent::Wait,
            HookEvent::Start,
            HookEvent::Finish(&value),
            HookEvent::Error(&err),
        ]
        .iter()
        .map(|e| e.to_string())
        .collect();
        assert_eq!(names, vec!["Wait", "Start", "Finish", "Error"]);
    }
}

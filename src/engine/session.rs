// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use futures_util::future::BoxFuture;

use crate::errors::{FlowError, FlowResult};
use crate::flow::{Executor, Flow, Node, OpId, Operation};
use crate::hooks::HookEvent;
use crate::observability::messages::flow::VarMaterialized;
use crate::observability::messages::session::{
    OperationFailed, RunCompleted, RunFailed, RunStarted,
};
use crate::observability::messages::StructuredLog;
use crate::registry::{trap, Callable, Value};

/// Memoized outcome of one operation. The async lock is held while the operation executes,
/// so a second branch reaching the same operation waits and then reads the stored result.
type Slot = Arc<tokio::sync::Mutex<Option<FlowResult<Value>>>>;

/// One evaluation run over a [`Flow`].
///
/// A session memoizes every operation it evaluates, failures included: within one session an
/// operation's body runs at most once no matter how many paths reach it. Many sessions may
/// evaluate the same flow concurrently; they only share the flow's data store and constants.
///
/// ## Execution Strategy
///
/// Evaluating a list of sibling operations (the targets of [`Session::run`], or the inputs of
/// one operation) spawns one task per element and joins on all of them; this recurses down the
/// graph. A failing branch does not cancel its siblings. Registered functions run on the
/// blocking pool, at most `max_concurrency` at a time per flow, behind the execution trap.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    flow: Flow,
    inputs: RwLock<Arc<Vec<Value>>>,
    slots: Mutex<HashMap<OpId, Slot>>,
}

impl Session {
    pub(crate) fn new(flow: Flow) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                flow,
                inputs: RwLock::new(Arc::new(Vec::new())),
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn flow(&self) -> &Flow {
        &self.inner.flow
    }

    /// Set the global inputs read by [`Flow::input`] operations.
    pub fn inputs(&self, values: Vec<Value>) -> &Self {
        *self
            .inner
            .inputs
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(values);
        self
    }

    /// Evaluate `ops` concurrently.
    ///
    /// Returns the results in target order, or one combined error holding every failed
    /// branch once all branches have finished.
    pub async fn run(&self, ops: &[Operation]) -> FlowResult<Vec<Value>> {
        let started = Instant::now();
        RunStarted {
            target_count: ops.len(),
            input_count: self.global_inputs().len(),
        }
        .log();

        let targets = ops
            .iter()
            .map(|op| {
                if op.flow().same_flow(self.flow()) {
                    Ok(op.id())
                } else {
                    Err(FlowError::InvalidOperation(format!(
                        "{} belongs to a different flow",
                        op
                    )))
                }
            })
            .collect();

        let result = self.fan_out(targets).await;
        match &result {
            Ok(_) => RunCompleted {
                target_count: ops.len(),
                evaluated_count: self.evaluated_count(),
                duration: started.elapsed(),
            }
            .log(),
            Err(e) => RunFailed {
                failure_count: e.failures().len(),
                error: e,
            }
            .log(),
        }
        result
    }

    pub async fn run_one(&self, op: &Operation) -> FlowResult<Value> {
        let values = self.run(std::slice::from_ref(op)).await?;
        Ok(values.into_iter().next().unwrap_or_default())
    }

    /// Number of operations evaluated (or in flight) in this session.
    pub fn evaluated_count(&self) -> usize {
        self.inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn global_inputs(&self) -> Arc<Vec<Value>> {
        self.inner
            .inputs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn slot(&self, id: OpId) -> Slot {
        self.inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_default()
            .clone()
    }

    /// Spawn one task per target and join on all of them.
    async fn fan_out(&self, targets: Vec<FlowResult<OpId>>) -> FlowResult<Vec<Value>> {
        let tasks: Vec<_> = targets
            .into_iter()
            .map(|target| target.map(|id| (id, tokio::spawn(self.clone().evaluate(id)))))
            .collect();

        let mut values = Vec::with_capacity(tasks.len());
        let mut errors = Vec::new();
        for task in tasks {
            let outcome = match task {
                Ok((id, handle)) => handle.await.unwrap_or_else(|join_error| {
                    Err(FlowError::InvalidOperation(format!(
                        "evaluation task for operation {} failed: {}",
                        id, join_error
                    )))
                }),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(value) => values.push(value),
                Err(e) => errors.push(e),
            }
        }

        if errors.is_empty() {
            Ok(values)
        } else {
            Err(FlowError::combine(errors))
        }
    }

    /// Memoized evaluation of one operation.
    fn evaluate(self, id: OpId) -> BoxFuture<'static, FlowResult<Value>> {
        Box::pin(async move {
            let slot = self.slot(id);
            let mut memo = slot.lock().await;
            if let Some(result) = memo.as_ref() {
                return result.clone();
            }

            let op = Operation {
                flow: self.flow().clone(),
                id,
            };
            let node = self.flow().node(id);
            let result = self.execute(&op, &node).await;
            *memo = Some(result.clone());

            match &result {
                Ok(value) => self.flow().hooks().trigger(HookEvent::Finish(value), &op),
                Err(e) => {
                    OperationFailed {
                        operation: &op.to_string(),
                        error: e,
                    }
                    .log();
                    self.flow().hooks().trigger(HookEvent::Error(e), &op);
                }
            }
            result
        })
    }

    /// Run the operation body. Fires `Start`, preceded by `Wait` when inputs are resolved.
    async fn execute(&self, op: &Operation, node: &Node) -> FlowResult<Value> {
        let flow = self.flow();
        match &node.executor {
            Executor::Func(callable) => {
                let args = self.process_inputs(op, node).await?;
                self.invoke(node, callable, args).await
            }
            Executor::Var(name) => {
                if let Some(value) = flow.var_value(name) {
                    flow.hooks().trigger(HookEvent::Start, op);
                    return Ok(value);
                }
                let initial = first(self.process_inputs(op, node).await?);
                let (value, stored) = flow.materialize_var(name, initial);
                if stored {
                    VarMaterialized { name }.log();
                }
                Ok(value)
            }
            Executor::SetVar(name) => {
                let value = first(self.process_inputs(op, node).await?);
                flow.store_var(name, value.clone());
                Ok(value)
            }
            Executor::Const(slot) => {
                flow.hooks().trigger(HookEvent::Start, op);
                flow.const_value(*slot).ok_or_else(|| {
                    FlowError::InvalidOperation(format!("constant slot {} does not exist", slot))
                })
            }
            Executor::Input(index) => {
                flow.hooks().trigger(HookEvent::Start, op);
                let inputs = self.global_inputs();
                inputs.get(*index).cloned().ok_or_else(|| {
                    FlowError::InvalidInput(format!(
                        "session input {} out of range ({} provided)",
                        index,
                        inputs.len()
                    ))
                })
            }
            Executor::Fail(error) => {
                flow.hooks().trigger(HookEvent::Start, op);
                Err(error.clone())
            }
        }
    }

    /// Fire `Wait`, evaluate every input concurrently, then fire `Start`.
    async fn process_inputs(&self, op: &Operation, node: &Node) -> FlowResult<Vec<Value>> {
        let hooks = self.flow().hooks();
        hooks.trigger(HookEvent::Wait, op);
        let values = self
            .fan_out(node.inputs.iter().map(|&id| Ok(id)).collect())
            .await;
        hooks.trigger(HookEvent::Start, op);
        values
    }

    /// Call a registered function on the blocking pool, behind the execution trap.
    async fn invoke(
        &self,
        node: &Node,
        callable: &Callable,
        args: Vec<Value>,
    ) -> FlowResult<Value> {
        let permit = self.flow().permits().acquire_owned().await.map_err(|e| {
            FlowError::InvalidOperation(format!("executor permits closed: {}", e))
        })?;

        let callable = callable.clone();
        let operation = node.name.clone();
        let location = node.location();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            trap(&operation, &location, || callable(args))
        })
        .await
        .map_err(|e| FlowError::InvalidOperation(format!("function task failed: {}", e)))?
    }
}

fn first(values: Vec<Value>) -> Value {
    values.into_iter().next().unwrap_or_default()
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("inputs", &self.global_inputs().len())
            .field("evaluated", &self.evaluated_count())
            .finish()
    }
}

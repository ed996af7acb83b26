// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Graph model.
//!
//! A [`Flow`] owns an arena of operations, a deduplicated constant table, a named data store
//! shared by every session, and the attached hooks. Builder methods never fail: a problem
//! detected while building (unknown function, empty variable name, input from another flow)
//! produces an operation that fails when evaluated, so partially invalid graphs can still be
//! assembled and inspected.
//!
//! # Examples
//!
//! ```rust
//! use dataflow::flow::Flow;
//! use dataflow::params;
//! use dataflow::registry::Registry;
//!
//! fn vecadd(a: Vec<f32>, b: Vec<f32>) -> Vec<f32> {
//!     a.iter().zip(&b).map(|(x, y)| x + y).collect()
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut registry = Registry::new();
//! registry.add(vecadd);
//!
//! let flow = Flow::with_registry(registry);
//! let a = flow.constant(vec![1, 2, 3]);
//! let sum = flow.op("vecadd", params![&a, vec![2, 2, 2]]);
//!
//! let result = sum.process(vec![]).await.unwrap();
//! assert_eq!(result, serde_json::json!([3.0, 4.0, 5.0]));
//! # }
//! ```

mod operation;
mod snapshot;

use std::collections::{BTreeMap, HashMap};
use std::panic::Location;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::Semaphore;

pub use operation::{OpId, OpKind, Operation, Param};
pub use snapshot::{FlowSnapshot, OperationSnapshot};

pub(crate) use operation::{Executor, Node};

use crate::config::{Config, ExecutorOptions};
use crate::engine::Session;
use crate::errors::FlowError;
use crate::hooks::{Hook, Hooks};
use crate::observability::messages::flow::{OperationBuildDeferred, VarOverwritten};
use crate::observability::messages::StructuredLog;
use crate::registry::{Registry, Value};

/// Cheap-to-clone handle to a graph. Clones share the same graph and state.
#[derive(Clone)]
pub struct Flow {
    inner: Arc<FlowInner>,
}

struct FlowInner {
    registry: RwLock<Arc<Registry>>,
    nodes: RwLock<Vec<Arc<Node>>>,
    consts: Mutex<Vec<Value>>,
    data: Mutex<HashMap<String, Value>>,
    hooks: Hooks,
    options: ExecutorOptions,
    permits: Arc<Semaphore>,
}

impl Flow {
    /// An empty flow over an empty registry.
    pub fn new() -> Self {
        Self::build(Registry::new(), ExecutorOptions::default())
    }

    pub fn with_registry(registry: Registry) -> Self {
        Self::build(registry, ExecutorOptions::default())
    }

    /// An empty flow whose sessions honor the executor options of `config`.
    pub fn with_config(config: &Config) -> Self {
        Self::build(Registry::new(), config.executor_options.clone())
    }

    fn build(registry: Registry, options: ExecutorOptions) -> Self {
        let permits = Arc::new(Semaphore::new(options.max_concurrency()));
        Self {
            inner: Arc::new(FlowInner {
                registry: RwLock::new(Arc::new(registry)),
                nodes: RwLock::new(Vec::new()),
                consts: Mutex::new(Vec::new()),
                data: Mutex::new(HashMap::new()),
                hooks: Hooks::default(),
                options,
                permits,
            }),
        }
    }

    /// Replace the registry used by subsequent [`Flow::op`] calls. Existing operations keep
    /// the callables they resolved.
    pub fn use_registry(&self, registry: impl Into<Arc<Registry>>) -> &Self {
        *self
            .inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner) = registry.into();
        self
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.inner.options
    }

    /// A call to the registered function `name` with `params` as positional inputs.
    ///
    /// The callable is resolved once, here; a factory entry is constructed with no
    /// parameters, and the built callable is shared by every evaluation of this operation.
    #[track_caller]
    pub fn op<I, P>(&self, name: &str, params: I) -> Operation
    where
        I: IntoIterator<Item = P>,
        P: Into<Param>,
    {
        let location = Location::caller();
        let built = self
            .make_inputs(params, location)
            .and_then(|inputs| Ok((inputs, self.registry().get(name, vec![])?)));
        match built {
            Ok((inputs, callable)) => {
                self.push(OpKind::Func, name, inputs, Executor::Func(callable), location)
            }
            Err(error) => self.deferred(OpKind::Func, name, error, location),
        }
    }

    /// A named variable. The first evaluation in any session stores the value of `initial`;
    /// later evaluations return the stored value without evaluating `initial` again.
    #[track_caller]
    pub fn var(&self, name: &str, initial: impl Into<Param>) -> Operation {
        self.variable(OpKind::Var, name, initial.into(), Location::caller())
    }

    /// Evaluates `data` and overwrites the variable `name` with it.
    #[track_caller]
    pub fn set_var(&self, name: &str, data: impl Into<Param>) -> Operation {
        self.variable(OpKind::SetVar, name, data.into(), Location::caller())
    }

    /// A constant. Values deep-equal to an existing constant share its slot.
    #[track_caller]
    pub fn constant(&self, value: impl Into<Value>) -> Operation {
        self.const_at(value.into(), Location::caller())
    }

    /// The `index`-th global input of the evaluating session.
    #[track_caller]
    pub fn input(&self, index: usize) -> Operation {
        self.push(
            OpKind::Input,
            "",
            vec![],
            Executor::Input(index),
            Location::caller(),
        )
    }

    /// An operation that always fails with `error`.
    #[track_caller]
    pub fn err_op(&self, error: FlowError) -> Operation {
        self.push(
            OpKind::Error,
            "",
            vec![],
            Executor::Fail(error),
            Location::caller(),
        )
    }

    /// Attach an observer for every operation of every session of this flow.
    pub fn hook(&self, hook: Hook) -> &Self {
        self.inner.hooks.attach(hook);
        self
    }

    pub fn new_session(&self) -> Session {
        Session::new(self.clone())
    }

    /// Every operation in construction order.
    pub fn operations(&self) -> Vec<Operation> {
        (0..self.node_count())
            .map(|id| Operation {
                flow: self.clone(),
                id,
            })
            .collect()
    }

    pub fn consts(&self) -> Vec<Value> {
        self.inner
            .consts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current value of a variable, if it has been stored.
    pub fn var_value(&self, name: &str) -> Option<Value> {
        self.lock_data().get(name).cloned()
    }

    /// Overwrite a variable outside of any session.
    pub fn set_data(&self, name: &str, value: Value) {
        self.store_var(name, value);
    }

    /// Copy of the shared data store.
    pub fn data(&self) -> BTreeMap<String, Value> {
        self.lock_data()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn same_flow(&self, other: &Flow) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn hooks(&self) -> &Hooks {
        &self.inner.hooks
    }

    pub(crate) fn permits(&self) -> Arc<Semaphore> {
        self.inner.permits.clone()
    }

    pub(crate) fn node(&self, id: OpId) -> Arc<Node> {
        self.inner
            .nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)[id]
            .clone()
    }

    pub(crate) fn node_count(&self) -> usize {
        self.inner
            .nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub(crate) fn const_value(&self, slot: usize) -> Option<Value> {
        self.inner
            .consts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(slot)
            .cloned()
    }

    /// Store `initial` under `name` unless a value is already present; returns the stored
    /// value and whether this call stored it.
    pub(crate) fn materialize_var(&self, name: &str, initial: Value) -> (Value, bool) {
        let mut data = self.lock_data();
        match data.get(name) {
            Some(existing) => (existing.clone(), false),
            None => {
                data.insert(name.to_string(), initial.clone());
                (initial, true)
            }
        }
    }

    pub(crate) fn store_var(&self, name: &str, value: Value) {
        self.lock_data().insert(name.to_string(), value);
        VarOverwritten { name }.log();
    }

    fn lock_data(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        self.inner
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn variable(
        &self,
        kind: OpKind,
        name: &str,
        param: Param,
        location: &'static Location<'static>,
    ) -> Operation {
        if name.is_empty() {
            return self.deferred(
                kind,
                name,
                FlowError::InvalidInput("variable name is empty".into()),
                location,
            );
        }
        let executor = match kind {
            OpKind::Var => Executor::Var(name.to_string()),
            _ => Executor::SetVar(name.to_string()),
        };
        match self.make_inputs([param], location) {
            Ok(inputs) => self.push(kind, name, inputs, executor, location),
            Err(error) => self.deferred(kind, name, error, location),
        }
    }

    fn const_at(&self, value: Value, location: &'static Location<'static>) -> Operation {
        let slot = {
            let mut consts = self
                .inner
                .consts
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match consts.iter().position(|existing| *existing == value) {
                Some(slot) => slot,
                None => {
                    consts.push(value);
                    consts.len() - 1
                }
            }
        };
        self.push(OpKind::Const, "", vec![], Executor::Const(slot), location)
    }

    fn make_inputs<I, P>(
        &self,
        params: I,
        location: &'static Location<'static>,
    ) -> Result<Vec<OpId>, FlowError>
    where
        I: IntoIterator<Item = P>,
        P: Into<Param>,
    {
        params
            .into_iter()
            .enumerate()
            .map(|(position, param)| match param.into() {
                Param::Op(op) if op.flow.same_flow(self) => Ok(op.id),
                Param::Op(_) => Err(FlowError::InvalidOperation(format!(
                    "input {} belongs to a different flow",
                    position
                ))),
                Param::Value(value) => Ok(self.const_at(value, location).id),
            })
            .collect()
    }

    /// Push a permanently failing node that keeps the requested kind and name.
    fn deferred(
        &self,
        kind: OpKind,
        name: &str,
        error: FlowError,
        location: &'static Location<'static>,
    ) -> Operation {
        let site = format!("{}:{}", location.file(), location.line());
        OperationBuildDeferred {
            name,
            location: &site,
            error: &error,
        }
        .log();
        self.push(kind, name, vec![], Executor::Fail(error), location)
    }

    fn push(
        &self,
        kind: OpKind,
        name: &str,
        inputs: Vec<OpId>,
        executor: Executor,
        location: &'static Location<'static>,
    ) -> Operation {
        let mut nodes = self
            .inner
            .nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        nodes.push(Arc::new(Node {
            kind,
            name: name.to_string(),
            inputs,
            executor,
            location,
        }));
        Operation {
            flow: self.clone(),
            id: nodes.len() - 1,
        }
    }
}

impl Default for Flow {
    fn default() -> Self {
        Self::new()
    }
}

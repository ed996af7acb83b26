// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use serde::Serialize;

use super::Flow;
use crate::errors::{FlowError, FlowResult};
use crate::registry::{Callable, Value};

/// Stable index of an operation inside its flow's arena.
pub type OpId = usize;

/// Kind discriminant of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Func,
    Var,
    SetVar,
    Const,
    #[serde(rename = "in")]
    Input,
    Error,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            OpKind::Func => "func",
            OpKind::Var => "var",
            OpKind::SetVar => "setvar",
            OpKind::Const => "const",
            OpKind::Input => "in",
            OpKind::Error => "error",
        };
        f.write_str(kind)
    }
}

/// Kind-specific payload the evaluator dispatches on.
#[derive(Clone)]
pub(crate) enum Executor {
    Func(Callable),
    Var(String),
    SetVar(String),
    Const(usize),
    Input(usize),
    Fail(FlowError),
}

/// One arena slot. Immutable once pushed.
pub(crate) struct Node {
    pub(crate) kind: OpKind,
    pub(crate) name: String,
    pub(crate) inputs: Vec<OpId>,
    pub(crate) executor: Executor,
    pub(crate) location: &'static Location<'static>,
}

impl Node {
    pub(crate) fn location(&self) -> String {
        format!("{}:{}", self.location.file(), self.location.line())
    }
}

/// Handle to a graph node: its flow plus its arena index.
///
/// Cloning is cheap. Two handles are equal when they name the same node of the same flow.
#[derive(Clone)]
pub struct Operation {
    pub(crate) flow: Flow,
    pub(crate) id: OpId,
}

impl Operation {
    pub fn id(&self) -> OpId {
        self.id
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    pub fn kind(&self) -> OpKind {
        self.node().kind
    }

    /// Registry name for func operations, variable name for var/setvar, empty otherwise.
    pub fn name(&self) -> String {
        self.node().name.clone()
    }

    pub fn inputs(&self) -> Vec<Operation> {
        self.node()
            .inputs
            .iter()
            .map(|&id| Operation {
                flow: self.flow.clone(),
                id,
            })
            .collect()
    }

    /// Construction site as `file:line`.
    pub fn location(&self) -> String {
        self.node().location()
    }

    /// Evaluate this operation in a fresh session with `inputs` as the global inputs.
    pub async fn process(&self, inputs: Vec<Value>) -> FlowResult<Value> {
        let session = self.flow.new_session();
        session.inputs(inputs);
        session.run_one(self).await
    }

    pub(crate) fn node(&self) -> Arc<Node> {
        self.flow.node(self.id)
    }
}

impl PartialEq for Operation {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.flow.same_flow(&other.flow)
    }
}

impl Eq for Operation {}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = self.node();
        let file = node
            .location
            .file()
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default();
        write!(
            f,
            "[{}:{}]:{{{},{}}}",
            file,
            node.location.line(),
            node.kind,
            node.name
        )
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = self.node();
        f.debug_struct("Operation")
            .field("id", &self.id)
            .field("kind", &node.kind)
            .field("name", &node.name)
            .field("inputs", &node.inputs)
            .field("location", &node.location())
            .finish()
    }
}

/// A builder parameter: an existing operation, or a literal that becomes a constant.
#[derive(Debug, Clone)]
pub enum Param {
    Op(Operation),
    Value(Value),
}

impl From<Operation> for Param {
    fn from(op: Operation) -> Self {
        Param::Op(op)
    }
}

impl From<&Operation> for Param {
    fn from(op: &Operation) -> Self {
        Param::Op(op.clone())
    }
}

impl From<Value> for Param {
    fn from(value: Value) -> Self {
        Param::Value(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Param {
    fn from(values: Vec<T>) -> Self {
        Param::Value(Value::from(values))
    }
}

macro_rules! impl_param_from_literal {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Param {
                fn from(value: $ty) -> Self {
                    Param::Value(Value::from(value))
                }
            }
        )*
    };
}

impl_param_from_literal!(
    bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, String, &str,
);

/// Build a `Vec<Param>` from mixed operations and literals.
///
/// ```rust
/// use dataflow::{flow::Flow, params, registry::Registry};
///
/// fn vecadd(a: Vec<f32>, b: Vec<f32>) -> Vec<f32> {
///     a.iter().zip(&b).map(|(x, y)| x + y).collect()
/// }
///
/// let mut registry = Registry::new();
/// registry.add(vecadd);
///
/// let flow = Flow::with_registry(registry);
/// let c = flow.constant(vec![1, 2, 3]);
/// let op = flow.op("vecadd", params![&c, vec![2, 2, 2]]);
/// assert_eq!(op.inputs().len(), 2);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::flow::Param>::new()
    };
    ($($param:expr),+ $(,)?) => {
        vec![$($crate::flow::Param::from($param)),+]
    };
}

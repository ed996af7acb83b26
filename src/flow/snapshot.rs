// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Introspection: a serializable snapshot, the textual dump, and the evaluation analysis.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};

use serde::Serialize;

use super::{Executor, Flow, OpId, OpKind};
use crate::registry::Value;

/// Serializable view of a flow's constants, stored data and operations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowSnapshot {
    pub consts: Vec<Value>,
    pub data: BTreeMap<String, Value>,
    pub operations: Vec<OperationSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationSnapshot {
    pub id: OpId,
    pub kind: OpKind,
    pub name: String,
    pub inputs: Vec<OpId>,
    pub location: String,
}

impl Flow {
    pub fn snapshot(&self) -> FlowSnapshot {
        let operations = (0..self.node_count())
            .map(|id| {
                let node = self.node(id);
                OperationSnapshot {
                    id,
                    kind: node.kind,
                    name: node.name.clone(),
                    inputs: node.inputs.clone(),
                    location: node.location(),
                }
            })
            .collect();

        FlowSnapshot {
            consts: self.consts(),
            data: self.data(),
            operations,
        }
    }

    /// Evaluate every operation, and each of its inputs, in fresh sessions over `inputs`,
    /// writing one line per operation.
    pub async fn analyse<W: Write>(&self, w: &mut W, inputs: Vec<Value>) -> io::Result<()> {
        writeln!(w, "Ops analysis:")?;

        for op in self.operations() {
            let mut line = format!("  [{}] {}(", op.id(), op.name());
            for (position, input) in op.inputs().iter().enumerate() {
                if position != 0 {
                    line.push_str(", ");
                }
                match input.process(inputs.clone()).await {
                    Ok(value) => line.push_str(&format!("{}({})", input.kind(), value)),
                    Err(e) => line.push_str(&format!("{}(ERR: {})", input.kind(), e)),
                }
            }
            line.push_str(") - ");
            match op.process(inputs.clone()).await {
                Ok(value) => line.push_str(&value.to_string()),
                Err(e) => line.push_str(&format!("ERR {}", e)),
            }
            writeln!(w, "{}", line)?;
        }
        Ok(())
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Flow")?;

        writeln!(f, "consts:")?;
        for (slot, value) in self.consts().iter().enumerate() {
            writeln!(f, "  [{}] {}", slot, value)?;
        }

        writeln!(f, "data:")?;
        for (name, value) in self.data() {
            writeln!(f, "  [{}] {}", name, value)?;
        }

        writeln!(f, "operations:")?;
        for id in 0..self.node_count() {
            let node = self.node(id);
            write!(f, "  [{}] {} {}(", id, node.kind, node.name)?;
            for (position, &input) in node.inputs.iter().enumerate() {
                if position != 0 {
                    write!(f, ", ")?;
                }
                let input_node = self.node(input);
                match input_node.executor {
                    Executor::Const(slot) => write!(
                        f,
                        "const[{}]({})",
                        input,
                        self.const_value(slot).unwrap_or(Value::Null)
                    )?,
                    _ => write!(f, "{}[{}]", input_node.kind, input)?,
                }
            }
            writeln!(f, ")")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow")
            .field("operations", &self.node_count())
            .field("consts", &self.consts().len())
            .field("hooks", &self.hooks().len())
            .finish()
    }
}

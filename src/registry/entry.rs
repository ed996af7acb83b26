// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::callable::{trap, Callable, FactoryFn, Value};
use crate::errors::FlowResult;

/// How an entry produces the callable an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// The registered function is the callable.
    Simple,
    /// The registered function is a constructor; calling it yields the callable.
    Factory,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Simple => write!(f, "simple"),
            EntryKind::Factory => write!(f, "factory"),
        }
    }
}

/// Display descriptor of a single input or output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescType {
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
}

impl DescType {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: String::new(),
        }
    }
}

/// Read-only metadata of an entry, exported by [`super::Registry::descriptions`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Description {
    pub name: String,
    #[serde(rename = "description")]
    pub desc: String,
    #[serde(rename = "categories")]
    pub tags: Vec<String>,
    pub inputs: Vec<DescType>,
    pub output: DescType,
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone)]
pub(crate) enum Invoker {
    Simple(Callable),
    Factory(FactoryFn),
}

/// A registered callable plus its reflected signature and display metadata.
///
/// Entries are shared by reference between cloned registries; describing an entry after it
/// has been shared replaces it copy-on-write, so the other registry keeps the old metadata.
#[derive(Clone)]
pub struct Entry {
    name: String,
    invoker: Invoker,
    pub(crate) description: Description,
}

impl Entry {
    pub(crate) fn new(
        name: String,
        invoker: Invoker,
        input_types: Vec<String>,
        output_type: String,
    ) -> Self {
        let description = Description {
            name: name.clone(),
            desc: String::new(),
            tags: vec!["generic".to_string()],
            inputs: input_types.into_iter().map(DescType::new).collect(),
            output: DescType::new(output_type),
            extra: BTreeMap::new(),
        };
        Self {
            name,
            invoker,
            description,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EntryKind {
        match self.invoker {
            Invoker::Simple(_) => EntryKind::Simple,
            Invoker::Factory(_) => EntryKind::Factory,
        }
    }

    pub fn description(&self) -> &Description {
        &self.description
    }

    /// Resolve the callable. Factories are invoked with `params` on every call.
    pub fn callable(&self, params: Vec<Value>) -> FlowResult<Callable> {
        match &self.invoker {
            Invoker::Simple(callable) => Ok(callable.clone()),
            Invoker::Factory(factory) => trap(&self.name, "factory", || factory(params)),
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("description", &self.description)
            .finish()
    }
}

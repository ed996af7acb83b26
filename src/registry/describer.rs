// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use super::callable::Value;
use super::entry::{DescType, Entry};
use super::Registry;

/// Batch editor for the descriptions of a group of entries.
///
/// Returned by every registration method so metadata can be attached inline:
///
/// ```rust
/// use dataflow::registry::Registry;
///
/// fn vecadd(a: Vec<f32>, b: Vec<f32>) -> Vec<f32> {
///     a.iter().zip(&b).map(|(x, y)| x + y).collect()
/// }
///
/// let mut registry = Registry::new();
/// registry
///     .add_named("vecadd", vecadd)
///     .description("elementwise addition")
///     .tags(["math", "vector"])
///     .inputs(["a", "b"])
///     .output("sum");
///
/// let desc = registry.descriptions();
/// assert_eq!(desc["vecadd"].inputs[1].name, "b");
/// ```
pub struct Describer<'a> {
    registry: &'a mut Registry,
    names: Vec<String>,
}

impl<'a> Describer<'a> {
    pub(crate) fn new(registry: &'a mut Registry, names: Vec<String>) -> Self {
        Self { registry, names }
    }

    /// Names of the entries in this batch, in registration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn entries(&self) -> Vec<Arc<Entry>> {
        self.names
            .iter()
            .filter_map(|name| self.registry.entries.get(name).cloned())
            .collect()
    }

    pub fn description(self, text: &str) -> Self {
        self.update(|entry| entry.description.desc = text.to_string())
    }

    pub fn tags<I, S>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: Vec<String> = tags.into_iter().map(Into::into).collect();
        self.update(|entry| entry.description.tags = tags.clone())
    }

    /// Name the inputs positionally. Names beyond an entry's arity are ignored.
    pub fn inputs<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        self.update(|entry| {
            for (input, name) in entry.description.inputs.iter_mut().zip(&names) {
                *input = DescType {
                    type_name: input.type_name.clone(),
                    name: name.clone(),
                };
            }
        })
    }

    pub fn output(self, name: &str) -> Self {
        self.update(|entry| entry.description.output.name = name.to_string())
    }

    pub fn extra(self, key: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.update(|entry| {
            entry
                .description
                .extra
                .insert(key.to_string(), value.clone());
        })
    }

    fn update(self, mut apply: impl FnMut(&mut Entry)) -> Self {
        for name in &self.names {
            if let Some(entry) = self.registry.entries.get_mut(name) {
                apply(Arc::make_mut(entry));
            }
        }
        self
    }
}

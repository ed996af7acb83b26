// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Registry of named, type-erased functions.
//!
//! A [`Registry`] maps names to [`Entry`] values. Entries are immutable once registered and
//! shared by reference, so [`Registry::clone`] is a cheap shallow copy that can be mutated
//! privately (e.g. a per-session overlay) without affecting the source.
//!
//! # Examples
//!
//! ```rust
//! use dataflow::registry::Registry;
//!
//! fn vecmul(a: Vec<f32>, b: Vec<f32>) -> Vec<f32> {
//!     a.iter().zip(&b).map(|(x, y)| x * y).collect()
//! }
//!
//! let mut registry = Registry::new();
//! registry.add(vecmul);
//! registry.add_named("double", |x: i64| x * 2);
//!
//! assert!(registry.entry("vecmul").is_ok());
//! assert_eq!(registry.len(), 2);
//! ```

mod callable;
mod describer;
mod entry;

use std::any::type_name;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

pub use callable::{
    Callable, FactoryFn, FromValue, IntoCallable, IntoFactory, IntoOutput, Json, OutputError,
    Value,
};
pub use describer::Describer;
pub use entry::{DescType, Description, Entry, EntryKind};

pub(crate) use callable::{panic_message, trap};

use crate::errors::{FlowError, FlowResult};
use crate::observability::messages::registry::{EntryRegistered, RegistryMerged};
use crate::observability::messages::StructuredLog;
use entry::Invoker;

/// One argument of [`Registry::add_all`]: either a name or a function.
///
/// A name applies to the function right after it; an unnamed function is auto-named like
/// [`Registry::add`].
pub struct AddArg(ArgKind);

enum ArgKind {
    Name(String),
    Func {
        type_path: String,
        build: Box<dyn FnOnce(String) -> Entry>,
    },
}

impl AddArg {
    pub fn name(name: impl Into<String>) -> Self {
        AddArg(ArgKind::Name(name.into()))
    }

    pub fn func<Args: 'static, F: IntoCallable<Args>>(f: F) -> Self {
        AddArg(ArgKind::Func {
            type_path: type_path::<F>(),
            build: Box::new(move |name| simple_entry(name, f)),
        })
    }
}

impl From<&str> for AddArg {
    fn from(name: &str) -> Self {
        AddArg::name(name)
    }
}

impl From<String> for AddArg {
    fn from(name: String) -> Self {
        AddArg::name(name)
    }
}

#[derive(Clone, Default)]
pub struct Registry {
    pub(crate) entries: HashMap<String, Arc<Entry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `f` under a name derived from its type path (`module::vecadd` → `vecadd`).
    ///
    /// Closures share one type path per enclosing function, so they are numbered:
    /// `enclosing::{{closure}}#1`, `enclosing::{{closure}}#2`, ...
    pub fn add<Args, F: IntoCallable<Args>>(&mut self, f: F) -> Describer<'_> {
        let name = self.auto_name(&type_path::<F>());
        self.add_named(name, f)
    }

    /// Register `f` under `name`, replacing any previous entry with that name.
    pub fn add_named<Args, F: IntoCallable<Args>>(
        &mut self,
        name: impl Into<String>,
        f: F,
    ) -> Describer<'_> {
        let name = name.into();
        let entry = simple_entry(name.clone(), f);
        self.insert(entry);
        Describer::new(self, vec![name])
    }

    /// Register a constructor. Each [`Registry::get`] calls it with the supplied parameters to
    /// build the callable.
    pub fn add_factory<Args, F: IntoFactory<Args>>(
        &mut self,
        name: impl Into<String>,
        f: F,
    ) -> Describer<'_> {
        let name = name.into();
        let entry = Entry::new(
            name.clone(),
            Invoker::Factory(f.into_factory(name.clone())),
            F::input_types(),
            F::output_type(),
        );
        self.insert(entry);
        Describer::new(self, vec![name])
    }

    /// Register an untyped function that receives every input as a raw [`Value`].
    pub fn add_dynamic<F>(&mut self, name: impl Into<String>, f: F) -> Describer<'_>
    where
        F: Fn(Vec<Value>) -> FlowResult<Value> + Send + Sync + 'static,
    {
        let name = name.into();
        let entry = Entry::new(
            name.clone(),
            Invoker::Simple(Arc::new(f)),
            vec!["...Value".to_string()],
            type_name::<Value>().to_string(),
        );
        self.insert(entry);
        Describer::new(self, vec![name])
    }

    /// Register a sequence of optionally named functions.
    ///
    /// A name argument applies to the function that follows it. Fails with
    /// [`FlowError::NotAFunction`] on two consecutive names or a trailing name; entries
    /// before the offending argument stay registered.
    pub fn add_all(
        &mut self,
        args: impl IntoIterator<Item = AddArg>,
    ) -> FlowResult<Describer<'_>> {
        let mut names = Vec::new();
        let mut pending: Option<String> = None;

        for AddArg(arg) in args {
            match arg {
                ArgKind::Name(name) => {
                    if let Some(previous) = pending {
                        return Err(FlowError::NotAFunction(format!(
                            "name '{}' is followed by name '{}'",
                            previous, name
                        )));
                    }
                    pending = Some(name);
                }
                ArgKind::Func { type_path, build } => {
                    let name = match pending.take() {
                        Some(name) => name,
                        None => self.auto_name(&type_path),
                    };
                    self.insert(build(name.clone()));
                    names.push(name);
                }
            }
        }

        if let Some(name) = pending {
            return Err(FlowError::NotAFunction(format!(
                "name '{}' is not followed by a function",
                name
            )));
        }

        Ok(Describer::new(self, names))
    }

    /// Batch describer over already registered entries. Unknown names are skipped.
    pub fn describe<I, S>(&mut self, names: I) -> Describer<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = names
            .into_iter()
            .map(Into::into)
            .filter(|name: &String| self.entries.contains_key(name))
            .collect();
        Describer::new(self, names)
    }

    pub fn entry(&self, name: &str) -> FlowResult<Arc<Entry>> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| FlowError::EntryNotFound(name.to_string()))
    }

    /// Resolve the callable registered under `name`; factory entries are invoked with
    /// `params` to construct it.
    pub fn get(&self, name: &str, params: Vec<Value>) -> FlowResult<Callable> {
        self.entry(name)?.callable(params)
    }

    /// Copy every entry of `other` into this registry, replacing same-named entries.
    pub fn merge(&mut self, other: &Registry) {
        for (name, entry) in &other.entries {
            self.entries.insert(name.clone(), entry.clone());
        }
        RegistryMerged {
            merged_count: other.entries.len(),
            total_count: self.entries.len(),
        }
        .log();
    }

    pub fn descriptions(&self) -> BTreeMap<String, Description> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.description().clone()))
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn auto_name(&self, type_path: &str) -> String {
        let mut segments = type_path.rsplit("::");
        let last = segments.next().unwrap_or(type_path);
        if last != CLOSURE_SEGMENT {
            return last.to_string();
        }
        let enclosing = segments.next().unwrap_or_default();
        (1..)
            .map(|n| format!("{}::{}#{}", enclosing, CLOSURE_SEGMENT, n))
            .find(|name| !self.entries.contains_key(name))
            .unwrap_or_default()
    }

    fn insert(&mut self, entry: Entry) {
        let kind = entry.kind().to_string();
        let name = entry.name().to_string();
        let replaced = self.entries.insert(name.clone(), Arc::new(entry)).is_some();
        EntryRegistered {
            name: &name,
            kind: &kind,
            replaced,
        }
        .log();
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("Registry")
            .field("entry_count", &self.entries.len())
            .field("entries", &names)
            .finish()
    }
}

/// Opt-in process-wide registry.
///
/// Nothing in the engine reads it implicitly; pass a snapshot to a flow explicitly:
///
/// ```rust
/// use dataflow::flow::Flow;
/// use dataflow::registry;
///
/// if let Ok(mut global) = registry::global().write() {
///     global.add_named("one", || 1);
/// }
/// let snapshot = registry::global().read().map(|r| r.clone()).unwrap_or_default();
/// let flow = Flow::with_registry(snapshot);
/// # let _ = flow;
/// ```
pub fn global() -> &'static RwLock<Registry> {
    static GLOBAL: OnceLock<RwLock<Registry>> = OnceLock::new();
    GLOBAL.get_or_init(|| RwLock::new(Registry::new()))
}

fn simple_entry<Args, F: IntoCallable<Args>>(name: String, f: F) -> Entry {
    let input_types = F::input_types();
    let output_type = F::output_type();
    Entry::new(
        name.clone(),
        Invoker::Simple(f.into_callable(name)),
        input_types,
        output_type,
    )
}

const CLOSURE_SEGMENT: &str = "{{closure}}";

/// `type_name::<F>()` with generic arguments removed (`m::ident<alloc::vec::Vec<i64>>` →
/// `m::ident`).
fn type_path<F>() -> String {
    strip_generics(type_name::<F>())
}

fn strip_generics(path: &str) -> String {
    let mut depth = 0usize;
    path.chars()
        .filter(|&c| match c {
            '<' => {
                depth += 1;
                false
            }
            '>' => {
                depth = depth.saturating_sub(1);
                false
            }
            _ => depth == 0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn dummy1(_a: Vec<f32>, _b: Vec<f32>) -> Vec<f32> {
        vec![1.0, 3.0, 3.0, 7.0]
    }

    fn dummy2(_a: Vec<f32>) -> String {
        String::new()
    }

    #[test]
    fn test_registry_entry_description() {
        let mut r = Registry::new();
        r.add_named("vecadd", dummy1);

        let e = r.entry("vecadd").expect("fetching entry");
        let d = e.description();

        assert_eq!(d.inputs.len(), 2);
        assert_eq!(d.output.type_name, "alloc::vec::Vec<f32>");
        assert_eq!(d.tags, vec!["generic".to_string()]);
        assert_eq!(e.kind(), EntryKind::Simple);
    }

    #[test]
    fn test_entry_not_found() {
        let r = Registry::new();
        let err = r.entry("bogus").unwrap_err();
        assert_eq!(err, FlowError::EntryNotFound("bogus".into()));

        let err = r.get("notfoundfunc", vec![]).err().unwrap();
        assert_eq!(err.kind(), crate::errors::ErrorKind::EntryNotFound);
    }

    #[test]
    fn test_auto_naming() {
        let mut r = Registry::new();
        let describer = r.add(dummy1);
        assert_eq!(describer.names(), &["dummy1".to_string()]);
        assert!(r.contains("dummy1"));
    }

    fn identity<T>(value: T) -> T {
        value
    }

    #[test]
    fn test_closures_get_distinct_names() {
        let mut r = Registry::new();
        r.add(|a: i64| a);
        r.add(|a: String| a);

        let mut names: Vec<_> = r.names().cloned().collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "test_closures_get_distinct_names::{{closure}}#1",
                "test_closures_get_distinct_names::{{closure}}#2",
            ]
        );
    }

    #[test]
    fn test_generic_arguments_are_stripped() {
        let mut r = Registry::new();
        let describer = r.add(identity::<Vec<i64>>);
        assert_eq!(describer.names(), &["identity".to_string()]);

        assert_eq!(strip_generics("a::foo<b::Bar<c::D>>"), "a::foo");
        assert_eq!(strip_generics("a::f<T>::{{closure}}"), "a::f::{{closure}}");
    }

    #[test]
    fn test_register_duplicate_overwrites() {
        let mut r = Registry::new();
        r.add_named("func", |a: i64, b: i64| a + b);
        r.add_named("func", |b: i64| b);

        let e = r.entry("func").unwrap();
        assert_eq!(e.description().inputs.len(), 1);
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn test_register_without_params_or_output() {
        let mut r = Registry::new();
        r.add_named("noparams", || 0);
        r.add_named("nooutput", |_a: i64| {});

        let f = r.get("noparams", vec![]).unwrap();
        assert_eq!(f(vec![]).unwrap(), json!(0));
        let f = r.get("nooutput", vec![]).unwrap();
        assert_eq!(f(vec![json!(1)]).unwrap(), Value::Null);
    }

    #[test]
    fn test_get_constructor() {
        let mut r = Registry::new();
        r.add_factory("func", || || 0);
        assert_eq!(r.entry("func").unwrap().kind(), EntryKind::Factory);

        let f = r.get("func", vec![]).unwrap();
        assert_eq!(f(vec![]).unwrap(), json!(0));
    }

    #[test]
    fn test_get_constructor_params() {
        let mut r = Registry::new();
        r.add_factory("func2", |a: i64, b: i64| move || a + b);

        let f = r.get("func2", vec![json!(1), json!(1)]).unwrap();
        assert_eq!(f(vec![]).unwrap(), json!(2));
    }

    #[test]
    fn test_factory_rebuilt_per_get() {
        let mut r = Registry::new();
        r.add_factory("counter", || {
            let count = AtomicI64::new(0);
            move || count.fetch_add(1, Ordering::SeqCst) + 1
        });

        let first = r.get("counter", vec![]).unwrap();
        assert_eq!(first(vec![]).unwrap(), json!(1));
        assert_eq!(first(vec![]).unwrap(), json!(2));

        let second = r.get("counter", vec![]).unwrap();
        assert_eq!(second(vec![]).unwrap(), json!(1));
    }

    #[test]
    fn test_factory_panic_is_trapped() {
        let mut r = Registry::new();
        r.add_factory("broken", || -> fn() -> i64 { panic!("cannot build") });

        let err = r.get("broken", vec![]).err().unwrap();
        assert!(matches!(err, FlowError::Panicked { .. }));
        assert!(err.to_string().contains("cannot build"));
    }

    #[test]
    fn test_descriptions() {
        let mut r = Registry::new();
        r.add_named("vecadd", dummy1);
        r.add_named("vecstr", dummy2);

        let d = r.descriptions();
        assert_eq!(d.len(), 2);
        assert_eq!(d["vecstr"].output.type_name, "alloc::string::String");
    }

    #[test]
    fn test_clone_is_independent() {
        let mut r = Registry::new();
        r.add_named("vecadd", dummy1);

        let mut r2 = r.clone();
        r2.add_named("vecmul", dummy2);

        assert_eq!(r.descriptions().len(), 1);
        let d2 = r2.descriptions();
        assert_eq!(d2.len(), 2);
        assert!(d2.contains_key("vecmul"));
    }

    #[test]
    fn test_clone_shares_entries_copy_on_write() {
        let mut r = Registry::new();
        r.add_named("vecadd", dummy1);

        let mut r2 = r.clone();
        assert!(Arc::ptr_eq(
            &r.entry("vecadd").unwrap(),
            &r2.entry("vecadd").unwrap()
        ));

        r2.describe(["vecadd"]).description("changed");
        assert_eq!(r.entry("vecadd").unwrap().description().desc, "");
        assert_eq!(r2.entry("vecadd").unwrap().description().desc, "changed");
    }

    #[test]
    fn test_merge_overwrites() {
        let mut r1 = Registry::new();
        r1.add_named("join", |a: Vec<String>, sep: String| a.join(&sep));
        r1.add_named("shared", || 1);

        let mut r2 = Registry::new();
        r2.add_named("split", |s: String, sep: String| {
            s.split(sep.as_str()).map(String::from).collect::<Vec<_>>()
        });
        r2.add_named("shared", || 2);

        r2.merge(&r1);

        assert_eq!(r2.descriptions().len(), 3);
        let shared = r2.get("shared", vec![]).unwrap();
        assert_eq!(shared(vec![]).unwrap(), json!(1));
    }

    #[test]
    fn test_add_all_names_and_errors() {
        struct TestCase {
            name: &'static str,
            args: Vec<AddArg>,
            expected_names: Option<Vec<&'static str>>,
            registered: usize,
        }

        let test_cases = vec![
            TestCase {
                name: "named and derived",
                args: vec!["named".into(), AddArg::func(dummy2), AddArg::func(dummy1)],
                expected_names: Some(vec!["named", "dummy1"]),
                registered: 2,
            },
            TestCase {
                name: "consecutive names",
                args: vec!["a".into(), "b".into(), AddArg::func(dummy2)],
                expected_names: None,
                registered: 0,
            },
            TestCase {
                name: "dangling name",
                args: vec![AddArg::func(dummy1), "test".into()],
                expected_names: None,
                registered: 1,
            },
        ];

        for test_case in test_cases {
            let mut r = Registry::new();
            let result = r.add_all(test_case.args).map(|d| d.names().to_vec());
            match test_case.expected_names {
                Some(expected) => {
                    let names = result.unwrap_or_else(|e| {
                        panic!("Test case '{}': unexpected error {}", test_case.name, e)
                    });
                    assert_eq!(names, expected, "Test case '{}'", test_case.name);
                }
                None => {
                    let err = result.err().unwrap_or_else(|| {
                        panic!("Test case '{}': expected an error", test_case.name)
                    });
                    assert_eq!(
                        err.kind(),
                        crate::errors::ErrorKind::NotAFunction,
                        "Test case '{}'",
                        test_case.name
                    );
                }
            }
            assert_eq!(r.len(), test_case.registered, "Test case '{}'", test_case.name);
        }
    }

    #[test]
    fn test_describer_batch() {
        let mut r = Registry::new();
        r.add_named("a", || 0);
        r.add_named("b", || 0);
        r.add_named("c", |_x: i64, _y: i64| 0);

        let d = r
            .describe(["a", "b", "c", "missing"])
            .tags(["test"])
            .extra("name", 1)
            .inputs(["first", "second", "third"])
            .output("result")
            .description("batch");

        assert_eq!(d.entries().len(), 3);
        for e in d.entries() {
            assert_eq!(e.description().tags, vec!["test".to_string()]);
            assert_eq!(e.description().extra["name"], json!(1));
            assert_eq!(e.description().output.name, "result");
            assert_eq!(e.description().desc, "batch");
        }

        let c = r.entry("c").unwrap();
        assert_eq!(c.description().inputs.len(), 2);
        assert_eq!(c.description().inputs[0].name, "first");
        assert_eq!(c.description().inputs[1].name, "second");
    }

    #[test]
    fn test_descriptions_serialize() {
        let mut r = Registry::new();
        r.add_named("vecadd", dummy1).tags(["math"]).inputs(["a", "b"]);

        let value = serde_json::to_value(r.descriptions()).unwrap();
        assert_eq!(value["vecadd"]["categories"], json!(["math"]));
        assert_eq!(value["vecadd"]["inputs"][0]["name"], json!("a"));
        assert_eq!(value["vecadd"]["inputs"][0]["type"], json!("alloc::vec::Vec<f32>"));
    }
}

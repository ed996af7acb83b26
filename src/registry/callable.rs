// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Type-erased invocation of registered functions.
//!
//! A typed Rust function is turned into a [`Callable`] exactly once, at registration. The
//! generated closure owns all argument marshaling, so dispatching an operation is a single
//! indirect call over a `Vec<Value>`:
//!
//! ```text
//! fn vecadd(a: Vec<f32>, b: Vec<f32>) -> Vec<f32>
//!        │ IntoCallable<(Vec<f32>, Vec<f32>)>
//!        ▼
//! Arc<dyn Fn(Vec<Value>) -> FlowResult<Value>>
//! ```
//!
//! Arguments are unmarshaled with serde. JSON `null` becomes the parameter type's
//! `Default` value. Outputs go through [`IntoOutput`]; a `Result` return is the declared
//! error channel and an `Err` becomes [`FlowError::Function`].

use std::any::{type_name, Any};
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::{FlowError, FlowResult};
use crate::observability::messages::session::FunctionPanicked;
use crate::observability::messages::StructuredLog;

/// The dynamic value flowing between operations.
pub type Value = serde_json::Value;

/// A registered function after type erasure.
pub type Callable = Arc<dyn Fn(Vec<Value>) -> FlowResult<Value> + Send + Sync>;

/// A registered constructor: called with construction parameters, yields the real callable.
pub type FactoryFn = Arc<dyn Fn(Vec<Value>) -> FlowResult<Callable> + Send + Sync>;

/// Conversion from a flow value into a function parameter.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> FlowResult<Self>;
}

impl<T> FromValue for T
where
    T: DeserializeOwned + Default,
{
    fn from_value(value: Value) -> FlowResult<Self> {
        if value.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(value).map_err(|e| {
            FlowError::InvalidInput(format!("cannot convert to {}: {}", type_name::<T>(), e))
        })
    }
}

/// Why a function output could not become a flow value.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputError {
    /// The function returned its declared error.
    Declared(String),
    /// The returned value is not representable as a [`Value`].
    Unrepresentable(String),
}

impl OutputError {
    fn into_flow_error(self, entry: &str) -> FlowError {
        match self {
            OutputError::Declared(message) => FlowError::Function {
                operation: entry.to_string(),
                message,
            },
            OutputError::Unrepresentable(reason) => {
                FlowError::InvalidOutput(format!("'{}': {}", entry, reason))
            }
        }
    }
}

/// Conversion from a function return into a flow value.
pub trait IntoOutput {
    fn into_output(self) -> Result<Value, OutputError>;

    /// Type label shown in entry descriptions.
    fn output_type() -> String {
        type_name::<Self>().to_string()
    }
}

fn serialize<T: Serialize + ?Sized>(value: &T) -> Result<Value, OutputError> {
    serde_json::to_value(value).map_err(|e| OutputError::Unrepresentable(e.to_string()))
}

macro_rules! impl_into_output_serialize {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoOutput for $ty {
                fn into_output(self) -> Result<Value, OutputError> {
                    serialize(&self)
                }
            }
        )*
    };
}

impl_into_output_serialize!(
    (), bool, char, String, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize,
    f32, f64,
);

impl IntoOutput for Value {
    fn into_output(self) -> Result<Value, OutputError> {
        Ok(self)
    }
}

impl IntoOutput for &'static str {
    fn into_output(self) -> Result<Value, OutputError> {
        Ok(Value::String(self.to_string()))
    }
}

impl<T: Serialize> IntoOutput for Vec<T> {
    fn into_output(self) -> Result<Value, OutputError> {
        serialize(&self)
    }
}

impl<T: Serialize> IntoOutput for Option<T> {
    fn into_output(self) -> Result<Value, OutputError> {
        serialize(&self)
    }
}

impl<T: Serialize> IntoOutput for HashMap<String, T> {
    fn into_output(self) -> Result<Value, OutputError> {
        serialize(&self)
    }
}

impl<T: Serialize> IntoOutput for BTreeMap<String, T> {
    fn into_output(self) -> Result<Value, OutputError> {
        serialize(&self)
    }
}

/// Wrapper returning any `Serialize` type from a registered function.
#[derive(Debug, Clone, PartialEq)]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoOutput for Json<T> {
    fn into_output(self) -> Result<Value, OutputError> {
        serialize(&self.0)
    }

    fn output_type() -> String {
        type_name::<T>().to_string()
    }
}

impl<T, E> IntoOutput for Result<T, E>
where
    T: IntoOutput,
    E: Display,
{
    fn into_output(self) -> Result<Value, OutputError> {
        match self {
            Ok(value) => value.into_output(),
            Err(e) => Err(OutputError::Declared(e.to_string())),
        }
    }

    fn output_type() -> String {
        T::output_type()
    }
}

/// A typed function that can be erased into a [`Callable`].
///
/// `Args` is the tuple of parameter types; it only exists to keep the impls for
/// different arities apart.
pub trait IntoCallable<Args>: Send + Sync + 'static {
    fn input_types() -> Vec<String>;
    fn output_type() -> String;
    fn into_callable(self, entry: String) -> Callable;
}

/// A typed constructor whose return value is itself an [`IntoCallable`].
pub trait IntoFactory<Args>: Send + Sync + 'static {
    fn input_types() -> Vec<String>;
    fn output_type() -> String;
    fn into_factory(self, entry: String) -> FactoryFn;
}

fn check_arity(entry: &str, expected: usize, got: usize) -> FlowResult<()> {
    if expected != got {
        return Err(FlowError::InvalidInput(format!(
            "'{}' expects {} inputs, got {}",
            entry, expected, got
        )));
    }
    Ok(())
}

macro_rules! impl_callable {
    ($($arg:ident),*) => {
        impl<F, R, $($arg,)*> IntoCallable<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> R + Send + Sync + 'static,
            R: IntoOutput,
            $($arg: FromValue,)*
        {
            fn input_types() -> Vec<String> {
                vec![$(type_name::<$arg>().to_string()),*]
            }

            fn output_type() -> String {
                R::output_type()
            }

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_callable(self, entry: String) -> Callable {
                let arity = <Self as IntoCallable<($($arg,)*)>>::input_types().len();
                Arc::new(move |args: Vec<Value>| {
                    check_arity(&entry, arity, args.len())?;
                    let mut args = args.into_iter();
                    $(let $arg = $arg::from_value(args.next().unwrap_or(Value::Null))?;)*
                    (self)($($arg),*)
                        .into_output()
                        .map_err(|e| e.into_flow_error(&entry))
                })
            }
        }

        impl<F, G, M, $($arg,)*> IntoFactory<(M, ($($arg,)*))> for F
        where
            F: Fn($($arg),*) -> G + Send + Sync + 'static,
            G: IntoCallable<M>,
            $($arg: FromValue,)*
        {
            fn input_types() -> Vec<String> {
                G::input_types()
            }

            fn output_type() -> String {
                G::output_type()
            }

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_factory(self, entry: String) -> FactoryFn {
                let arity = <[&str]>::len(&[$(stringify!($arg)),*]);
                Arc::new(move |args: Vec<Value>| {
                    check_arity(&entry, arity, args.len())?;
                    let mut args = args.into_iter();
                    $(let $arg = $arg::from_value(args.next().unwrap_or(Value::Null))?;)*
                    Ok((self)($($arg),*).into_callable(entry.clone()))
                })
            }
        }
    };
}

impl_callable!();
impl_callable!(A1);
impl_callable!(A1, A2);
impl_callable!(A1, A2, A3);
impl_callable!(A1, A2, A3, A4);
impl_callable!(A1, A2, A3, A4, A5);
impl_callable!(A1, A2, A3, A4, A5, A6);
impl_callable!(A1, A2, A3, A4, A5, A6, A7);
impl_callable!(A1, A2, A3, A4, A5, A6, A7, A8);

thread_local! {
    /// Set while this thread runs inside [`trap`].
    static TRAPPING: Cell<bool> = const { Cell::new(false) };
    /// Backtrace recorded by the panic hook at the panicking frame.
    static PANIC_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Chain a panic hook that records the backtrace before unwinding, for trapped panics only.
fn install_backtrace_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if TRAPPING.with(Cell::get) {
                let trace = Backtrace::force_capture().to_string();
                PANIC_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            }
            previous(info);
        }));
    });
}

/// Run foreign code, converting a panic into [`FlowError::Panicked`].
///
/// This is the only place the engine catches unwinding; every registered function and
/// every factory invocation goes through it.
pub(crate) fn trap<T>(
    operation: &str,
    location: &str,
    call: impl FnOnce() -> FlowResult<T>,
) -> FlowResult<T> {
    install_backtrace_hook();
    PANIC_BACKTRACE.with(|slot| slot.borrow_mut().take());
    let was_trapping = TRAPPING.with(|flag| flag.replace(true));
    let outcome = panic::catch_unwind(AssertUnwindSafe(call));
    TRAPPING.with(|flag| flag.set(was_trapping));

    match outcome {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            let backtrace = PANIC_BACKTRACE
                .with(|slot| slot.borrow_mut().take())
                .unwrap_or_else(|| Backtrace::force_capture().to_string());
            FunctionPanicked {
                operation,
                location,
                message: &message,
            }
            .log();
            Err(FlowError::Panicked {
                operation: operation.to_string(),
                location: location.to_string(),
                message,
                backtrace,
            })
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn erase<Args, F: IntoCallable<Args>>(f: F) -> Callable {
        f.into_callable("test".to_string())
    }

    fn vecadd(a: Vec<f32>, b: Vec<f32>) -> Vec<f32> {
        a.iter().zip(b.iter()).map(|(x, y)| x + y).collect()
    }

    #[test]
    fn test_positional_marshaling() {
        let callable = erase(vecadd);
        let result = callable(vec![json!([1.0, 2.0]), json!([3.0, 4.0])]).unwrap();
        let result: Vec<f32> = serde_json::from_value(result).unwrap();
        assert_eq!(result, vec![4.0, 6.0]);
    }

    #[test]
    fn test_null_becomes_default() {
        let callable = erase(|a: i64, b: Vec<i64>| a + b.len() as i64);
        let result = callable(vec![Value::Null, Value::Null]).unwrap();
        assert_eq!(result, json!(0));
    }

    #[test]
    fn test_arity_mismatch_is_invalid_input() {
        let callable = erase(vecadd);
        let err = callable(vec![json!([1.0])]).unwrap_err();
        assert!(matches!(err, FlowError::InvalidInput(_)));
        assert!(err.to_string().contains("expects 2 inputs, got 1"));
    }

    #[test]
    fn test_unconvertible_argument_is_invalid_input() {
        let callable = erase(|a: i64| a);
        let err = callable(vec![json!("not a number")]).unwrap_err();
        assert!(matches!(err, FlowError::InvalidInput(_)));
        assert!(err.to_string().contains("i64"));
    }

    #[test]
    fn test_declared_error_is_function_error() {
        let callable = erase(|a: i64| -> Result<i64, String> {
            if a < 0 {
                Err("negative".to_string())
            } else {
                Ok(a)
            }
        });

        assert_eq!(callable(vec![json!(3)]).unwrap(), json!(3));
        let err = callable(vec![json!(-1)]).unwrap_err();
        assert_eq!(
            err,
            FlowError::Function {
                operation: "test".to_string(),
                message: "negative".to_string(),
            }
        );
    }

    #[test]
    fn test_unit_return_is_null() {
        let callable = erase(|_a: String| {});
        assert_eq!(callable(vec![json!("x")]).unwrap(), Value::Null);
    }

    #[test]
    fn test_json_wrapper_serializes_structs() {
        #[derive(Serialize, Deserialize, Default)]
        struct Point {
            x: i32,
            y: i32,
        }

        let callable = erase(|p: Point| Json(Point { x: p.y, y: p.x }));
        let result = callable(vec![json!({"x": 1, "y": 2})]).unwrap();
        assert_eq!(result, json!({"x": 2, "y": 1}));
    }

    #[test]
    fn test_factory_builds_callable_from_params() {
        let factory = (|a: i64, b: i64| move || a + b).into_factory("sum".to_string());
        let callable = factory(vec![json!(1), json!(1)]).unwrap();
        assert_eq!(callable(vec![]).unwrap(), json!(2));
    }

    #[test]
    fn test_trap_converts_panic() {
        let result: FlowResult<()> = trap("op", "here.rs:1", || panic!("boom"));
        match result {
            Err(FlowError::Panicked {
                operation,
                location,
                message,
                backtrace,
            }) => {
                assert_eq!(operation, "op");
                assert_eq!(location, "here.rs:1");
                assert_eq!(message, "boom");
                assert!(!backtrace.is_empty());
            }
            other => panic!("expected panicked error, got {:?}", other),
        }
    }

    #[inline(never)]
    fn panicking_leaf() -> FlowResult<()> {
        panic!("leaf")
    }

    #[test]
    fn test_trap_backtrace_includes_panicking_frame() {
        match trap("op", "here.rs:1", panicking_leaf) {
            Err(FlowError::Panicked { backtrace, .. }) => {
                assert!(backtrace.contains("panicking_leaf"), "{}", backtrace);
            }
            other => panic!("expected panicked error, got {:?}", other),
        }
    }
}

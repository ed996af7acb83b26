// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors raised while registering functions, building flows and evaluating sessions.
//!
//! Every variant is `Clone` because a failed operation is memoized inside its session and
//! handed to every consumer that reaches it, exactly like a successful result.

use thiserror::Error;

/// Sentinel classification of a [`FlowError`].
///
/// Collaborators that only need to branch on the failure category (e.g. a transport layer
/// mapping failures onto status codes) match on this instead of on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    EntryNotFound,
    NotAFunction,
    InvalidInput,
    InvalidOutput,
    InvalidOperation,
    Execution,
    Config,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlowError {
    /// No registry entry under this name.
    #[error("Entry not found '{0}'")]
    EntryNotFound(String),

    /// A registration argument list did not pair names with functions.
    #[error("Is not a function: {0}")]
    NotAFunction(String),

    /// An operation received an input it cannot use.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A function produced a value that cannot be represented as a flow value.
    #[error("Invalid output: {0}")]
    InvalidOutput(String),

    /// The operation itself is malformed (e.g. wired to an operation of another flow).
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A registered function returned its declared error.
    #[error("{operation}: {message}")]
    Function { operation: String, message: String },

    /// A registered function panicked; the panic was trapped at the invocation boundary.
    #[error("{operation} panicked at {location}: {message}")]
    Panicked {
        operation: String,
        location: String,
        message: String,
        backtrace: String,
    },

    /// Failures collected from every branch of a fan-out.
    #[error("{}", join_messages(.0))]
    Combined(Vec<FlowError>),

    /// Configuration could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(String),
}

fn join_messages(errors: &[FlowError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

impl FlowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlowError::EntryNotFound(_) => ErrorKind::EntryNotFound,
            FlowError::NotAFunction(_) => ErrorKind::NotAFunction,
            FlowError::InvalidInput(_) => ErrorKind::InvalidInput,
            FlowError::InvalidOutput(_) => ErrorKind::InvalidOutput,
            FlowError::InvalidOperation(_) => ErrorKind::InvalidOperation,
            FlowError::Function { .. } | FlowError::Panicked { .. } => ErrorKind::Execution,
            FlowError::Combined(errors) => match errors.as_slice() {
                [single] => single.kind(),
                _ => ErrorKind::Execution,
            },
            FlowError::Config(_) => ErrorKind::Config,
        }
    }

    /// Build a combined error, flattening nested combinations so messages are never
    /// repeated when an input failure is reported again by its consumer.
    pub fn combine(errors: Vec<FlowError>) -> FlowError {
        let mut flat = Vec::with_capacity(errors.len());
        for error in errors {
            match error {
                FlowError::Combined(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => FlowError::InvalidOperation("no failures to combine".to_string()),
            1 => flat.remove(0),
            _ => FlowError::Combined(flat),
        }
    }

    /// Every individual failure contained in this error.
    pub fn failures(&self) -> Vec<&FlowError> {
        match self {
            FlowError::Combined(inner) => inner.iter().flat_map(FlowError::failures).collect(),
            other => vec![other],
        }
    }
}

/// Result type alias for dataflow operations.
pub type FlowResult<T> = Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let cases = vec![
            (FlowError::EntryNotFound("x".into()), ErrorKind::EntryNotFound),
            (FlowError::NotAFunction("x".into()), ErrorKind::NotAFunction),
            (FlowError::InvalidInput("x".into()), ErrorKind::InvalidInput),
            (FlowError::InvalidOutput("x".into()), ErrorKind::InvalidOutput),
            (FlowError::InvalidOperation("x".into()), ErrorKind::InvalidOperation),
            (
                FlowError::Function {
                    operation: "op".into(),
                    message: "boom".into(),
                },
                ErrorKind::Execution,
            ),
            (FlowError::Config("x".into()), ErrorKind::Config),
        ];

        for (error, expected) in cases {
            assert_eq!(error.kind(), expected, "kind mismatch for {:?}", error);
        }
    }

    #[test]
    fn test_combine_flattens_and_joins() {
        let nested = FlowError::combine(vec![
            FlowError::InvalidInput("first".into()),
            FlowError::combine(vec![
                FlowError::InvalidInput("second".into()),
                FlowError::InvalidOutput("third".into()),
            ]),
        ]);

        assert_eq!(nested.failures().len(), 3);
        let message = nested.to_string();
        assert_eq!(
            message,
            "Invalid input: first\nInvalid input: second\nInvalid output: third"
        );
        assert_eq!(nested.kind(), ErrorKind::Execution);
    }

    #[test]
    fn test_combine_empty_has_a_message() {
        let empty = FlowError::combine(Vec::new());
        assert_eq!(empty.kind(), ErrorKind::InvalidOperation);
        assert!(!empty.to_string().is_empty());
        assert_eq!(empty.failures().len(), 1);
    }

    #[test]
    fn test_combine_single_unwraps() {
        let single = FlowError::combine(vec![FlowError::EntryNotFound("vecadd".into())]);
        assert_eq!(single, FlowError::EntryNotFound("vecadd".into()));
        assert_eq!(single.kind(), ErrorKind::EntryNotFound);
    }
}

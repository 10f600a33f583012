// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Execution error types

use crate::ast::parser::ParserError;
use crate::ast::validator::ValidationError;
use crate::functions::FunctionError;
use crate::interchange::InterchangeError;
use crate::storage::indexes::IndexError;
use crate::storage::{GraphError, StorageError};
use thiserror::Error;

/// Execution errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Syntax error: {message} (line {line}, column {column})")]
    SyntaxError {
        message: String,
        line: usize,
        column: usize,
        found: String,
        expected: String,
    },

    #[error("Semantic error: {0}")]
    SemanticError(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Query aborted: {0}")]
    Aborted(String),

    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),

    #[error("Transaction error: {0}")]
    TransactionError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Import error: {0}")]
    ImportError(String),

    #[error("Rejected: {0}")]
    Rejected(String),
}

impl ExecutionError {
    /// Whether the error was raised before any statement ran
    pub fn is_compile_time(&self) -> bool {
        matches!(
            self,
            ExecutionError::SyntaxError { .. } | ExecutionError::SemanticError(_)
        )
    }
}

impl From<ParserError> for ExecutionError {
    fn from(error: ParserError) -> Self {
        match error {
            ParserError::Syntax {
                message,
                line,
                column,
                found,
                expected,
            } => ExecutionError::SyntaxError {
                message,
                line,
                column,
                found,
                expected,
            },
        }
    }
}

impl From<Vec<ValidationError>> for ExecutionError {
    fn from(errors: Vec<ValidationError>) -> Self {
        let message = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        ExecutionError::SemanticError(message)
    }
}

impl From<GraphError> for ExecutionError {
    fn from(error: GraphError) -> Self {
        match &error {
            e if e.is_constraint_violation() => ExecutionError::ConstraintViolation(e.to_string()),
            GraphError::NodeNotFound(_) | GraphError::EdgeNotFound(_) => {
                ExecutionError::NotFound(error.to_string())
            }
            GraphError::SchemaError(_) => ExecutionError::SemanticError(error.to_string()),
            _ => ExecutionError::StorageError(error.to_string()),
        }
    }
}

impl From<StorageError> for ExecutionError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::Graph(graph) => graph.into(),
            other => ExecutionError::StorageError(other.to_string()),
        }
    }
}

impl From<FunctionError> for ExecutionError {
    fn from(error: FunctionError) -> Self {
        match error {
            FunctionError::InvalidArgumentType { .. } => ExecutionError::TypeError(error.to_string()),
            FunctionError::UnknownFunction { name } => {
                ExecutionError::SemanticError(format!("Unknown function '{}'", name))
            }
            other => ExecutionError::RuntimeError(other.to_string()),
        }
    }
}

impl From<IndexError> for ExecutionError {
    fn from(error: IndexError) -> Self {
        match error {
            IndexError::NotFound(name) => {
                ExecutionError::NotFound(format!("There is no index named '{}'", name))
            }
            IndexError::AlreadyExists(_) | IndexError::InvalidConfiguration(_) => {
                ExecutionError::SemanticError(error.to_string())
            }
            other => ExecutionError::RuntimeError(other.to_string()),
        }
    }
}

impl From<InterchangeError> for ExecutionError {
    fn from(error: InterchangeError) -> Self {
        ExecutionError::ImportError(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_errors_map_to_categories() {
        let violation: ExecutionError = GraphError::UniqueViolation {
            constraint: "c".into(),
            node: "n".into(),
            label: "Person".into(),
            property: "email".into(),
            value: "'a@b'".into(),
        }
        .into();
        assert!(matches!(violation, ExecutionError::ConstraintViolation(_)));

        let missing: ExecutionError = StorageError::Graph(GraphError::NodeNotFound("x".into())).into();
        assert!(matches!(missing, ExecutionError::NotFound(_)));

        let durability: ExecutionError = StorageError::DurabilityError("disk full".into()).into();
        assert!(matches!(durability, ExecutionError::StorageError(_)));
    }

    #[test]
    fn test_syntax_error_keeps_position() {
        let err: ExecutionError = crate::ast::parser::parse_query("MATCH (n) RETRN n")
            .unwrap_err()
            .into();
        match err {
            ExecutionError::SyntaxError { line, column, found, .. } => {
                assert_eq!((line, column), (1, 11));
                assert_eq!(found, "RETRN");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}

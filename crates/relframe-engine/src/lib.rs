//! Query engine wrapper
//!
//! The native engine itself is external: it is reached through the
//! [`QueryEngine`] trait, which accepts relational algebra requests and
//! Arrow tables. [`Worker`] ties it to the compiler.

use arrow::record_batch::RecordBatch;
use relframe_calcite::CompileError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod schema;
mod worker;

pub use schema::{frame_schema, import_type};
pub use worker::Worker;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Compilation failed: {0}")]
    Compile(#[from] CompileError),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Unsupported type {data_type} for column '{column}'")]
    UnsupportedColumnType { column: String, data_type: String },

    #[error("Cannot import a table without record batches")]
    EmptyTable,
}

/// Start options of the native engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    pub enable_union: bool,
    pub enable_columnar_output: bool,
    pub enable_lazy_fetch: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            enable_union: true,
            enable_columnar_output: true,
            enable_lazy_fetch: false,
        }
    }
}

/// Native engine executing relational algebra over imported tables
pub trait QueryEngine {
    fn start(options: &EngineOptions) -> Result<Self, EngineError>
    where
        Self: Sized;

    fn execute_ddl(&mut self, query: &str) -> Result<(), EngineError>;

    fn execute_dml(&mut self, query: &str) -> Result<Vec<RecordBatch>, EngineError>;

    /// Execute a serialized relational algebra request
    fn execute_ra(&mut self, request: &str) -> Result<Vec<RecordBatch>, EngineError>;

    /// Register `batches` as table `name`
    fn consume_table(&mut self, name: &str, batches: Vec<RecordBatch>) -> Result<(), EngineError>;

    /// Drop all engine state
    fn reset(&mut self) {}
}

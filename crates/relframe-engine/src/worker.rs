use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use relframe_calcite::{to_json, to_request, BuildOptions};
use relframe_ir::Frame;
use tracing::{debug, info};
use uuid::Uuid;

use crate::schema::frame_schema;
use crate::{EngineError, EngineOptions, QueryEngine};

/// Imports tables into an engine and executes frames over them
pub struct Worker<E: QueryEngine> {
    engine: E,
    options: BuildOptions,
}

impl<E: QueryEngine> Worker<E> {
    pub fn new(engine: E, options: BuildOptions) -> Self {
        Self { engine, options }
    }

    /// Start a fresh engine with `engine_options`
    pub fn start(engine_options: &EngineOptions, options: BuildOptions) -> Result<Self, EngineError> {
        info!(
            enable_union = engine_options.enable_union,
            enable_columnar_output = engine_options.enable_columnar_output,
            enable_lazy_fetch = engine_options.enable_lazy_fetch,
            "Starting query engine"
        );
        Ok(Self::new(E::start(engine_options)?, options))
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Generated table name unless `name` is given
    pub fn table_name(name: Option<&str>) -> String {
        match name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("frame_{}", Uuid::new_v4().simple()),
        }
    }

    /// Register `batches` in the engine and return a frame scanning them
    pub fn import_table(
        &mut self,
        batches: Vec<RecordBatch>,
        name: Option<&str>,
    ) -> Result<Arc<Frame>, EngineError> {
        let schema = batches.first().ok_or(EngineError::EmptyTable)?.schema();
        let columns = frame_schema(&schema)?;

        let name = Self::table_name(name);
        let rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
        self.engine.consume_table(&name, batches)?;
        info!("Imported table {} ({} rows, {} columns)", name, rows, columns.len());

        Ok(Frame::scan(name, columns))
    }

    /// Serialized request for `frame`, optionally pretty-printed
    pub fn explain(&self, frame: &Arc<Frame>, pretty: bool) -> Result<String, EngineError> {
        if !pretty {
            return Ok(to_request(frame, &self.options)?);
        }
        let json = to_json(frame, &self.options)?;
        serde_json::to_string_pretty(&json).map_err(|e| EngineError::Engine(e.to_string()))
    }

    /// Compile `frame` and run it in the engine
    pub fn execute(&mut self, frame: &Arc<Frame>) -> Result<Vec<RecordBatch>, EngineError> {
        let request = to_request(frame, &self.options)?;
        debug!(frame = %frame.id(), "Executing request: {}", request);

        let batches = self.engine.execute_ra(&request)?;
        info!("Executed {}: {} batches", frame.id(), batches.len());
        Ok(batches)
    }

    pub fn execute_ddl(&mut self, query: &str) -> Result<(), EngineError> {
        self.engine.execute_ddl(query)
    }

    pub fn execute_dml(&mut self, query: &str) -> Result<Vec<RecordBatch>, EngineError> {
        self.engine.execute_dml(query)
    }

    /// Reset the engine and give it back
    pub fn stop(mut self) -> E {
        self.engine.reset();
        self.engine
    }
}

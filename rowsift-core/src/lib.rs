//! The request orchestrator: wires store, generator, filter engine
//! and publisher into the per-request pipeline
//! upload -> prompt -> code generation -> validation -> execution ->
//! persistence, and maps each stage's failure into the user-facing
//! error taxonomy. A failure at any stage is terminal for that
//! request; nothing retries and no partial result escapes.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use rowsift_infer::CodeGenerator;
use rowsift_publish::{PublishError, ResultPublisher, DEFAULT_PREVIEW_ROWS};
use rowsift_store::{StoreError, TableStore};
use rowsift_table::{Table, TableError};
use rowsift_types::{
    DownloadHandle, FilterReport, FilterRequest, UploadReport, PROMPT_MAX_LEN, PROMPT_MIN_LEN,
};

/// Rows of the stored table shown to the model as a sample.
const SAMPLE_ROWS: usize = 5;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Client-side problem: bad extension, bad prompt, unknown or
    /// missing upload handle, unusable data.
    #[error("{0}")]
    InvalidInput(String),
    /// The model service call failed or timed out.
    #[error("code generation failed: {0}")]
    Upstream(String),
    /// Generated code was rejected by the shape check.
    #[error("generated code was rejected: {0}")]
    Validation(String),
    /// Generated code failed against this table at evaluation time.
    #[error("filter execution failed: {0}")]
    Execution(String),
    /// Read/write failure against the durable medium.
    #[error("storage failure: {0}")]
    Storage(String),
    /// A download handle that resolves to nothing.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(handle) => PipelineError::InvalidInput(format!(
                "unknown file_id {handle}; upload a CSV first"
            )),
            StoreError::Backend(msg) => PipelineError::Storage(msg),
        }
    }
}

impl From<TableError> for PipelineError {
    fn from(err: TableError) -> Self {
        PipelineError::InvalidInput(err.to_string())
    }
}

pub struct FilterPipeline {
    store: Arc<dyn TableStore>,
    generator: Arc<dyn CodeGenerator>,
    publisher: Arc<ResultPublisher>,
}

impl FilterPipeline {
    pub fn new(
        store: Arc<dyn TableStore>,
        generator: Arc<dyn CodeGenerator>,
        publisher: Arc<ResultPublisher>,
    ) -> Self {
        Self {
            store,
            generator,
            publisher,
        }
    }

    pub fn store(&self) -> &Arc<dyn TableStore> {
        &self.store
    }

    pub fn publisher(&self) -> &Arc<ResultPublisher> {
        &self.publisher
    }

    /// Parse and persist an uploaded CSV under a fresh handle.
    pub async fn upload(&self, filename: &str, bytes: &[u8]) -> Result<UploadReport, PipelineError> {
        if !filename.to_lowercase().ends_with(".csv") {
            return Err(PipelineError::InvalidInput(
                "file must be a CSV (.csv)".into(),
            ));
        }

        let table = Table::from_csv_bytes(bytes)?;
        let total_rows = table.row_count();
        let columns = table.columns().to_vec();
        let preview = table.preview(DEFAULT_PREVIEW_ROWS);
        let file_id = self.store.put(table).await?;

        tracing::info!(%file_id, total_rows, "stored uploaded table");
        Ok(UploadReport {
            total_rows,
            columns,
            preview,
            file_id,
        })
    }

    /// Run the full filter pipeline for one request.
    pub async fn filter(&self, request: &FilterRequest) -> Result<FilterReport, PipelineError> {
        let prompt = request.prompt.trim();
        let prompt_chars = prompt.chars().count();
        if prompt_chars < PROMPT_MIN_LEN || prompt_chars > PROMPT_MAX_LEN {
            return Err(PipelineError::InvalidInput(format!(
                "prompt must be between {PROMPT_MIN_LEN} and {PROMPT_MAX_LEN} characters"
            )));
        }
        let file_id = request.file_id.ok_or_else(|| {
            PipelineError::InvalidInput("file_id is required; upload a CSV first".into())
        })?;

        // TableLoaded
        let table = self.store.get(file_id).await?;
        let total_count = table.row_count();

        // CodeGenerated
        let sample = table.render_sample(SAMPLE_ROWS);
        let code = self
            .generator
            .generate(prompt, &sample)
            .await
            .map_err(|e| PipelineError::Upstream(e.message))?;

        // CodeValidated + Executed. `apply` re-runs the shape check as
        // its own first step; shape failures stay validation failures.
        let filtered = rowsift_filter::apply(&table, &code).map_err(|e| match e {
            rowsift_filter::FilterError::Shape(msg) => PipelineError::Validation(msg),
            rowsift_filter::FilterError::Eval(msg) => PipelineError::Execution(msg),
        })?;

        // Published
        let download = self
            .publisher
            .publish(&filtered)
            .map_err(|e| PipelineError::Storage(e.to_string()))?;
        let preview = ResultPublisher::preview(&filtered, DEFAULT_PREVIEW_ROWS);

        tracing::info!(
            %file_id,
            filtered = filtered.row_count(),
            total = total_count,
            "filter pipeline completed"
        );
        Ok(FilterReport {
            filtered_count: filtered.row_count(),
            total_count,
            preview,
            download,
        })
    }

    /// Resolve a download handle to an artifact path.
    pub fn resolve_download(&self, handle: &DownloadHandle) -> Result<PathBuf, PipelineError> {
        self.publisher.resolve(handle).map_err(|e| match e {
            PublishError::NotFound(name) => PipelineError::NotFound(name),
            other => PipelineError::Storage(other.to_string()),
        })
    }
}

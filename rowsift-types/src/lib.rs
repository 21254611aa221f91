use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for an uploaded table held by the table store.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadHandle(pub Uuid);

impl UploadHandle {
    pub fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for UploadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for UploadHandle {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Opaque identifier for a published filter result: the artifact
/// filename, valid only inside the publisher's directory.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadHandle(pub String);

impl DownloadHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DownloadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One preview row: field name -> cell value, in column order.
pub type PreviewRecord = serde_json::Map<String, serde_json::Value>;

/// Bounds on the natural-language filter instruction.
pub const PROMPT_MIN_LEN: usize = 1;
pub const PROMPT_MAX_LEN: usize = 500;

/// A filter request as the orchestrator receives it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterRequest {
    pub prompt: String,
    pub file_id: Option<UploadHandle>,
}

/// What upload produced: counts, columns, a short preview, the handle.
#[derive(Clone, Debug, Serialize)]
pub struct UploadReport {
    pub total_rows: usize,
    pub columns: Vec<String>,
    pub preview: Vec<PreviewRecord>,
    pub file_id: UploadHandle,
}

/// What a completed filter run produced.
#[derive(Clone, Debug, Serialize)]
pub struct FilterReport {
    pub filtered_count: usize,
    pub total_count: usize,
    pub preview: Vec<PreviewRecord>,
    pub download: DownloadHandle,
}

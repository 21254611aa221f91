use async_trait::async_trait;
use thiserror::Error;

pub mod http_openai;
pub use http_openai::HttpOpenAiGenerator;

/// The generator failed upstream: the model service itself errored,
/// rate-limited, timed out, or returned garbage transport-wise. These
/// are never masked as validation problems.
#[derive(Debug, Error)]
#[error("code generation failed: {message}")]
pub struct GenerateError {
    pub message: String,
}

/// Turns a natural-language filter instruction plus a rendered data
/// sample into a single line of filter code.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    async fn generate(&self, instruction: &str, sample: &str) -> Result<String, GenerateError>;
}

/// The fixed contract the model must satisfy. One line, the exact
/// `df = df[` reassignment shape, case-insensitive containment for
/// text, the synonym-expansion table for common role abbreviations,
/// no markdown and no prose.
pub const SYSTEM_PROMPT: &str = "\
You are a helpful assistant. The user will give a natural language prompt \
and a sample of a tabular dataset called `df`.

Your job is to return a single, valid line of code that filters `df`.

- Use `.str.contains(..., case=False, na=False)` for fuzzy, case-insensitive matching.
- Expand common slangs or abbreviations for positions. For example:
  - \"SDE\" -> \"Software Development Engineer\"
  - \"HR\" -> \"Human Resources\", \"Talent\", \"Recruiter\", \"People\"
  - \"PM\" -> \"Product Manager\", \"Program Manager\"
  - \"TA\" -> \"Talent Acquisition\"
  - \"SDM\" -> \"Software Development Manager\"
  - \"Engg Mgr\" -> \"Engineering Manager\"
- If the user asks for a role like \"HR\", include all relevant variants \
using an alternation pattern like 'HR|Talent|Recruiter|People'.
- Use `&` and `|` for combining filters.
- Do not include markdown (```), quotes, or explanations. Output only the \
raw code that starts with: `df = df[`";

/// Render the user message: instruction first, then the sample rows.
pub fn render_user_message(instruction: &str, sample: &str) -> String {
    format!("Prompt: {instruction}\n\nSample data:\n{sample}")
}

/// Strip markdown code fences the model sometimes wraps around its
/// reply, plus surrounding whitespace.
pub fn strip_code_fences(reply: &str) -> String {
    let mut out = String::with_capacity(reply.len());
    for line in reply.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line);
    }
    out.trim().to_string()
}

/// Stub generator returning a fixed line; stands in for the model in
/// tests and in stub deployments.
pub struct StaticCodeGenerator {
    code: String,
}

impl StaticCodeGenerator {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }

    /// A match-everything filter: the empty pattern is a substring of
    /// every cell. Assumes the dataset has a `Name` column, which a
    /// connections export always does.
    pub fn match_all() -> Self {
        Self::new("df = df[df['Name'].str.contains('', case=False, na=False)]")
    }
}

#[async_trait]
impl CodeGenerator for StaticCodeGenerator {
    async fn generate(&self, _instruction: &str, _sample: &str) -> Result<String, GenerateError> {
        Ok(self.code.clone())
    }
}

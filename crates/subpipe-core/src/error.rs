use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubpipeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid FITS file: {0}")]
    InvalidFits(String),

    #[error("FITS I/O error: {0}")]
    Fits(#[from] fitsio::errors::Error),

    #[error("Invalid catalog: {0}")]
    Catalog(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{tool} failed ({status}): {diagnostics}")]
    ExternalTool {
        tool: String,
        status: String,
        diagnostics: String,
    },

    #[error("{tool} did not finish within {seconds}s")]
    ToolTimeout { tool: String, seconds: u64 },

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Ledger serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SubpipeError {
    /// Build an `ExternalTool` error from a tool name, exit description and
    /// whatever the tool printed.
    pub fn tool(
        tool: impl Into<String>,
        status: impl Into<String>,
        diagnostics: impl Into<String>,
    ) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            status: status.into(),
            diagnostics: diagnostics.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SubpipeError>;

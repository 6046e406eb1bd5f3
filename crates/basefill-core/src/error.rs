use thiserror::Error;

/// Failures talking to the search index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("index returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("missing tag: {0}")]
    MissingTag(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("parse error: {0}")]
    Parse(String),
}

/// All errors that can occur in basefill-core outside the index client.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("record {0} has not been scraped yet")]
    NotScraped(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error(transparent)]
    Index(#[from] IndexError),
}

impl IndexError {
    /// Whether the index client should retry the request that produced this error.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Process exit codes for the `basefill` binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    InvalidArgs = 3,
    IndexUnavailable = 6,
    MissingTag = 7,
}

impl PipelineError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Index(IndexError::MissingTag(_)) => ExitCode::MissingTag,
            Self::Index(_) => ExitCode::IndexUnavailable,
            Self::Config(_) | Self::TomlParse(_) => ExitCode::InvalidArgs,
            _ => ExitCode::GeneralError,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
pub type IndexResult<T> = std::result::Result<T, IndexError>;

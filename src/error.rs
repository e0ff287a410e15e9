use thiserror::Error;

#[derive(Error, Debug)]
pub enum KanifyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid API key format (expected 32 hexadecimal characters)")]
    InvalidCredentialFormat,

    #[error("Network failure while downloading vocabulary: {0}")]
    NetworkFailure(String),

    #[error("WaniKani API error: {0}")]
    RemoteApi(String),

    #[error("Malformed response body: {0}")]
    MalformedResponseBody(String),

    #[error("Malformed vocabulary entry: {0}")]
    MalformedEntry(String),

    #[error("Stored vocabulary is corrupt: {0}")]
    CorruptVocabulary(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("File not found: {0}")]
    FileNotFound(String),
}

pub type Result<T> = std::result::Result<T, KanifyError>;

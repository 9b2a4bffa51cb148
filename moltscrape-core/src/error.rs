use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Moltbook API error: {0}")]
    Api(#[from] ApiError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Transport-level failures from the Moltbook API. The harvest loop never
/// aborts on these: a failed page is handled as an empty page.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("Request timeout")]
    RequestTimeout,

    #[error("HTTP {status_code} from {endpoint}")]
    ErrorStatus { status_code: u16, endpoint: String },

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },
}

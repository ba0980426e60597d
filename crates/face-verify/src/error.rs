use thiserror::Error;

#[derive(Debug, Error)]
pub enum FaceVerifyError {
    #[error("invalid verification base url: {0}")]
    InvalidBaseUrl(String),

    #[error("environment variable {0} is not set")]
    MissingApiKey(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, FaceVerifyError>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PresenceError {
    #[error("not initialized: run 'presence init'")]
    NotInitialized,

    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("site not found: {0}")]
    SiteNotFound(String),

    #[error("actor not found: {0}")]
    ActorNotFound(String),

    #[error("invalid time of day '{0}': expected HH:MM")]
    InvalidTimeOfDay(String),

    #[error("invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("invalid utc offset: {0} minutes")]
    InvalidOffset(i32),

    #[error("ledger error: {0}")]
    Ledger(String),

    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PresenceError>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LeakyError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Label error: {0}")]
    Label(#[from] LabelError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("Failed to spawn worker {label}: {source}")]
    Spawn {
        label: String,
        #[source]
        source: std::io::Error,
    },

    #[error("System error: {message}")]
    System { message: String },
}

impl LeakyError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

/// Errors raised while parsing a worker display label
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LabelError {
    #[error("label '{label}' does not start with prefix '{prefix}'")]
    PrefixMismatch { label: String, prefix: String },

    #[error("label '{0}' has no ' #' id marker")]
    MissingId(String),

    #[error("invalid worker id '{0}'")]
    InvalidId(String),

    #[error("label '{0}' has no parenthesised status")]
    MissingStatus(String),

    #[error("unknown worker status '{0}'")]
    UnknownStatus(String),
}

#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event bus closed")]
    Closed,

    #[error("Receiver lagged behind by {0} events")]
    Lagged(u64),
}

pub type Result<T> = std::result::Result<T, LeakyError>;

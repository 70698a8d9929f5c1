//! Error types for the push daemon

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed command: {0}")]
    MalformedCommand(String),

    #[error("Missing {0} argument")]
    MissingArgument(String),

    #[error("Argument {name} is not a {expected}")]
    WrongArgumentType { name: String, expected: &'static str },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Delivery(err.to_string())
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read settings from {path}: {message}")]
    Settings { path: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

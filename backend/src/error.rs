//! Error types shared by the database and asset layers

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A backing service could not be reached; surfaced as 503
    #[error("{0} unavailable")]
    DependencyUnavailable(&'static str),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("database connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("invalid text block: {0}")]
    InvalidText(String),
}

impl Error {
    pub fn invalid_text(msg: impl Into<String>) -> Self {
        Error::InvalidText(msg.into())
    }

    pub fn is_dependency_unavailable(&self) -> bool {
        matches!(self, Error::DependencyUnavailable(_))
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NewsloomError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Host not in source allowlist: {0}")]
    HostNotAllowed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Seed file error: {0}")]
    Seed(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

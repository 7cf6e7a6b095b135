//! Top-level error type for the relay binary's startup and shutdown paths.

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("failed to bind listen address: {0}")]
    Bind(std::io::Error),
    #[error("failed to persist final state: {0}")]
    PersistState(std::io::Error),
}

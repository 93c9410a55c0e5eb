use crate::config::ConfigError;
use folio_render::BackendError;

#[derive(Debug, thiserror::Error)]
pub enum ScrollerError {
    #[error("failed to load document: {0}")]
    Document(#[from] BackendError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to start background thread: {0}")]
    Thread(#[from] std::io::Error),
    #[error("scroller is already initialized")]
    AlreadyInitialized,
    #[error("scroller has been destroyed")]
    Destroyed,
}

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("session aborted")]
    Aborted,
    #[error("invalid state: {0}")]
    State(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing sample source")]
    MissingSampleSource,
    #[error("missing indicator")]
    MissingIndicator,
    #[error("missing trigger")]
    MissingTrigger,
    #[error("missing latch line")]
    MissingLatch,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;

use thiserror::Error;

pub type EngageResult<T> = Result<T, EngageError>;

#[derive(Error, Debug)]
pub enum EngageError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Workflow validation error: {0}")]
    Workflow(String),

    #[error("Scheduling error: {0}")]
    Scheduling(String),

    #[error("Enrollment error: {0}")]
    Enrollment(String),

    #[error("Delivery recording error: {0}")]
    Delivery(String),

    #[error("Condition evaluation error: {0}")]
    Condition(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

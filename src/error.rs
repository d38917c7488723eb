use thiserror::Error;

pub type Result<T> = std::result::Result<T, WardenError>;

#[derive(Error, Debug)]
pub enum WardenError {
    #[error("Rule '{0}' not found in registry")]
    RuleNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Inventory error: {0}")]
    Inventory(String),

    #[error("Output error: {0}")]
    Output(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WardenError {
    pub fn exit_code(&self) -> i32 {
        2
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required option missing: \"cache.path\"")]
    MissingCachePath,

    #[error("invalid configuration:\n{0}")]
    Invalid(String),

    #[error("cannot load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

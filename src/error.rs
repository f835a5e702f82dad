//! Error types for the player
use thiserror::Error;

/// Player errors
#[derive(Error, Debug)]
pub enum PlayerError {
    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Config could not be serialized
    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Session bus error
    #[error("D-Bus error: {0}")]
    Remote(#[from] zbus::Error),

    /// Another process keeps the well-known bus name
    #[error("Not the primary owner of bus name {0}")]
    NameNotOwned(String),

    /// Media engine could not be built
    #[error("Engine error: {0}")]
    Engine(String),

    /// Remote signal name not in the signal table
    #[error("Unknown remote signal: {0}")]
    UnknownSignal(String),
}

/// Result type for player operations
pub type Result<T> = std::result::Result<T, PlayerError>;

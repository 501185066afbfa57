use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    External(#[from] ExternalError),

    #[error("{0}")]
    Usage(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found. Searched: {}", display_paths(.0))]
    NotFound(Vec<PathBuf>),

    #[error("Could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Could not parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid structure in {path}: key '{key}' {reason}")]
    Structure {
        path: PathBuf,
        key: String,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to write temporary compose file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize compose manifest: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}")]
    Failed { program: String, status: String },

    #[error("Failed to read output of '{program}': {source}")]
    Io {
        program: String,
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("Could not find '{0}' in PATH")]
    ToolNotFound(String),

    #[error("{action} failed: {source}")]
    Failed {
        action: String,
        source: EngineError,
    },

    #[error("{0}")]
    Invalid(String),
}

impl ExternalError {
    pub fn failed(action: impl Into<String>, source: EngineError) -> Self {
        ExternalError::Failed {
            action: action.into(),
            source,
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, Error>;

//! Error kinds (§7). `ConfigError` and `ParseError` halt the whole stream;
//! `AssemblyError` fails the current document only; `SchemaError` and
//! `ManifestError` are recorded and the pipeline continues; `WriterError`
//! is fatal once retries of a short write are exhausted.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("parse error on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("schema violation: {0}")]
    Schema(String),

    #[error("assembly error in document {document}: {message}")]
    Assembly { document: String, message: String },

    #[error("manifest error at {path}: {message}")]
    Manifest { path: String, message: String },

    #[error("writer error: {0}")]
    Writer(String),
}

impl LinkError {
    pub fn config(msg: impl Into<String>) -> Self {
        LinkError::Config(msg.into())
    }
}

pub type Result<T> = anyhow::Result<T>;

//! Adapter trait definition.

use async_trait::async_trait;
use iw_core::{Record, SourceContext};
use thiserror::Error;

/// Errors a source adapter can raise.
///
/// All of them surface before or during collection and abort the run; once
/// records are handed to the engine, problems inside them are absorbed
/// per record instead.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Missing or invalid adapter setting.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Reading the backing data failed.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The backing document did not parse.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One configured inventory source.
#[async_trait]
pub trait Source: Send + Sync {
    /// The identity token records from this source are tagged with.
    fn context(&self) -> SourceContext;

    /// Validates the adapter's settings before the run starts.
    async fn validate(&self) -> Result<(), SourceError>;

    /// Collects every record this source currently reports.
    async fn collect(&self) -> Result<Vec<Record>, SourceError>;
}

//! Dispatcher error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatcherError {
    /// A sink could not be opened (missing `path`, unwritable file)
    #[error("failed to open sink '{name}'")]
    SinkCreation {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl DispatcherError {
    pub fn sink_creation(name: impl Into<String>, source: std::io::Error) -> Self {
        Self::SinkCreation {
            name: name.into(),
            source,
        }
    }
}

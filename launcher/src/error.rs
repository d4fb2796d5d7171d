use thiserror::Error;

/// Startup failures that end the process with a failure status.
#[derive(Debug, Error)]
pub enum StartupError {
    /// Malformed or conflicting invocation arguments.
    #[error("{0}")]
    CommandLine(String),
    #[error("something went wrong while daemonizing: {0}")]
    Daemonize(#[source] std::io::Error),
    /// Another instance took the slot between the pre-daemon check and the
    /// re-check in the detached child.
    #[error("another instance started while daemonizing")]
    DaemonRace,
    #[error("upgrade failed: {0:#}")]
    Upgrade(anyhow::Error),
}

impl StartupError {
    pub fn command_line(msg: impl Into<String>) -> Self {
        StartupError::CommandLine(msg.into())
    }
}

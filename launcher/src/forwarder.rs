use anyhow::Context;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::timeout;

use ipc::Message;

use crate::identity::ApplicationId;
use crate::net::{connect, send_frame};
use crate::paths::socket_path;

// The running instance may be busy or wedged; a second launch must not hang.
const FORWARD_TIMEOUT: Duration = Duration::from_secs(3);

pub trait ParameterForwarder {
    /// One delivery attempt of `params` to the instance owning `app_id`.
    fn forward(&self, app_id: &ApplicationId, params: Vec<String>) -> anyhow::Result<()>;
}

/// Delivers over the running instance's Unix socket.
#[derive(Debug, Default)]
pub struct SocketForwarder {
    socket_override: Option<PathBuf>,
}

impl SocketForwarder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_socket(path: PathBuf) -> Self {
        Self {
            socket_override: Some(path),
        }
    }
}

impl ParameterForwarder for SocketForwarder {
    fn forward(&self, app_id: &ApplicationId, params: Vec<String>) -> anyhow::Result<()> {
        let socket = self
            .socket_override
            .clone()
            .unwrap_or_else(|| socket_path(app_id));
        // Startup runs before the engine's runtime exists; a throwaway
        // current-thread runtime is enough for one frame.
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("build forward runtime")?;
        rt.block_on(send_params(&socket, app_id, params))
    }
}

pub async fn send_params(
    socket: &std::path::Path,
    app_id: &ApplicationId,
    params: Vec<String>,
) -> anyhow::Result<()> {
    let count = params.len();
    let msg = Message::new_params(app_id.as_str(), params);
    let bytes = msg.to_bytes().context("encode params")?;

    let mut stream = timeout(FORWARD_TIMEOUT, connect(socket))
        .await
        .context("connect timed out")??;
    timeout(FORWARD_TIMEOUT, send_frame(&mut stream, &bytes))
        .await
        .context("send timed out")??;

    log::info!(
        "forward: delivered {} parameter(s) to {} event_id={}",
        count,
        app_id,
        msg.event_id
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_socket_is_an_error_not_a_hang() {
        let dir = tempfile::tempdir().unwrap();
        let f = SocketForwarder::with_socket(dir.path().join("nobody.sock"));
        let id = crate::identity::derive("1000", "");
        assert!(f.forward(&id, vec!["a.torrent".to_string()]).is_err());
    }
}

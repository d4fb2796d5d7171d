use anyhow::Context;
use std::path::{Path, PathBuf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, watch};

use ipc::Message;

use crate::identity::ApplicationId;
use crate::net::read_frame;
use crate::signals::wait_until_set;

/// Receiving end of parameter forwarding: accepts frames from later launches
/// of the same configuration and hands the decoded messages to the engine.
pub struct InstanceListener {
    listener: UnixListener,
    path: PathBuf,
}

impl InstanceListener {
    /// Must be called by the holder of the instance lock, which makes any
    /// socket file already at `path` a leftover of a dead instance.
    pub fn bind(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create runtime dir {}", parent.display()))?;
        }
        if path.exists() {
            log::debug!("listener: removing stale socket {}", path.display());
            std::fs::remove_file(path)
                .with_context(|| format!("remove stale socket {}", path.display()))?;
        }
        let listener =
            UnixListener::bind(path).with_context(|| format!("bind {}", path.display()))?;
        log::info!("listener: accepting forwarded parameters on {}", path.display());
        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept loop; returns once `shutdown` is true (or its sender is gone).
    pub async fn run(
        self,
        app_id: ApplicationId,
        tx: mpsc::Sender<Message>,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                res = self.listener.accept() => {
                    let (socket, _) = res.context("accept")?;
                    let tx = tx.clone();
                    let app_id = app_id.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_conn(socket, app_id, tx).await {
                            log::warn!("listener: connection error: {e:?}");
                        }
                    });
                }
                _ = wait_until_set(&mut shutdown) => break,
            }
        }
        Ok(())
    }
}

impl Drop for InstanceListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

async fn handle_conn(
    mut socket: UnixStream,
    app_id: ApplicationId,
    tx: mpsc::Sender<Message>,
) -> anyhow::Result<()> {
    while let Some(buf) = read_frame(&mut socket).await? {
        let msg = match Message::try_from_bytes(&buf) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("listener: dropping undecodable frame ({} bytes): {e}", buf.len());
                continue;
            }
        };
        if msg.app_id != app_id.as_str() {
            log::warn!(
                "listener: ignoring message for {} (this instance is {})",
                msg.app_id,
                app_id
            );
            continue;
        }
        log::debug!(
            "listener: {:?} from pid={} params={}",
            msg.kind,
            msg.sender_pid,
            msg.params.len()
        );
        if tx.send(msg).await.is_err() {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forwarder::send_params;
    use crate::identity::derive;
    use crate::net::{connect, send_frame};
    use ipc::Kind;

    #[tokio::test]
    async fn forwarded_params_reach_the_engine_channel() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("swarmd-1000.sock");
        let id = derive("1000", "");

        let listener = InstanceListener::bind(&sock).unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(listener.run(id.clone(), tx, stop_rx));

        send_params(&sock, &id, vec!["a.torrent".to_string(), "b.torrent".to_string()])
            .await
            .unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.kind, Kind::Params);
        assert_eq!(msg.params, vec!["a.torrent", "b.torrent"]);

        send_params(&sock, &id, Vec::new()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().kind, Kind::Activate);

        stop_tx.send(true).unwrap();
        task.await.unwrap().unwrap();
        assert!(!sock.exists(), "socket file should be removed on shutdown");
    }

    #[tokio::test]
    async fn foreign_and_garbage_frames_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("s.sock");
        let id = derive("1000", "work");

        let listener = InstanceListener::bind(&sock).unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(listener.run(id.clone(), tx, stop_rx));

        let mut s = connect(&sock).await.unwrap();
        send_frame(&mut s, b"not a message").await.unwrap();
        let other = Message::new_params("swarmd-1000", vec!["x".to_string()]);
        send_frame(&mut s, &other.to_bytes().unwrap()).await.unwrap();
        let mine = Message::new_params(id.as_str(), vec!["y".to_string()]);
        send_frame(&mut s, &mine.to_bytes().unwrap()).await.unwrap();

        let got = rx.recv().await.unwrap();
        assert_eq!(got.params, vec!["y"]);

        stop_tx.send(true).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stale_socket_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("stale.sock");
        std::fs::write(&sock, b"").unwrap();
        let listener = InstanceListener::bind(&sock).unwrap();
        assert_eq!(listener.path(), sock.as_path());
    }
}

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::AsyncWriteExt;

use ipc::{Kind, Message};

/// One line of `forwarded.jsonl`: a parameter list another launch handed to
/// this instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardEvent {
    pub ts_ms: u64,
    pub event_id: String,
    pub app_id: String,
    pub sender_pid: u32,
    pub kind: String,
    pub params: Vec<String>,
}

fn kind_to_string(k: &Kind) -> String {
    match k {
        Kind::Params => "params",
        Kind::Activate => "activate",
    }
    .to_string()
}

impl ForwardEvent {
    pub fn from_message(msg: &Message) -> Self {
        Self {
            ts_ms: ipc::now_ms(),
            event_id: msg.event_id.clone(),
            app_id: msg.app_id.clone(),
            sender_pid: msg.sender_pid,
            kind: kind_to_string(&msg.kind),
            params: msg.params.clone(),
        }
    }
}

/// Best-effort; never fails the engine loop.
pub async fn record_forwarded(path: &Path, msg: &Message) {
    let event = ForwardEvent::from_message(msg);
    if let Some(parent) = path.parent() {
        let _ = tokio::fs::create_dir_all(parent).await;
    }

    let line = match serde_json::to_string(&event) {
        Ok(s) => s,
        Err(e) => {
            log::debug!("history: encode event failed: {e}");
            return;
        }
    };

    let mut f = match tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
    {
        Ok(v) => v,
        Err(e) => {
            log::debug!("history: open {} failed: {e}", path.display());
            return;
        }
    };

    let mut buf = line.into_bytes();
    buf.push(b'\n');
    if let Err(e) = f.write_all(&buf).await {
        log::debug!("history: write {} failed: {e}", path.display());
    }
}

pub fn read_history(path: &Path) -> anyhow::Result<Vec<ForwardEvent>> {
    let s = std::fs::read_to_string(path)?;
    let mut out = Vec::new();
    for line in s.lines().filter(|l| !l.trim().is_empty()) {
        out.push(serde_json::from_str(line)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_one_line_per_message() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("nested").join("forwarded.jsonl");

        record_forwarded(&p, &Message::new_params("swarmd-1", vec!["a".to_string()])).await;
        record_forwarded(&p, &Message::new_params("swarmd-1", Vec::new())).await;

        let events = read_history(&p).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, "params");
        assert_eq!(events[0].params, vec!["a"]);
        assert_eq!(events[1].kind, "activate");
    }

    // /dev/full accepts the open and fails every write with ENOSPC.
    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn write_failure_does_not_disturb_the_caller() {
        let full = Path::new("/dev/full");
        if !full.exists() {
            return;
        }
        record_forwarded(full, &Message::new_params("swarmd-1", vec!["a".to_string()])).await;
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MSG_V1_MAGIC: &[u8; 4] = b"SWD1";

/// Upper bound for a single frame on the instance socket.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    /// Parameters from a second launch that should be handled by the running instance.
    Params,
    /// A second launch without parameters; the running instance should just surface itself.
    Activate,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Message {
    pub event_id: String,
    /// Application id of the instance slot the sender resolved.
    pub app_id: String,
    pub sender_pid: u32,
    pub ts: u64,
    pub kind: Kind,
    pub params: Vec<String>,
}

impl Message {
    pub fn new_params(app_id: &str, params: Vec<String>) -> Self {
        let kind = if params.is_empty() {
            Kind::Activate
        } else {
            Kind::Params
        };
        Self {
            event_id: Uuid::new_v4().to_string(),
            app_id: app_id.to_string(),
            sender_pid: std::process::id(),
            ts: crate::now_ms(),
            kind,
            params,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        let body = bincode::serialize(self)?;
        let mut out = Vec::with_capacity(MSG_V1_MAGIC.len() + body.len());
        out.extend_from_slice(MSG_V1_MAGIC);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decode a frame read from the instance socket.
    ///
    /// Frames without the magic prefix come from something that is not a
    /// launcher (or from an incompatible build) and are rejected.
    pub fn try_from_bytes(b: &[u8]) -> Result<Self, bincode::Error> {
        match b.strip_prefix(MSG_V1_MAGIC.as_slice()) {
            Some(body) => bincode::deserialize(body),
            None => Err(Box::new(bincode::ErrorKind::Custom(
                "missing message magic".to_string(),
            ))),
        }
    }
}

pub fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_message_keeps_order_and_sender() {
        let m = Message::new_params(
            "swarmd-1000",
            vec!["a.torrent".to_string(), "magnet:?xt=urn:btih:abc".to_string()],
        );
        let b = m.to_bytes().expect("encode");
        let m2 = Message::try_from_bytes(&b).expect("decode");
        assert_eq!(m2.kind, Kind::Params);
        assert_eq!(m2.app_id, "swarmd-1000");
        assert_eq!(m2.sender_pid, std::process::id());
        assert_eq!(m2.params, vec!["a.torrent", "magnet:?xt=urn:btih:abc"]);
    }

    #[test]
    fn empty_param_list_becomes_activation() {
        let m = Message::new_params("swarmd-1000", Vec::new());
        assert_eq!(m.kind, Kind::Activate);
    }

    #[test]
    fn frame_without_magic_is_rejected() {
        let m = Message::new_params("swarmd-1000", vec!["x".to_string()]);
        let body = bincode::serialize(&m).expect("serialize");
        assert!(Message::try_from_bytes(&body).is_err());
        assert!(Message::try_from_bytes(b"SW").is_err());
    }
}

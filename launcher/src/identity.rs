use std::fmt;

use sha2::{Digest, Sha256};

use crate::consts::APP_NAME;
use crate::paths::safe_for_filename;

/// Identity string that scopes single-instance detection to one user and
/// one configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApplicationId(String);

impl ApplicationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-user identifier: the real uid, which does not change between
/// invocations by the same OS user.
pub fn user_id_string() -> String {
    let uid = unsafe { libc::getuid() };
    uid.to_string()
}

pub fn derive(user_id: &str, configuration_name: &str) -> ApplicationId {
    if configuration_name.is_empty() {
        return ApplicationId(format!("{}-{}", APP_NAME, user_id));
    }
    // Sanitizing can map different names onto the same text ("a b" / "a_b"),
    // so a digest of the raw name keeps the ids apart.
    let digest = short_digest(configuration_name);
    ApplicationId(format!(
        "{}-{}-{}-{}",
        APP_NAME,
        user_id,
        safe_for_filename(configuration_name),
        digest
    ))
}

pub fn for_current_user(configuration_name: &str) -> ApplicationId {
    derive(&user_id_string(), configuration_name)
}

fn short_digest(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    let full = hex::encode(h.finalize());
    full[..8].to_string()
}

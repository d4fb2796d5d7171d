use std::path::PathBuf;

use crate::consts::{APP_DIR_NAME, HISTORY_FILE, LEGACY_PREFERENCES_FILE, PREFERENCES_FILE};
use crate::identity::ApplicationId;

/// Directory for per-session runtime files (instance locks, sockets).
pub fn runtime_dir() -> PathBuf {
    if let Ok(d) = std::env::var("XDG_RUNTIME_DIR") {
        let base = PathBuf::from(d);
        return base.join(APP_DIR_NAME);
    }
    let uid = unsafe { libc::geteuid() };
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR_NAME, uid))
}

/// Profile directory name: `swarmd` for the default configuration,
/// `swarmd_<name>` for a named one.
pub fn profile_dir_name(configuration_name: &str) -> String {
    if configuration_name.is_empty() {
        APP_DIR_NAME.to_string()
    } else {
        format!("{}_{}", APP_DIR_NAME, safe_for_filename(configuration_name))
    }
}

pub fn config_dir(configuration_name: &str) -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from(".config"));
    base.join(profile_dir_name(configuration_name))
}

pub fn data_dir(configuration_name: &str) -> PathBuf {
    let name = profile_dir_name(configuration_name);
    if let Ok(d) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(d).join(name);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/share").join(name);
    }
    PathBuf::from("/tmp").join(name)
}

pub fn preferences_path(configuration_name: &str) -> PathBuf {
    config_dir(configuration_name).join(PREFERENCES_FILE)
}

pub fn legacy_preferences_path(configuration_name: &str) -> PathBuf {
    config_dir(configuration_name).join(LEGACY_PREFERENCES_FILE)
}

pub fn history_path(configuration_name: &str) -> PathBuf {
    data_dir(configuration_name).join(HISTORY_FILE)
}

pub fn lock_path(app_id: &ApplicationId) -> PathBuf {
    runtime_dir().join(format!("{}.lock", app_id))
}

pub fn socket_path(app_id: &ApplicationId) -> PathBuf {
    runtime_dir().join(format!("{}.sock", app_id))
}

pub fn safe_for_filename(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}

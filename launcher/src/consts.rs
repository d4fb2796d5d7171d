pub const APP_NAME: &str = "swarmd";
pub const APP_DIR_NAME: &str = "swarmd";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Set to VERSION for child processes that want to know who launched them.
pub const VERSION_ENV_VAR: &str = "SWARMD";

pub const CONFIGURATION_FLAG: &str = "--configuration";

// Wait after finding the instance lock taken, so a launch that started at
// nearly the same moment has time to show up in the process table.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 300;

pub const PREFERENCES_FILE: &str = "preferences.toml";
pub const LEGACY_PREFERENCES_FILE: &str = "swarmd.conf";
pub const HISTORY_FILE: &str = "forwarded.jsonl";

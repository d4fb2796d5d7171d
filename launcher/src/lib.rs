// Startup supervisor for the `swarmd` binary: single-instance arbitration,
// parameter forwarding, daemonizing and signal handling around the engine.

pub mod cli;
pub mod consts;
pub mod daemon;
pub mod engine;
pub mod error;
pub mod forwarder;
pub mod history;
pub mod identity;
pub mod legal;
pub mod lifecycle;
pub mod listener;
pub mod lock;
pub mod matcher;
pub mod net;
pub mod paths;
pub mod prefs;
pub mod scanner;
pub mod signals;
pub mod supervisor;
pub mod ui;
pub mod upgrade;

use std::process::ExitCode;

use launcher::supervisor;

// No #[tokio::main]: daemonizing forks, so the runtime is built afterwards by
// the supervisor.
fn main() -> ExitCode {
    // Quiet by default; RUST_LOG=debug shows the detection and lock decisions.
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .try_init();

    // args_os: file names passed on the command line need not be UTF-8.
    supervisor::run(std::env::args_os().collect())
}

use anyhow::Context;
use std::ffi::OsString;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use crate::cli::{self, CommandLineParameters, Invocation};
use crate::consts::{APP_NAME, VERSION, VERSION_ENV_VAR};
use crate::daemon;
use crate::engine::{host_engine, Engine, EngineContext};
use crate::error::StartupError;
use crate::forwarder::{ParameterForwarder, SocketForwarder};
use crate::identity::{self, ApplicationId};
use crate::legal::{LegalAcceptanceGate, PromptContext};
use crate::lifecycle::{Lifecycle, Phase};
use crate::listener::InstanceListener;
use crate::lock::InstanceLock;
use crate::matcher::find_match;
use crate::paths;
use crate::prefs::{PreferenceStore, Preferences};
use crate::scanner::{ProcessScanner, SystemScanner};
use crate::signals;
use crate::ui;
use crate::upgrade;

/// What to do once detection has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// A matching instance runs: hand it our parameters and exit.
    Forward,
    /// A matching instance runs but forwarding is not wanted for this
    /// configuration: exit without starting a second engine.
    AlreadyRunning,
    /// Start our own engine.
    Proceed,
}

pub fn decide(matched: bool, params: &CommandLineParameters, forward_named: bool) -> Decision {
    if !matched {
        return Decision::Proceed;
    }
    if params.is_default_configuration() || forward_named {
        Decision::Forward
    } else {
        Decision::AlreadyRunning
    }
}

/// Scan and match. A failed scan counts as "no match": a redundant
/// instance is better than refusing to start.
pub fn detect(scanner: &dyn ProcessScanner, self_pid: u32, desired: &str) -> bool {
    match scanner.scan(self_pid) {
        Ok(candidates) => find_match(&candidates, desired),
        Err(e) => {
            log::warn!("detect: process scan failed, assuming no running instance: {e:#}");
            false
        }
    }
}

/// Outcome of the detection phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arbitration {
    Forwarded,
    AlreadyRunning,
    Proceed,
}

pub struct Arbiter<'a> {
    pub scanner: &'a dyn ProcessScanner,
    pub forwarder: &'a dyn ParameterForwarder,
    pub self_pid: u32,
    pub settle_delay: Duration,
    pub forward_named: bool,
}

impl Arbiter<'_> {
    /// Runs only when the instance lock is taken by somebody else. At most
    /// one forwarding attempt is made; its failure does not change the
    /// outcome.
    pub fn arbitrate(
        &self,
        lifecycle: &mut Lifecycle,
        app_id: &ApplicationId,
        params: &CommandLineParameters,
    ) -> anyhow::Result<Arbitration> {
        lifecycle.advance(Phase::Detecting)?;
        log::debug!(
            "{} is already running for this user ({}), checking configuration",
            APP_NAME,
            app_id
        );
        if !self.settle_delay.is_zero() {
            std::thread::sleep(self.settle_delay);
        }

        let matched = detect(self.scanner, self.self_pid, &params.configuration_name);
        match decide(matched, params, self.forward_named) {
            Decision::Forward => {
                lifecycle.advance(Phase::Forwarding)?;
                if let Err(e) = self.forwarder.forward(app_id, params.param_list()) {
                    log::warn!("forward: running instance did not take the parameters: {e:#}");
                }
                lifecycle.advance(Phase::Terminated)?;
                Ok(Arbitration::Forwarded)
            }
            Decision::AlreadyRunning => {
                log::info!(
                    "configuration {:?} is already running; not forwarding",
                    params.configuration_name
                );
                lifecycle.advance(Phase::Terminated)?;
                Ok(Arbitration::AlreadyRunning)
            }
            Decision::Proceed => {
                lifecycle.advance(Phase::Proceeding)?;
                Ok(Arbitration::Proceed)
            }
        }
    }
}

/// State carried from detection into the post-daemon phase. Holds no engine
/// state, so nothing is built twice when the process forks.
struct PreDaemon {
    app_id: ApplicationId,
    params: CommandLineParameters,
    lock: Option<InstanceLock>,
}

/// Process entry: parse, arbitrate, daemonize, run the engine.
pub fn run(args: Vec<OsString>) -> ExitCode {
    run_with_engine(args, host_engine)
}

pub fn run_with_engine<E>(args: Vec<OsString>, engine: E) -> ExitCode
where
    E: Engine,
{
    let mut lifecycle = Lifecycle::new();
    let result = startup(args, &mut lifecycle, engine);
    lifecycle.terminate();
    ExitCode::from(exit_status(&result))
}

/// 0 on every graceful path; 1 after reporting the failure.
pub fn exit_status(result: &anyhow::Result<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            report(e);
            1
        }
    }
}

fn report(e: &anyhow::Error) {
    match e.downcast_ref::<StartupError>() {
        Some(StartupError::CommandLine(msg)) => ui::display_bad_arg_message(msg),
        Some(other) => {
            log::error!("{other}");
            eprintln!("{other}");
        }
        None => {
            log::error!("{e:#}");
            eprintln!("{e:#}");
        }
    }
}

fn startup<E: Engine>(args: Vec<OsString>, lifecycle: &mut Lifecycle, engine: E) -> anyhow::Result<()> {
    let program = args
        .first()
        .map(|a| a.to_string_lossy().into_owned())
        .unwrap_or_else(|| APP_NAME.to_string());

    let params = match cli::parse(args)? {
        Invocation::ShowVersion => {
            ui::display_version();
            return Ok(());
        }
        Invocation::ShowHelp => {
            ui::display_usage(&program);
            return Ok(());
        }
        Invocation::Run(params) => params,
    };

    // Single-threaded at this point, nothing else reads the environment yet.
    std::env::set_var(VERSION_ENV_VAR, VERSION);

    let store = PreferenceStore::for_configuration(&params.configuration_name);
    let prompt_ctx = PromptContext::detect(params.should_daemonize);
    let gate = LegalAcceptanceGate::new(&store);
    let agreed = gate.check(prompt_ctx, || {
        ui::ask_legal_notice(&mut std::io::stdin().lock(), &mut std::io::stdout())
    })?;
    if !agreed {
        log::debug!("legal notice declined");
        return Ok(());
    }

    let prefs = match store.load() {
        Ok(p) => p,
        Err(e) => {
            log::warn!("using default preferences: {e:#}");
            Preferences::default()
        }
    };

    let app_id = identity::for_current_user(&params.configuration_name);
    let lock = match InstanceLock::try_acquire(&paths::lock_path(&app_id)) {
        Ok(lock) => lock,
        Err(e) => {
            log::warn!("instance lock unavailable, falling back to process scan: {e:#}");
            None
        }
    };

    if lock.is_none() {
        let scanner = match SystemScanner::for_current_exe() {
            Ok(s) => s,
            Err(e) => {
                log::warn!("cannot determine program name: {e:#}");
                SystemScanner::new(APP_NAME)
            }
        };
        let forwarder = SocketForwarder::new();
        let arbiter = Arbiter {
            scanner: &scanner,
            forwarder: &forwarder,
            self_pid: std::process::id(),
            settle_delay: Duration::from_millis(prefs.settle_delay_ms),
            forward_named: prefs.forward_named_configurations,
        };
        match arbiter.arbitrate(lifecycle, &app_id, &params)? {
            Arbitration::Forwarded | Arbitration::AlreadyRunning => return Ok(()),
            Arbitration::Proceed => {}
        }
    } else {
        lifecycle.advance(Phase::Detecting)?;
        lifecycle.advance(Phase::Proceeding)?;
    }

    upgrade::run(
        &store,
        &paths::legacy_preferences_path(&params.configuration_name),
        !prompt_ctx.is_headless(),
    )
    .map_err(StartupError::Upgrade)?;

    #[cfg(feature = "interactive-ui")]
    if !(params.no_splash || prefs.splash_disabled) {
        ui::show_splash();
    }

    let pre = PreDaemon {
        app_id,
        params,
        lock,
    };
    let pre = if pre.params.should_daemonize {
        lifecycle.advance(Phase::Daemonizing)?;
        into_daemon(pre)?
    } else {
        pre
    };

    post_daemon(pre, lifecycle, engine)
}

// Release the slot, detach, then take the slot again in the child. If
// someone else got it in between, give up rather than forward.
fn into_daemon(pre: PreDaemon) -> anyhow::Result<PreDaemon> {
    let PreDaemon {
        app_id,
        params,
        lock,
    } = pre;
    drop(lock);

    daemon::daemonize().map_err(StartupError::Daemonize)?;

    let lock = reacquire_after_fork(&paths::lock_path(&app_id))?;
    Ok(PreDaemon {
        app_id,
        params,
        lock,
    })
}

/// The detached child takes the slot back. A holder appearing in the
/// meantime is a race we lose: no forwarding, no second registration.
fn reacquire_after_fork(lock_path: &Path) -> anyhow::Result<Option<InstanceLock>> {
    match InstanceLock::try_acquire(lock_path) {
        Ok(Some(lock)) => Ok(Some(lock)),
        Ok(None) => Err(StartupError::DaemonRace.into()),
        Err(e) => {
            log::warn!("instance lock unavailable after daemonizing: {e:#}");
            Ok(None)
        }
    }
}

fn post_daemon<E: Engine>(pre: PreDaemon, lifecycle: &mut Lifecycle, engine: E) -> anyhow::Result<()> {
    let PreDaemon {
        app_id,
        params,
        lock,
    } = pre;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build runtime")?;

    let result = rt.block_on(async {
        // Only the slot owner serves the forwarding socket.
        let listener = match &lock {
            Some(_) => match InstanceListener::bind(&paths::socket_path(&app_id)) {
                Ok(l) => Some(l),
                Err(e) => {
                    log::warn!("parameter forwarding disabled: {e:#}");
                    None
                }
            },
            None => None,
        };

        lifecycle.advance(Phase::Running)?;
        let shutdown = signals::install().context("install signal handlers")?;

        let ctx = EngineContext {
            app_id: app_id.clone(),
            history_path: paths::history_path(&params.configuration_name),
            params,
            listener,
            shutdown: shutdown.clone(),
        };
        let res = engine.run(ctx).await;
        if shutdown.is_requested() {
            lifecycle.advance(Phase::ShuttingDown)?;
        }
        res
    });

    drop(lock);
    rt.shutdown_timeout(Duration::from_secs(1));
    result
}

//! Termination and fault signal handling.
//!
//! Handlers only use async-signal-safe calls: `write(2)` to stderr, atomic
//! stores, a one-byte `write(2)` to a self-pipe, `signal(2)` and `raise(3)`.
//! Actual teardown happens on the engine side, which observes the
//! [`ShutdownSignal`] fed by the self-pipe watcher thread.

use anyhow::Context;
use libc::c_int;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::OnceLock;
use tokio::sync::watch;

static SIGNAL_NAMES: &[(c_int, &str)] = &[
    (libc::SIGHUP, "SIGHUP"),
    (libc::SIGINT, "SIGINT"),
    (libc::SIGQUIT, "SIGQUIT"),
    (libc::SIGILL, "SIGILL"),
    (libc::SIGTRAP, "SIGTRAP"),
    (libc::SIGABRT, "SIGABRT"),
    (libc::SIGBUS, "SIGBUS"),
    (libc::SIGFPE, "SIGFPE"),
    (libc::SIGKILL, "SIGKILL"),
    (libc::SIGUSR1, "SIGUSR1"),
    (libc::SIGSEGV, "SIGSEGV"),
    (libc::SIGUSR2, "SIGUSR2"),
    (libc::SIGPIPE, "SIGPIPE"),
    (libc::SIGALRM, "SIGALRM"),
    (libc::SIGTERM, "SIGTERM"),
    (libc::SIGCHLD, "SIGCHLD"),
    (libc::SIGCONT, "SIGCONT"),
    (libc::SIGSTOP, "SIGSTOP"),
    (libc::SIGTSTP, "SIGTSTP"),
    (libc::SIGTTIN, "SIGTTIN"),
    (libc::SIGTTOU, "SIGTTOU"),
    (libc::SIGURG, "SIGURG"),
    (libc::SIGXCPU, "SIGXCPU"),
    (libc::SIGXFSZ, "SIGXFSZ"),
    (libc::SIGVTALRM, "SIGVTALRM"),
    (libc::SIGPROF, "SIGPROF"),
    (libc::SIGWINCH, "SIGWINCH"),
    (libc::SIGIO, "SIGIO"),
    (libc::SIGSYS, "SIGSYS"),
];

#[cfg(any(target_os = "linux", target_os = "android"))]
static PLATFORM_SIGNAL_NAMES: &[(c_int, &str)] = &[
    (libc::SIGSTKFLT, "SIGSTKFLT"),
    (libc::SIGPWR, "SIGPWR"),
];

#[cfg(not(any(target_os = "linux", target_os = "android")))]
static PLATFORM_SIGNAL_NAMES: &[(c_int, &str)] = &[];

const UNKNOWN_SIGNAL: &str = "SIG?";

const EXIT_NOTICE_PREFIX: &[u8] = b"Catching signal: ";
const EXIT_NOTICE_SUFFIX: &[u8] = b"\nExiting cleanly\n";

#[cfg(feature = "stacktrace")]
const CRASH_BANNER: &str = concat!(
    "\n\n*************************************************************\n",
    "Please file a bug report and provide the following information:\n\n",
    "swarmd version: ",
    env!("CARGO_PKG_VERSION"),
    "\n\n",
    "Caught signal: "
);

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);
static LAST_SIGNAL: AtomicI32 = AtomicI32::new(0);
static WAKE_FD: AtomicI32 = AtomicI32::new(-1);
#[cfg(feature = "stacktrace")]
static IN_FAULT: AtomicBool = AtomicBool::new(false);

static SHUTDOWN_TX: OnceLock<watch::Sender<bool>> = OnceLock::new();

/// Symbolic name of `signum`. Allocation-free, usable inside handlers.
pub fn signal_name(signum: c_int) -> &'static str {
    for &(n, name) in SIGNAL_NAMES.iter().chain(PLATFORM_SIGNAL_NAMES.iter()) {
        if n == signum {
            return name;
        }
    }
    UNKNOWN_SIGNAL
}

/// Write to stderr, falling back to stdout on a short write.
fn report_to_user(bytes: &[u8]) {
    unsafe {
        let n = libc::write(
            libc::STDERR_FILENO,
            bytes.as_ptr() as *const libc::c_void,
            bytes.len(),
        );
        if n < bytes.len() as isize {
            let _ = libc::write(
                libc::STDOUT_FILENO,
                bytes.as_ptr() as *const libc::c_void,
                bytes.len(),
            );
        }
    }
}

extern "C" fn on_termination(signum: c_int) {
    report_to_user(EXIT_NOTICE_PREFIX);
    report_to_user(signal_name(signum).as_bytes());
    report_to_user(EXIT_NOTICE_SUFFIX);

    LAST_SIGNAL.store(signum, Ordering::SeqCst);
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);

    let fd = WAKE_FD.load(Ordering::SeqCst);
    if fd >= 0 {
        let b = [1u8];
        unsafe {
            let _ = libc::write(fd, b.as_ptr() as *const libc::c_void, 1);
        }
    }

    // A second delivery of the same signal gets the OS default (terminate).
    unsafe {
        libc::signal(signum, libc::SIG_DFL);
    }
}

#[cfg(feature = "stacktrace")]
extern "C" fn on_fault(signum: c_int) {
    report_to_user(CRASH_BANNER.as_bytes());
    report_to_user(signal_name(signum).as_bytes());
    report_to_user(b"\n");

    // Capturing allocates and may fault again; the guard makes sure a nested
    // fault goes straight to the default action instead of recursing.
    if !IN_FAULT.swap(true, Ordering::SeqCst) {
        print_stacktrace();
    }

    unsafe {
        libc::signal(signum, libc::SIG_DFL);
        libc::raise(signum);
    }
}

#[cfg(feature = "stacktrace")]
fn print_stacktrace() {
    let bt = std::backtrace::Backtrace::force_capture();
    let text = format!("{bt}\n");
    report_to_user(text.as_bytes());
}

fn install_handler(signum: c_int, handler: extern "C" fn(c_int), flags: c_int) -> std::io::Result<()> {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = handler as libc::sighandler_t;
        libc::sigemptyset(&mut sa.sa_mask);
        sa.sa_flags = flags;
        if libc::sigaction(signum, &sa, std::ptr::null_mut()) != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

fn set_fd_flags(fd: c_int, nonblock: bool) -> std::io::Result<()> {
    unsafe {
        if libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) != 0 {
            return Err(std::io::Error::last_os_error());
        }
        if nonblock {
            let fl = libc::fcntl(fd, libc::F_GETFL);
            if fl < 0 || libc::fcntl(fd, libc::F_SETFL, fl | libc::O_NONBLOCK) != 0 {
                return Err(std::io::Error::last_os_error());
            }
        }
    }
    Ok(())
}

// Self-pipe plus a thread that turns the first byte into a watch update.
fn start_wake_pipe() -> anyhow::Result<watch::Sender<bool>> {
    let mut fds = [0 as c_int; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(std::io::Error::last_os_error()).context("create signal pipe");
    }
    let (read_fd, write_fd) = (fds[0], fds[1]);
    set_fd_flags(read_fd, false).context("configure signal pipe")?;
    // The handler must never block on a full pipe.
    set_fd_flags(write_fd, true).context("configure signal pipe")?;

    let (tx, _) = watch::channel(false);
    let thread_tx = tx.clone();
    std::thread::Builder::new()
        .name("signal-watch".to_string())
        .spawn(move || {
            let mut b = [0u8; 1];
            loop {
                let n = unsafe { libc::read(read_fd, b.as_mut_ptr() as *mut libc::c_void, 1) };
                if n == 1 {
                    log::info!("signals: shutdown requested by {}", signal_name(last_signal()));
                    thread_tx.send_replace(true);
                    return;
                }
                if n < 0 && std::io::Error::last_os_error().kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return;
            }
        })
        .context("spawn signal watcher")?;

    WAKE_FD.store(write_fd, Ordering::SeqCst);
    Ok(tx)
}

/// Install the termination handlers (and, with crash reporting, the fault
/// handlers). Safe to call more than once; the wake pipe is created once.
pub fn install() -> anyhow::Result<ShutdownSignal> {
    let tx = match SHUTDOWN_TX.get() {
        Some(tx) => tx,
        None => {
            let tx = start_wake_pipe()?;
            SHUTDOWN_TX.get_or_init(|| tx)
        }
    };

    for sig in [libc::SIGINT, libc::SIGTERM] {
        install_handler(sig, on_termination, libc::SA_RESTART)
            .with_context(|| format!("install {} handler", signal_name(sig)))?;
    }
    #[cfg(feature = "stacktrace")]
    for sig in [libc::SIGABRT, libc::SIGSEGV] {
        install_handler(sig, on_fault, libc::SA_ONSTACK)
            .with_context(|| format!("install {} handler", signal_name(sig)))?;
    }
    log::debug!("signals: handlers installed");

    Ok(ShutdownSignal {
        rx: tx.subscribe(),
    })
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

pub fn last_signal() -> c_int {
    LAST_SIGNAL.load(Ordering::SeqCst)
}

/// Cooperative shutdown notification observed by the engine.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// A signal driven by hand (tests, embedding).
    pub fn manual() -> (watch::Sender<bool>, ShutdownSignal) {
        let (tx, rx) = watch::channel(false);
        (tx, ShutdownSignal { rx })
    }

    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    pub fn receiver(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }

    /// Resolves once shutdown was requested. If every sender is gone the
    /// request can never come, so this then waits forever.
    pub async fn requested(&mut self) {
        if !wait_until_set(&mut self.rx).await {
            std::future::pending::<()>().await;
        }
    }
}

/// Wait for the flag to become true. `false` means the sender was dropped
/// before that happened.
pub async fn wait_until_set(rx: &mut watch::Receiver<bool>) -> bool {
    loop {
        let set = *rx.borrow_and_update();
        if set {
            return true;
        }
        if rx.changed().await.is_err() {
            return false;
        }
    }
}

use std::os::unix::io::RawFd;

pub fn is_terminal(fd: RawFd) -> bool {
    unsafe { libc::isatty(fd) == 1 }
}

/// Detach from the controlling terminal: fork, the parent exits, the child
/// starts a new session with stdio on /dev/null. The working directory is
/// kept so relative torrent paths stay valid.
///
/// Must run before any thread (in particular the tokio runtime) is started.
pub fn daemonize() -> std::io::Result<()> {
    let rc = unsafe { libc::daemon(1, 0) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

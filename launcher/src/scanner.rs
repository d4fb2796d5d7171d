use anyhow::Context;
use std::ffi::{OsStr, OsString};
use std::path::Path;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

/// Joins argv entries inside `ProcessDescriptor::command_line`.
pub const ARG_SEPARATOR: char = '\0';

// Linux keeps at most 15 bytes of the executable name in the task comm.
const KERNEL_NAME_MAX: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessDescriptor {
    pub pid: u32,
    /// argv joined with `ARG_SEPARATOR`; empty when the OS does not expose it
    /// (e.g. processes of another user).
    pub command_line: String,
}

pub trait ProcessScanner {
    /// All processes running this program, except `self_pid`.
    fn scan(&self, self_pid: u32) -> anyhow::Result<Vec<ProcessDescriptor>>;
}

/// Reads the OS process table.
pub struct SystemScanner {
    program: String,
}

impl SystemScanner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn for_current_exe() -> anyhow::Result<Self> {
        let exe = std::env::current_exe().context("current_exe")?;
        let name = exe
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow::anyhow!("executable has no usable file name: {}", exe.display()))?;
        Ok(Self::new(name))
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl ProcessScanner for SystemScanner {
    fn scan(&self, self_pid: u32) -> anyhow::Result<Vec<ProcessDescriptor>> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            anyhow::bail!("process enumeration is not supported on this platform");
        }

        let mut sys = System::new();
        let n = sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_cmd(UpdateKind::Always)
                .with_exe(UpdateKind::Always),
        );
        if n == 0 {
            anyhow::bail!("process table is empty (no permission to read it?)");
        }

        let mut out: Vec<ProcessDescriptor> = Vec::new();
        for (pid, p) in sys.processes() {
            let pid = pid.as_u32();
            if pid == self_pid {
                continue;
            }
            // Linux lists userland threads as processes too.
            if p.thread_kind().is_some() {
                continue;
            }
            if !is_same_program(&self.program, p.name(), p.exe(), p.cmd()) {
                continue;
            }
            out.push(ProcessDescriptor {
                pid,
                command_line: join_args(p.cmd()),
            });
        }
        out.sort_by_key(|d| d.pid);
        log::debug!(
            "scan: program={} candidates={:?}",
            self.program,
            out.iter().map(|d| d.pid).collect::<Vec<_>>()
        );
        Ok(out)
    }
}

pub fn join_args(args: &[OsString]) -> String {
    let parts: Vec<String> = args
        .iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    parts.join(&ARG_SEPARATOR.to_string())
}

fn base_name(s: &OsStr) -> Option<&OsStr> {
    Path::new(s).file_name()
}

pub fn is_same_program(
    program: &str,
    name: &OsStr,
    exe: Option<&Path>,
    cmd: &[OsString],
) -> bool {
    let program_os = OsStr::new(program);
    if exe.and_then(|e| e.file_name()) == Some(program_os) {
        return true;
    }
    if let Some(first) = cmd.first() {
        if base_name(first) == Some(program_os) {
            return true;
        }
    }
    let name = name.to_string_lossy();
    if name == program {
        return true;
    }
    name.len() == KERNEL_NAME_MAX && program.starts_with(&*name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use std::time::Duration;

    fn os(v: &[&str]) -> Vec<OsString> {
        v.iter().map(OsString::from).collect()
    }

    #[test]
    fn program_matching_sources() {
        let none: &[OsString] = &[];
        assert!(is_same_program(
            "swarmd",
            OsStr::new("other"),
            Some(Path::new("/usr/bin/swarmd")),
            none
        ));
        assert!(is_same_program(
            "swarmd",
            OsStr::new("other"),
            None,
            &os(&["./target/debug/swarmd", "-d"])
        ));
        assert!(is_same_program("swarmd", OsStr::new("swarmd"), None, none));
        assert!(!is_same_program(
            "swarmd",
            OsStr::new("swarmd-helper"),
            Some(Path::new("/usr/bin/swarmd-helper")),
            &os(&["swarmd-helper"])
        ));
    }

    #[test]
    fn truncated_kernel_name_still_matches() {
        let none: &[OsString] = &[];
        assert!(is_same_program(
            "swarmd-long-program-name",
            OsStr::new("swarmd-long-pro"),
            None,
            none
        ));
        assert!(!is_same_program("swarmd", OsStr::new("swar"), None, none));
    }

    #[test]
    fn join_keeps_argument_boundaries() {
        assert_eq!(join_args(&os(&["a", "b c", ""])), "a\0b c\0");
        assert_eq!(join_args(&[]), "");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn scan_finds_peers_and_skips_self() {
        let mut child = Command::new("sleep").arg("7").spawn().expect("spawn sleep");
        // Give the kernel a moment to publish the new argv.
        std::thread::sleep(Duration::from_millis(100));
        let child_pid = child.id();

        let scanner = SystemScanner::new("sleep");
        let seen = scanner.scan(std::process::id()).expect("scan");
        let entry = seen.iter().find(|d| d.pid == child_pid);
        assert!(entry.is_some(), "child {child_pid} not in {seen:?}");
        assert!(entry.unwrap().command_line.ends_with("\x007"));

        let seen = scanner.scan(child_pid).expect("scan");
        assert!(seen.iter().all(|d| d.pid != child_pid));

        let _ = child.kill();
        let _ = child.wait();
    }

    #[test]
    fn scan_never_reports_the_caller() {
        let scanner = SystemScanner::for_current_exe().expect("scanner");
        let seen = scanner.scan(std::process::id()).expect("scan");
        assert!(seen.iter().all(|d| d.pid != std::process::id()));
    }
}

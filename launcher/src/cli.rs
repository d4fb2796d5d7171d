use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::Parser;
use std::ffi::OsString;

use crate::error::StartupError;

// Help and version are plain flags: clap's built-in ones would print and exit
// even when combined with other arguments.
#[derive(Parser, Debug)]
#[command(name = "swarmd", disable_help_flag = true, disable_version_flag = true)]
struct Cli {
    #[arg(short = 'v', long = "version")]
    version: bool,

    #[arg(short = 'h', long = "help")]
    help: bool,

    /// Run under a separate profile that may coexist with the default one.
    #[arg(long = "configuration", value_name = "name")]
    configuration: Option<String>,

    /// Detach from the terminal and run in the background.
    #[cfg(not(feature = "interactive-ui"))]
    #[arg(short = 'd', long = "daemon")]
    daemon: bool,

    /// Skip the splash banner.
    #[cfg(feature = "interactive-ui")]
    #[arg(long = "no-splash")]
    no_splash: bool,

    /// Torrent files, URLs or magnet links. File names need not be UTF-8.
    #[arg(value_name = "files or URLs")]
    params: Vec<OsString>,
}

impl Cli {
    // Anything besides -v/-h themselves. Bundled short flags (`-vh`, `-vd`)
    // arrive as a single argv entry, so counting argv is not enough.
    fn has_other_than(&self, version: bool, help: bool) -> bool {
        #[cfg(not(feature = "interactive-ui"))]
        let mode_flag = self.daemon;
        #[cfg(feature = "interactive-ui")]
        let mode_flag = self.no_splash;

        (self.version && !version)
            || (self.help && !help)
            || self.configuration.is_some()
            || mode_flag
            || !self.params.is_empty()
    }
}

/// The parsed invocation of the current process. Never mutated after parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLineParameters {
    pub configuration_name: String,
    pub should_daemonize: bool,
    pub no_splash: bool,
    pub params: Vec<String>,
}

impl CommandLineParameters {
    /// What gets forwarded to a running instance or handed to the engine.
    pub fn param_list(&self) -> Vec<String> {
        self.params.clone()
    }

    pub fn is_default_configuration(&self) -> bool {
        self.configuration_name.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    ShowVersion,
    ShowHelp,
    Run(CommandLineParameters),
}

/// Parse `args` (including the program name in position 0).
pub fn parse<I, T>(args: I) -> Result<Invocation, StartupError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    let is_one_arg = args.len() == 2;

    let cli = Cli::try_parse_from(&args).map_err(bad_arg_from_clap)?;

    if cli.version {
        if is_one_arg && !cli.has_other_than(true, false) {
            return Ok(Invocation::ShowVersion);
        }
        return Err(must_be_single("-v (or --version)"));
    }
    if cli.help {
        if is_one_arg && !cli.has_other_than(false, true) {
            return Ok(Invocation::ShowHelp);
        }
        return Err(must_be_single("-h (or --help)"));
    }

    let configuration_name = match cli.configuration.as_deref() {
        Some(v) => normalize_configuration_name(v)?,
        None => String::new(),
    };

    #[cfg(not(feature = "interactive-ui"))]
    let (should_daemonize, no_splash) = (cli.daemon, false);
    #[cfg(feature = "interactive-ui")]
    let (should_daemonize, no_splash) = (false, cli.no_splash);

    Ok(Invocation::Run(CommandLineParameters {
        configuration_name,
        should_daemonize,
        no_splash,
        params: cli.params.iter().map(|p| param_to_string(p)).collect(),
    }))
}

// Parameters travel as UTF-8 strings; undecodable bytes become U+FFFD.
fn param_to_string(p: &OsString) -> String {
    match p.to_str() {
        Some(s) => s.to_string(),
        None => {
            let lossy = p.to_string_lossy().into_owned();
            log::warn!("parameter is not valid UTF-8, passing it on as {lossy:?}");
            lossy
        }
    }
}

/// Unwrap a configuration value passed with literal double quotes
/// (`--configuration="\"work\""`). A lone opening quote is an error.
pub fn normalize_configuration_name(value: &str) -> Result<String, StartupError> {
    let Some(rest) = value.strip_prefix('"') else {
        return Ok(value.to_string());
    };
    match rest.strip_suffix('"') {
        Some(inner) => Ok(inner.to_string()),
        None => Err(StartupError::command_line(
            "configuration name must be enclosed in double quotes",
        )),
    }
}

fn must_be_single(flag: &str) -> StartupError {
    StartupError::command_line(format!("{flag} must be the single command line parameter."))
}

fn bad_arg_from_clap(e: clap::Error) -> StartupError {
    if e.kind() == ErrorKind::UnknownArgument {
        if let Some(ContextValue::String(arg)) = e.get(ContextKind::InvalidArg) {
            return StartupError::command_line(format!(
                "{arg} is an unknown command line parameter."
            ));
        }
    }
    let rendered = e.to_string();
    let first = rendered.lines().next().unwrap_or("").trim();
    let msg = first.strip_prefix("error: ").unwrap_or(first);
    StartupError::command_line(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_params(args: &[&str]) -> CommandLineParameters {
        match parse(args.iter().copied()).expect("parse") {
            Invocation::Run(p) => p,
            other => panic!("expected Run, got {other:?}"),
        }
    }

    fn bad_arg(args: &[&str]) -> String {
        match parse(args.iter().copied()) {
            Err(StartupError::CommandLine(msg)) => msg,
            other => panic!("expected command line error, got {other:?}"),
        }
    }

    #[test]
    fn version_and_help_alone() {
        assert_eq!(parse(["swarmd", "-v"]).unwrap(), Invocation::ShowVersion);
        assert_eq!(parse(["swarmd", "--version"]).unwrap(), Invocation::ShowVersion);
        assert_eq!(parse(["swarmd", "-h"]).unwrap(), Invocation::ShowHelp);
        assert_eq!(parse(["swarmd", "--help"]).unwrap(), Invocation::ShowHelp);
    }

    #[test]
    fn version_or_help_with_anything_else_is_rejected() {
        let msg = bad_arg(&["swarmd", "-v", "-h"]);
        assert!(msg.contains("must be the single command line parameter"), "{msg}");
        let msg = bad_arg(&["swarmd", "--help", "a.torrent"]);
        assert!(msg.contains("-h (or --help)"), "{msg}");
        let msg = bad_arg(&["swarmd", "--configuration=work", "--version"]);
        assert!(msg.contains("-v (or --version)"), "{msg}");
    }

    #[test]
    fn bundled_short_flags_count_as_extra_arguments() {
        let msg = bad_arg(&["swarmd", "-vh"]);
        assert!(msg.contains("-v (or --version)"), "{msg}");
        let msg = bad_arg(&["swarmd", "-hv"]);
        assert!(msg.contains("must be the single command line parameter"), "{msg}");
        #[cfg(not(feature = "interactive-ui"))]
        {
            let msg = bad_arg(&["swarmd", "-vd"]);
            assert!(msg.contains("-v (or --version)"), "{msg}");
            let msg = bad_arg(&["swarmd", "-dh"]);
            assert!(msg.contains("-h (or --help)"), "{msg}");
        }
    }

    #[test]
    fn non_utf8_file_names_are_accepted() {
        use std::os::unix::ffi::OsStringExt;

        let name = OsString::from_vec(b"caf\xe9.torrent".to_vec());
        let p = match parse([OsString::from("swarmd"), name]).unwrap() {
            Invocation::Run(p) => p,
            other => panic!("expected Run, got {other:?}"),
        };
        assert_eq!(p.param_list(), vec!["caf\u{FFFD}.torrent"]);
    }

    #[test]
    fn unknown_flag_is_reported_by_name() {
        let msg = bad_arg(&["swarmd", "--random-parameter"]);
        assert_eq!(msg, "--random-parameter is an unknown command line parameter.");
    }

    #[test]
    fn configuration_forms() {
        assert_eq!(run_params(&["swarmd"]).configuration_name, "");
        assert_eq!(
            run_params(&["swarmd", "--configuration=work"]).configuration_name,
            "work"
        );
        assert_eq!(
            run_params(&["swarmd", "--configuration", "home"]).configuration_name,
            "home"
        );
        assert_eq!(
            run_params(&["swarmd", "--configuration=\"my profile\""]).configuration_name,
            "my profile"
        );
        let msg = bad_arg(&["swarmd", "--configuration=\"broken"]);
        assert!(msg.contains("double quotes"), "{msg}");
    }

    #[test]
    fn positional_params_are_kept_in_order() {
        let p = run_params(&["swarmd", "b.torrent", "magnet:?xt=urn:btih:00", "a.torrent"]);
        assert_eq!(
            p.param_list(),
            vec!["b.torrent", "magnet:?xt=urn:btih:00", "a.torrent"]
        );
        assert!(p.is_default_configuration());
    }

    #[cfg(not(feature = "interactive-ui"))]
    #[test]
    fn daemon_flag() {
        assert!(run_params(&["swarmd", "-d"]).should_daemonize);
        assert!(run_params(&["swarmd", "--daemon", "--configuration=x"]).should_daemonize);
        assert!(!run_params(&["swarmd"]).should_daemonize);
        let msg = bad_arg(&["swarmd", "--no-splash"]);
        assert!(msg.contains("unknown command line parameter"), "{msg}");
    }

    #[cfg(feature = "interactive-ui")]
    #[test]
    fn no_splash_flag() {
        assert!(run_params(&["swarmd", "--no-splash"]).no_splash);
        let msg = bad_arg(&["swarmd", "--daemon"]);
        assert!(msg.contains("unknown command line parameter"), "{msg}");
    }
}

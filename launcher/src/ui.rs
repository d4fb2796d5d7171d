use std::io::{self, Read, Write};

use crate::consts::{APP_NAME, VERSION};

pub fn version_line() -> String {
    format!("{} {}", APP_NAME, VERSION)
}

pub fn display_version() {
    println!("{}", version_line());
}

pub fn usage(program: &str) -> String {
    let mut s = String::new();
    s.push_str("Usage:\n");
    s.push_str(&format!("    {program} [options] [(<filename> | <url>)...]\n"));
    s.push_str("Options:\n");
    s.push_str("    -v | --version             Display program version and exit\n");
    s.push_str("    -h | --help                Display this help message and exit\n");
    s.push_str("    --configuration=<name>     Store configuration files in <dir>_<name>\n");
    s.push_str("                               and run alongside other configurations\n");
    #[cfg(not(feature = "interactive-ui"))]
    s.push_str("    -d | --daemon              Run in daemon-mode (background)\n");
    #[cfg(feature = "interactive-ui")]
    s.push_str("    --no-splash                Disable splash screen\n");
    s.push_str("    files or URLs              Downloads the torrents passed by the user\n");
    s.push_str("\nFiles or URLs given while an instance of the same configuration runs\n");
    s.push_str("are handed over to that instance.\n");
    s
}

pub fn display_usage(program: &str) {
    print!("{}", usage(program));
}

pub fn bad_arg_message(message: &str) -> String {
    format!(
        "Bad command line: \n{}\nRun application with -h option to read about command line parameters.\n",
        message
    )
}

pub fn display_bad_arg_message(message: &str) {
    eprint!("{}", bad_arg_message(message));
}

pub const LEGAL_NOTICE: &str = "swarmd is a file sharing program. When you run a torrent, its data \
will be made available to others by means of upload. Any content you share is your sole \
responsibility.";

/// Print the legal notice to `out` and read a single key from `input`;
/// `y`/`Y` accepts.
pub fn ask_legal_notice<R: Read, W: Write>(input: &mut R, out: &mut W) -> io::Result<bool> {
    write!(
        out,
        "\n*** Legal Notice ***\n{}\n\nNo further notices will be issued.\n\nPress 'y' key to accept and continue...\n",
        LEGAL_NOTICE
    )?;
    out.flush()?;

    let mut key = [0u8; 1];
    let n = input.read(&mut key)?;
    Ok(n == 1 && (key[0] == b'y' || key[0] == b'Y'))
}

/// Console stand-in for the splash screen: a one-line banner on stderr.
#[cfg(feature = "interactive-ui")]
pub fn show_splash() {
    eprintln!("{} starting...", version_line());
}

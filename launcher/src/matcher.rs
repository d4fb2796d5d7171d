use crate::consts::CONFIGURATION_FLAG;
use crate::scanner::{ProcessDescriptor, ARG_SEPARATOR};

/// Configuration a peer process was started with, as far as its command line
/// tells. No marker (or no readable command line) means the default
/// configuration, i.e. the empty string.
pub fn extract_configuration(command_line: &str) -> String {
    let args: Vec<&str> = command_line.split(ARG_SEPARATOR).collect();
    let mut offset = 0usize;
    for (i, arg) in args.iter().enumerate() {
        let value_start = if let Some(rest) = arg.strip_prefix(CONFIGURATION_FLAG) {
            if rest.starts_with('=') {
                Some(offset + CONFIGURATION_FLAG.len() + 1)
            } else if rest.is_empty() && i + 1 < args.len() {
                // `--configuration <name>`: the value is the next argument.
                Some(offset + arg.len() + ARG_SEPARATOR.len_utf8())
            } else {
                None
            }
        } else {
            None
        };

        if let Some(start) = value_start {
            return read_value(&command_line[start..]);
        }
        offset += arg.len() + ARG_SEPARATOR.len_utf8();
    }
    String::new()
}

// A quoted value runs to the closing quote and may span separators; an
// unquoted one ends at the next argument boundary.
fn read_value(tail: &str) -> String {
    if let Some(quoted) = tail.strip_prefix('"') {
        let end = quoted.find('"').unwrap_or(quoted.len());
        let raw = &quoted[..end];
        return raw.replace(ARG_SEPARATOR, " ");
    }
    let end = tail.find(ARG_SEPARATOR).unwrap_or(tail.len());
    tail[..end].to_string()
}

/// Whether any candidate runs the `desired` configuration.
///
/// Candidates whose command line could not be read count as default
/// configuration instances: they only match when `desired` is empty, so two
/// unnamed instances are never started side by side.
pub fn find_match(candidates: &[ProcessDescriptor], desired: &str) -> bool {
    candidates.iter().any(|c| {
        let found = extract_configuration(&c.command_line);
        if found == desired {
            log::debug!(
                "matcher: pid={} runs configuration {:?}",
                c.pid,
                desired
            );
            true
        } else {
            false
        }
    })
}

//! Process lifecycle glue: pid file (spec.md §6 "Process writes its PID
//! to the configured path at start").

use std::path::Path;

/// Write the current process's PID to `path`, truncating any prior file.
pub fn write_pid_file(path: &Path) -> std::io::Result<()> {
    std::fs::write(path, std::process::id().to_string())
}

//! Liveness probe support
//!
//! Scans a procfs tree for a process whose command name or any argument
//! contains the given name (case-insensitive). Probe executables (names
//! ending in `-probe`) never count, neither as the process itself nor as an
//! argument of a wrapper such as `sh -c`.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::Result;

/// Default procfs mount point
pub const PROC_ROOT: &str = "/proc";

const PROBE_SUFFIX: &str = "-probe";

/// A process matching the probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessMatch {
    pub pid: u32,
    pub comm: String,
}

/// First process under `root` matching `name`, skipping `exclude_pid`
///
/// Processes that vanish or cannot be read while scanning are skipped.
pub fn scan_proc(root: &Path, name: &str, exclude_pid: Option<u32>) -> Result<Option<ProcessMatch>> {
    let needle = name.to_lowercase();

    for entry in fs::read_dir(root)? {
        let Ok(entry) = entry else { continue };
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        if Some(pid) == exclude_pid {
            continue;
        }

        let dir = entry.path();
        let comm = match fs::read_to_string(dir.join("comm")) {
            Ok(comm) => comm.trim_end().to_string(),
            Err(e) => {
                debug!("Skipping pid {}: {}", pid, e);
                continue;
            }
        };
        let args = read_cmdline(&dir.join("cmdline"));
        if args.first().is_some_and(|arg0| is_probe(arg0)) {
            debug!("Skipping probe process {}", pid);
            continue;
        }

        if comm.to_lowercase().contains(&needle) {
            return Ok(Some(ProcessMatch { pid, comm }));
        }
        let matched = args
            .iter()
            .filter(|arg| !is_probe(arg))
            .any(|arg| arg.to_lowercase().contains(&needle));
        if matched {
            return Ok(Some(ProcessMatch { pid, comm }));
        }
    }

    Ok(None)
}

/// Arguments of a process; empty when unreadable (kernel threads, exited)
fn read_cmdline(path: &Path) -> Vec<String> {
    let Ok(raw) = fs::read(path) else {
        return Vec::new();
    };
    raw.split(|b| *b == 0)
        .filter(|arg| !arg.is_empty())
        .map(|arg| String::from_utf8_lossy(arg).into_owned())
        .collect()
}

fn is_probe(arg: &str) -> bool {
    Path::new(arg)
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.to_lowercase().ends_with(PROBE_SUFFIX))
}

/// Whether a process other than this one matches `name`
pub fn is_process_running(name: &str) -> Result<Option<ProcessMatch>> {
    scan_proc(Path::new(PROC_ROOT), name, Some(std::process::id()))
}

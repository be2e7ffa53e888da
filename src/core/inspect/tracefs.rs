//! # Tracefs
//!
//! Module providing access to the kernel tracing filesystem: tracepoint
//! events, their format descriptions and the attachable kernel functions.

use std::{fs, path::Path};

use anyhow::{anyhow, Result};
use nix::{dir::Dir, fcntl::OFlag, sys::stat::Mode};

/// List the entries of a directory, including `.` and `..`. Callers filter
/// out what they do not care about. Unreadable directories yield an empty
/// list.
pub(crate) fn list_dir(path: &Path) -> Vec<String> {
    let mut dir = match Dir::open(path, OFlag::O_RDONLY | OFlag::O_DIRECTORY, Mode::empty()) {
        Ok(dir) => dir,
        Err(_) => return Vec::new(),
    };

    dir.iter()
        .filter_map(|entry| match entry {
            Ok(entry) => entry.file_name().to_str().ok().map(String::from),
            Err(_) => None,
        })
        .collect()
}

/// Parse the fields of a tracepoint out of its format file. The header and
/// the common fields, which end at the first empty line, are not part of the
/// event payload and are skipped.
pub(crate) fn tracepoint_args(format: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(format)
        .map_err(|e| anyhow!("Could not read {}: {e}", format.display()))?;
    let mut lines = content.lines();

    for line in lines.by_ref() {
        if line.is_empty() {
            break;
        }
    }

    let mut args = Vec::new();
    for line in lines {
        let field = match line.strip_prefix("\tfield:") {
            Some(field) if line.ends_with(';') => field,
            _ => continue,
        };
        // Keep the type and name declaration only, terminator included.
        if let Some(end) = field.find(';') {
            args.push(field[..=end].to_string());
        }
    }
    Ok(args)
}

/// List the kernel functions the tracing subsystem can attach to. Module
/// annotations following the function name are dropped.
pub(crate) fn available_functions(path: &Path) -> Result<Vec<String>> {
    let funcs = fs::read_to_string(path).map_err(|e| anyhow!("{e}: {}", path.display()))?;
    Ok(funcs
        .lines()
        .filter_map(|line| line.split(' ').next())
        .map(String::from)
        .collect())
}

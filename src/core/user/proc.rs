//! # Process
//!
//! Module providing process inspection and binary target resolution.

use std::{
    env,
    fs,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
};

use anyhow::{bail, Result};
use nix::unistd::{access, AccessFlags};

/// Outcomes of binary target resolution that do not yield a usable path. Both
/// are reported to the user; absence and ambiguity are different problems.
#[derive(thiserror::Error, Debug, PartialEq)]
pub(crate) enum ResolveError {
    /// No executable file matched the target.
    #[error("target '{0}' does not exist or is not executable")]
    NotFound(String),
    /// More than one executable file matched the target.
    #[error("target '{0}' matched {1} binaries")]
    Ambiguous(String, usize),
}

/// Build the path of a file as seen through the mount namespace of a process.
/// Paths already relative to the process root are returned untouched.
pub(crate) fn path_for_pid_mountns(pid: i32, path: &Path) -> PathBuf {
    let root = PathBuf::from(format!("/proc/{pid}/root"));
    if path.starts_with(&root) {
        return path.to_path_buf();
    }

    let mut ns_path = root.into_os_string();
    if !path.is_absolute() {
        ns_path.push("/");
    }
    ns_path.push(path);
    PathBuf::from(ns_path)
}

/// Executable image of a running process, as seen through its mount
/// namespace.
pub(crate) fn pid_exe_path(pid: i32) -> Result<PathBuf> {
    let path = match PathBuf::from(format!("/proc/{pid}/exe")).read_link() {
        Ok(path) => path,
        Err(e) => bail!("Cannot open executable path for process {pid}: {e}"),
    };
    Ok(path_for_pid_mountns(pid, &path))
}

/// Compare the mount namespace of a process with ours. Defaults to false when
/// the namespaces cannot be inspected.
fn in_different_mountns(pid: i32) -> bool {
    let self_ns = match fs::metadata("/proc/self/ns/mnt") {
        Ok(meta) => meta,
        Err(_) => return false,
    };
    let pid_ns = match fs::metadata(format!("/proc/{pid}/ns/mnt")) {
        Ok(meta) => meta,
        Err(_) => return false,
    };
    self_ns.ino() != pid_ns.ino()
}

fn is_executable_file(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => access(path, AccessFlags::X_OK).is_ok(),
        _ => false,
    }
}

/// Find the executables a target could refer to. The target itself is always a
/// candidate; when it has no directory part, every `$PATH` entry is tried too.
/// Candidates qualify if they are regular files executable by us. With a pid
/// in another mount namespace, candidates are looked up in that namespace.
pub(crate) fn resolve_binary_path(cmd: &str, pid: Option<i32>) -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from(cmd)];
    if !cmd.contains('/') {
        if let Ok(env_path) = env::var("PATH") {
            env_path
                .split(':')
                .for_each(|dir| candidates.push(Path::new(dir).join(cmd)));
        }
    }

    candidates
        .drain(..)
        .map(|path| match pid {
            Some(pid) if in_different_mountns(pid) => path_for_pid_mountns(pid, &path),
            _ => path,
        })
        .filter(|path| is_executable_file(path))
        .collect()
}

/// Resolve a target to exactly one binary.
pub(crate) fn unique_binary(cmd: &str, pid: Option<i32>) -> Result<PathBuf, ResolveError> {
    let mut paths = resolve_binary_path(cmd, pid);
    match paths.len() {
        0 => Err(ResolveError::NotFound(cmd.to_string())),
        1 => Ok(paths.remove(0)),
        n => Err(ResolveError::Ambiguous(cmd.to_string(), n)),
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    fn own_exe() {
        let pid = std::process::id() as i32;
        let path = pid_exe_path(pid).unwrap();
        assert!(path.starts_with(format!("/proc/{pid}/root")));
        assert!(path.exists());
    }

    #[test]
    fn missing_process() {
        assert!(pid_exe_path(-1).is_err());
    }

    #[test]
    fn mountns_paths() {
        assert_eq!(
            path_for_pid_mountns(42, Path::new("/bin/sh")),
            PathBuf::from("/proc/42/root/bin/sh")
        );
        assert_eq!(
            path_for_pid_mountns(42, Path::new("bin/sh")),
            PathBuf::from("/proc/42/root/bin/sh")
        );
        // Already relative to the process root.
        assert_eq!(
            path_for_pid_mountns(42, Path::new("/proc/42/root/bin/sh")),
            PathBuf::from("/proc/42/root/bin/sh")
        );
    }

    #[test]
    fn absolute_target() {
        assert_eq!(unique_binary("/bin/sh", None), Ok(PathBuf::from("/bin/sh")));
        assert_eq!(
            unique_binary("/no/such/bin", None),
            Err(ResolveError::NotFound("/no/such/bin".to_string()))
        );
        // An empty target cannot match anything.
        assert_eq!(
            unique_binary("", None),
            Err(ResolveError::NotFound(String::new()))
        );
    }

    #[test]
    #[serial]
    fn path_lookup() {
        let saved = env::var("PATH").unwrap();
        env::set_var("PATH", "test_data/bin_a");
        let unique = unique_binary("dup_bin", None);
        env::set_var("PATH", &saved);

        assert_eq!(unique, Ok(PathBuf::from("test_data/bin_a/dup_bin")));
    }

    #[test]
    #[serial]
    fn ambiguous_target() {
        let saved = env::var("PATH").unwrap();
        env::set_var("PATH", "test_data/bin_a:test_data/bin_b");
        let unique = unique_binary("dup_bin", None);
        env::set_var("PATH", &saved);

        assert_eq!(
            unique,
            Err(ResolveError::Ambiguous("dup_bin".to_string(), 2))
        );
    }

    #[test]
    fn same_mountns() {
        assert!(!in_different_mountns(std::process::id() as i32));
    }
}

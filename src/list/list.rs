use std::{io::Write, path::PathBuf};

use anyhow::{bail, Result};
use clap::ValueEnum;
use log::{error, warn};

use crate::core::{
    inspect::{btf::BtfInfo, tracefs},
    pattern::SearchPattern,
    probe::{ProbeId, ProbeType, HW_PROBES, SW_PROBES},
    user::{
        elf,
        proc::{self, ResolveError},
    },
};

/// How to handle a probe target that does not resolve to exactly one binary.
#[derive(Clone, Copy, Debug, Default, PartialEq, ValueEnum)]
pub(crate) enum OnUnresolved {
    /// Abort the listing with an error.
    #[default]
    Abort,
    /// Report the failure and keep listing the remaining probe types.
    Skip,
}

/// What to list and where to find it.
#[derive(Debug)]
pub(crate) struct ListConfig {
    /// Search expression restricting the listing.
    pub(crate) search: String,
    /// List uprobe and USDT targets of a running process.
    pub(crate) pid: Option<i32>,
    /// Show tracepoint and kfunc arguments.
    pub(crate) verbose: bool,
    /// File listing the attachable kernel functions.
    pub(crate) funcs_file: PathBuf,
    /// Root of the tracepoint event descriptions.
    pub(crate) events_root: PathBuf,
    /// Kernel BTF file.
    pub(crate) btf_file: PathBuf,
    /// Resolution failure policy.
    pub(crate) on_unresolved: OnUnresolved,
}

/// Probe sources, in listing order.
#[derive(Clone, Copy, PartialEq)]
enum Source {
    Software,
    Hardware,
    Uprobe,
    Usdt,
    Tracepoint,
    /// Kernel functions, listed both as kprobes and as BTF described kfuncs.
    KernelFuncs,
}

/// Enumerates the probes of all supported sources, writing the matching ones
/// out as `<type>:<qualifier>[:<qualifier>...]` lines.
pub(crate) struct Lister {
    config: ListConfig,
    /// Probe type the search expression selects, if any.
    r#type: Option<ProbeType>,
    /// Search expression with its probe type alias expanded.
    search: String,
}

impl Lister {
    pub(crate) fn new(config: ListConfig) -> Lister {
        let (r#type, search) = ProbeType::canonicalize_search(&config.search);
        Lister {
            config,
            r#type,
            search,
        }
    }

    /// List the probes matching the configuration, one per line.
    pub(crate) fn run(&self, out: &mut dyn Write) -> Result<()> {
        use Source::*;

        let pattern = match self.search.is_empty() {
            true => None,
            false => Some(SearchPattern::new(&self.search)?),
        };

        for source in [Software, Hardware, Uprobe, Usdt, Tracepoint, KernelFuncs] {
            // A search starting with 't' is for tracepoints; the kernel
            // function stages cannot match it.
            if source == KernelFuncs && self.search.starts_with('t') {
                break;
            }
            self.enumerate(source, pattern.as_ref(), out)?;
        }
        Ok(())
    }

    fn enumerate(
        &self,
        source: Source,
        pattern: Option<&SearchPattern>,
        out: &mut dyn Write,
    ) -> Result<()> {
        use Source::*;
        match source {
            Software => self.list_counters(pattern, out, SW_PROBES, |name| ProbeId::Software(name)),
            Hardware => self.list_counters(pattern, out, HW_PROBES, |name| ProbeId::Hardware(name)),
            Uprobe => self.list_uprobes(pattern, out),
            Usdt => self.list_usdts(pattern, out),
            Tracepoint => self.list_tracepoints(pattern, out),
            KernelFuncs => self.list_kernel_funcs(pattern, out),
        }
    }

    /// Write a single probe line, unless the search pattern filters it out.
    /// Returns whether the line was written.
    fn emit(
        &self,
        out: &mut dyn Write,
        pattern: Option<&SearchPattern>,
        show_all: bool,
        probe: &ProbeId,
    ) -> Result<bool> {
        let probe = probe.to_string();
        if !show_all {
            if let Some(pattern) = pattern {
                if !pattern.matches(&probe) {
                    return Ok(false);
                }
            }
        }
        writeln!(out, "{probe}")?;
        Ok(true)
    }

    /// Handle a target that did not resolve to a usable binary, following the
    /// configured policy.
    fn unresolved(&self, msg: String) -> Result<()> {
        match self.config.on_unresolved {
            OnUnresolved::Abort => bail!(msg),
            OnUnresolved::Skip => {
                error!("{msg}");
                Ok(())
            }
        }
    }

    /// Target token of the search expression: what follows the probe type, up
    /// to the next separator. When nothing follows the token every probe of
    /// the target is shown.
    fn target_token(&self) -> (&str, bool) {
        let rest = match self.search.split_once(':') {
            Some((_, rest)) => rest,
            None => "",
        };
        match rest.split_once(':') {
            Some((token, _)) => (token, false),
            None => (rest, true),
        }
    }

    fn list_counters(
        &self,
        pattern: Option<&SearchPattern>,
        out: &mut dyn Write,
        names: &[&str],
        probe: fn(&str) -> ProbeId,
    ) -> Result<()> {
        for name in names {
            self.emit(out, pattern, false, &probe(name))?;
        }
        Ok(())
    }

    fn list_uprobes(&self, pattern: Option<&SearchPattern>, out: &mut dyn Write) -> Result<()> {
        let mut show_all = false;
        let target = match self.config.pid.filter(|pid| *pid > 0) {
            Some(pid) => match proc::pid_exe_path(pid) {
                Ok(path) => Some(path),
                Err(e) => return self.unresolved(e.to_string()),
            },
            None => match self.r#type == Some(ProbeType::Uprobe) {
                true => {
                    let (token, all) = self.target_token();
                    show_all = all;
                    match proc::unique_binary(token, None) {
                        Ok(path) => Some(path),
                        Err(ResolveError::NotFound(target)) => {
                            return self.unresolved(format!(
                                "uprobe target '{target}' does not exist or is not executable"
                            ));
                        }
                        Err(ResolveError::Ambiguous(target, n)) => {
                            return self.unresolved(format!(
                                "path '{target}' must refer to a unique binary but matched {n}"
                            ));
                        }
                    }
                }
                false => None,
            },
        };

        let path = match target {
            Some(path) => path,
            None => return Ok(()),
        };

        let symbols = match elf::function_symbols(&path) {
            Ok(symbols) => symbols,
            Err(e) => {
                warn!("{e}");
                return Ok(());
            }
        };

        for symbol in symbols.lines() {
            self.emit(
                out,
                pattern,
                show_all,
                &ProbeId::Uprobe {
                    path: &path,
                    symbol,
                },
            )?;
        }
        Ok(())
    }

    fn list_usdts(&self, pattern: Option<&SearchPattern>, out: &mut dyn Write) -> Result<()> {
        let mut show_all = false;
        let target = match self.config.pid.filter(|pid| *pid > 0) {
            // PID takes precedence over a target in the search expression.
            Some(pid) => match proc::pid_exe_path(pid) {
                Ok(path) => Some(path),
                Err(e) => return self.unresolved(e.to_string()),
            },
            None => match self.r#type == Some(ProbeType::Usdt) {
                true => {
                    let (token, all) = self.target_token();
                    show_all = all;
                    match proc::unique_binary(token, self.config.pid) {
                        Ok(path) => Some(path),
                        Err(ResolveError::NotFound(target)) => {
                            return self.unresolved(format!(
                                "usdt target '{target}' does not exist or is not executable"
                            ));
                        }
                        Err(ResolveError::Ambiguous(target, n)) => {
                            return self.unresolved(format!(
                                "usdt target '{target}' must refer to a unique binary but matched {n}"
                            ));
                        }
                    }
                }
                false => None,
            },
        };

        let path = match target {
            Some(path) => path,
            None => return Ok(()),
        };

        let notes = match elf::usdt_notes(&path) {
            Ok(notes) => notes,
            Err(e) => {
                warn!("{e}");
                return Ok(());
            }
        };

        for note in notes.iter() {
            self.emit(
                out,
                pattern,
                show_all,
                &ProbeId::Usdt {
                    path: &path,
                    provider: &note.provider,
                    name: &note.name,
                },
            )?;
        }
        Ok(())
    }

    fn list_tracepoints(&self, pattern: Option<&SearchPattern>, out: &mut dyn Write) -> Result<()> {
        // Control files living alongside the event directories.
        const SKIP: &[&str] = &[".", "..", "enable", "filter"];

        for category in tracefs::list_dir(&self.config.events_root) {
            if SKIP.contains(&category.as_str()) {
                continue;
            }
            let category_dir = self.config.events_root.join(&category);
            for event in tracefs::list_dir(&category_dir) {
                if SKIP.contains(&event.as_str()) {
                    continue;
                }

                let printed = self.emit(
                    out,
                    pattern,
                    false,
                    &ProbeId::Tracepoint {
                        category: &category,
                        name: &event,
                    },
                )?;
                if printed && self.config.verbose {
                    let format = category_dir.join(&event).join("format");
                    match tracefs::tracepoint_args(&format) {
                        Ok(args) => {
                            for arg in args {
                                writeln!(out, "    {arg}")?;
                            }
                        }
                        Err(_) => {
                            error!("tracepoint format file not found: {}", format.display())
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn list_kernel_funcs(
        &self,
        pattern: Option<&SearchPattern>,
        out: &mut dyn Write,
    ) -> Result<()> {
        let funcs = match tracefs::available_functions(&self.config.funcs_file) {
            Ok(funcs) => funcs,
            Err(e) => {
                error!("{e}");
                return Ok(());
            }
        };

        for func in funcs.iter() {
            self.emit(out, pattern, false, &ProbeId::Kprobe(func))?;
        }

        // kfuncs are the subset of those functions the kernel BTF describes.
        match BtfInfo::from_file(&self.config.btf_file) {
            Ok(btf) => btf.display_funcs(&funcs, pattern, self.config.verbose, out),
            Err(e) => {
                warn!("{e}");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::env;

    use probe::probe;
    use serial_test::serial;

    use super::*;

    // The uprobe tests below look for this symbol in their own image.
    #[no_mangle]
    extern "C" fn lsprobe_list_test_symbol() {}

    fn config(search: &str) -> ListConfig {
        ListConfig {
            search: search.to_string(),
            pid: None,
            verbose: false,
            funcs_file: PathBuf::from("test_data/tracing/available_filter_functions"),
            events_root: PathBuf::from("test_data/tracing/events"),
            btf_file: PathBuf::from("test_data/no_btf"),
            on_unresolved: OnUnresolved::Abort,
        }
    }

    fn run(config: ListConfig) -> Vec<String> {
        let mut out = Vec::new();
        Lister::new(config).run(&mut out).unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    #[test]
    fn counters() {
        let lines = run(config(""));

        assert_eq!(lines.iter().filter(|l| l.starts_with("software:")).count(), 11);
        assert_eq!(lines.iter().filter(|l| l.starts_with("hardware:")).count(), 10);
        assert!(lines.contains(&"software:cpu-clock:".to_string()));
        assert!(lines.contains(&"hardware:cache-misses:".to_string()));
        assert_eq!(lines.iter().filter(|l| *l == "kprobe:do_exit").count(), 2);

        // Sources come in a fixed order.
        let sw = lines.iter().position(|l| l.starts_with("software:")).unwrap();
        let hw = lines.iter().position(|l| l.starts_with("hardware:")).unwrap();
        let tp = lines.iter().position(|l| l.starts_with("tracepoint:")).unwrap();
        let kp = lines.iter().position(|l| l.starts_with("kprobe:")).unwrap();
        assert!(sw < hw && hw < tp && tp < kp);
    }

    #[test]
    fn search() {
        let mut lines = run(config("tracepoint:sched:*"));
        lines.sort();

        // Control files and the current/parent directory entries are not
        // events.
        assert_eq!(
            lines,
            [
                "tracepoint:sched:sched_noformat",
                "tracepoint:sched:sched_switch",
                "tracepoint:sched:sched_wakeup",
            ]
        );

        // An exact identifier matches itself and nothing else.
        let lines = run(config("tracepoint:sched:sched_switch"));
        assert_eq!(lines, ["tracepoint:sched:sched_switch"]);
    }

    #[test]
    fn alias_search() {
        assert_eq!(run(config("t:sched:*")), run(config("tracepoint:sched:*")));
        assert_eq!(run(config("s:*")), run(config("software:*")));
        assert_eq!(run(config("h:*")), run(config("hardware:*")));
    }

    #[test]
    fn tracepoint_prefix_shortcut() {
        assert!(run(config("")).iter().any(|l| l.starts_with("kprobe:")));

        // A wildcard crossing the type prefix still reaches kernel functions.
        assert!(run(config("*tcp*")).contains(&"kprobe:tcp_sendmsg".to_string()));

        // Any search starting with 't' lists tracepoints only.
        let lines = run(config("t*"));
        assert!(!lines.is_empty());
        assert!(lines.iter().all(|l| l.starts_with("tracepoint:")));
    }

    #[test]
    fn kprobes() {
        let lines = run(config("kprobe:*"));

        assert!(lines.contains(&"kprobe:do_exit".to_string()));
        // Module annotations are not part of the probe name.
        assert!(lines.contains(&"kprobe:cleanup_module".to_string()));
        assert!(!lines.iter().any(|l| l.contains('[')));

        // Functions listed both built-in and per-module are not deduplicated.
        assert_eq!(lines.iter().filter(|l| *l == "kprobe:do_exit").count(), 2);
    }

    #[test]
    fn missing_functions_file() {
        let mut config = config("");
        config.funcs_file = PathBuf::from("test_data/no_such_file");

        // Not fatal: the other sources are still listed.
        let lines = run(config);
        assert!(!lines.iter().any(|l| l.starts_with("kprobe:")));
        assert!(lines.contains(&"software:cpu-clock:".to_string()));
    }

    #[test]
    fn unresolved_uprobe_target() {
        let mut out = Vec::new();
        let err = Lister::new(config("uprobe:/no/such/bin:*"))
            .run(&mut out)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "uprobe target '/no/such/bin' does not exist or is not executable"
        );
        // The abort comes before any probe is printed.
        assert!(out.is_empty());

        // The skip policy reports the failure and carries on.
        let mut config = config("uprobe:/no/such/bin:*");
        config.on_unresolved = OnUnresolved::Skip;
        Lister::new(config).run(&mut Vec::new()).unwrap();
    }

    #[test]
    fn unresolved_usdt_target() {
        let err = Lister::new(config("usdt:/no/such/bin:*"))
            .run(&mut Vec::new())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "usdt target '/no/such/bin' does not exist or is not executable"
        );
    }

    #[test]
    #[serial]
    fn ambiguous_targets() {
        let saved = env::var("PATH").unwrap();
        env::set_var("PATH", "test_data/bin_a:test_data/bin_b");
        let uprobe = Lister::new(config("uprobe:dup_bin:*")).run(&mut Vec::new());
        let usdt = Lister::new(config("usdt:dup_bin:*")).run(&mut Vec::new());
        env::set_var("PATH", &saved);

        assert_eq!(
            uprobe.unwrap_err().to_string(),
            "path 'dup_bin' must refer to a unique binary but matched 2"
        );
        assert_eq!(
            usdt.unwrap_err().to_string(),
            "usdt target 'dup_bin' must refer to a unique binary but matched 2"
        );
    }

    #[test]
    fn own_uprobes() {
        lsprobe_list_test_symbol();

        let lines = run(config("uprobe:/proc/self/exe:lsprobe_list*"));
        assert!(lines.contains(&"uprobe:/proc/self/exe:lsprobe_list_test_symbol".to_string()));

        // No symbol part: every symbol of the target is shown.
        let lines = run(config("uprobe:/proc/self/exe"));
        assert!(lines.contains(&"uprobe:/proc/self/exe:lsprobe_list_test_symbol".to_string()));
    }

    #[test]
    fn own_usdts() {
        probe!(lsprobe, list_test, 1);

        let lines = run(config("usdt:/proc/self/exe:lsprobe:list_test"));
        assert!(lines.contains(&"usdt:/proc/self/exe:lsprobe:list_test".to_string()));

        // No provider part: every probe of the target is shown.
        let lines = run(config("usdt:/proc/self/exe"));
        assert!(lines.contains(&"usdt:/proc/self/exe:lsprobe:list_test".to_string()));
    }

    #[test]
    fn pid_targets() {
        lsprobe_list_test_symbol();
        let pid = std::process::id() as i32;

        let mut config = config("uprobe:*:lsprobe_list_test_symbol");
        config.pid = Some(pid);
        let lines = run(config);
        assert!(lines
            .iter()
            .any(|l| l.starts_with(&format!("uprobe:/proc/{pid}/root"))
                && l.ends_with(":lsprobe_list_test_symbol")));
    }

    #[test]
    fn pid_takes_precedence() {
        // With a PID, the target in the search expression is not resolved.
        let mut config = config("uprobe:/no/such/bin:*");
        config.pid = Some(std::process::id() as i32);
        Lister::new(config).run(&mut Vec::new()).unwrap();
    }

    #[test]
    fn bad_pid() {
        let mut config = config("");
        config.pid = Some(i32::MAX);
        let err = Lister::new(config).run(&mut Vec::new()).unwrap_err();
        assert!(err.to_string().starts_with("Cannot open executable path"));
    }

    #[test]
    fn verbose_tracepoints() {
        let mut config = config("tracepoint:sched:sched_switch");
        config.verbose = true;
        let lines = run(config);

        let probe = lines
            .iter()
            .position(|l| l == "tracepoint:sched:sched_switch")
            .unwrap();
        assert!(lines[probe + 1..]
            .iter()
            .any(|l| l == "    pid_t prev_pid;"));
        assert!(!lines.iter().any(|l| l.contains("common_type")));
    }

    #[test]
    fn missing_format_file() {
        let mut config = config("tracepoint:sched:*");
        config.verbose = true;

        // A missing format file costs that event its argument lines, nothing
        // more.
        let lines = run(config);
        assert!(lines.contains(&"tracepoint:sched:sched_noformat".to_string()));
        assert!(lines.iter().any(|l| l == "    pid_t prev_pid;"));
    }

    #[test]
    fn invalid_search() {
        assert!(Lister::new(config("kprobe:do_[exit"))
            .run(&mut Vec::new())
            .is_err());
    }
}

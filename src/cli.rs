//! # Cli
//!
//! Command line interface of the tool.

use std::path::PathBuf;

use clap::{builder::PossibleValuesParser, Parser};

use crate::list::{ListConfig, OnUnresolved};

/// List probe points available for dynamic tracing
///
/// Probes are printed one per line as `<type>:<qualifier>[:<qualifier>...]`,
/// ready to be used as attach points. An optional search expression restricts
/// the listing; `*` matches any sequence and `?` a single character.
#[derive(Parser, Debug)]
#[command(name = "lsprobe", version)]
pub(crate) struct Cli {
    #[arg(
        help = "Search expression, e.g. 'tracepoint:sched:*'. Probe types can be abbreviated: kprobe/k, kretprobe/kr, uprobe/u, uretprobe/ur, usdt/U, tracepoint/t, profile/p, interval/i, software/s, hardware/h"
    )]
    pub(crate) search: Option<String>,
    #[arg(
        long,
        short,
        help = "List the uprobe and USDT targets of a running process"
    )]
    pub(crate) pid: Option<i32>,
    #[arg(long, short, help = "Show tracepoint and kfunc arguments")]
    pub(crate) verbose: bool,
    #[arg(
        long,
        value_parser=PossibleValuesParser::new(["error", "warn", "info", "debug", "trace"]),
        default_value = "info",
        help = "Log level",
    )]
    pub(crate) log_level: String,
    #[arg(
        long,
        default_value = "/sys/kernel/debug/tracing",
        help = "Root of the kernel tracing filesystem"
    )]
    pub(crate) tracefs: PathBuf,
    #[arg(
        long,
        default_value = "/sys/kernel/btf/vmlinux",
        help = "Kernel BTF file"
    )]
    pub(crate) btf: PathBuf,
    #[arg(
        long,
        value_enum,
        default_value = "abort",
        help = "What to do when a probe target does not resolve to exactly one binary"
    )]
    pub(crate) on_unresolved: OnUnresolved,
}

impl Cli {
    /// Translate the command line into a listing configuration.
    pub(crate) fn list_config(&self) -> ListConfig {
        ListConfig {
            search: self.search.clone().unwrap_or_default(),
            pid: self.pid,
            verbose: self.verbose,
            funcs_file: self.tracefs.join("available_filter_functions"),
            events_root: self.tracefs.join("events"),
            btf_file: self.btf.clone(),
            on_unresolved: self.on_unresolved,
        }
    }
}

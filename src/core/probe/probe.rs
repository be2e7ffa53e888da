use std::{fmt, path::Path};

/// Software perf counters that can always be probed, regardless of the running
/// kernel and hardware.
pub(crate) const SW_PROBES: &[&str] = &[
    "alignment-faults",
    "bpf-output",
    "context-switches",
    "cpu-clock",
    "cpu-migrations",
    "dummy",
    "emulation-faults",
    "major-faults",
    "minor-faults",
    "page-faults",
    "task-clock",
];

/// Hardware perf counters. Fixed catalog as well; whether a counter actually
/// counts on a given machine is up to perf.
pub(crate) const HW_PROBES: &[&str] = &[
    "backend-stalls",
    "branch-instructions",
    "branch-misses",
    "bus-cycles",
    "cache-misses",
    "cache-references",
    "cpu-cycles",
    "frontend-stalls",
    "instructions",
    "ref-cycles",
];

/// Probe types supported by the tracing front end. Searches may name them in
/// full or through their short alias.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ProbeType {
    Kprobe,
    Kretprobe,
    Uprobe,
    Uretprobe,
    Usdt,
    Tracepoint,
    Profile,
    Interval,
    Software,
    Hardware,
}

impl ProbeType {
    pub(crate) fn to_str(&self) -> &'static str {
        use ProbeType::*;
        match self {
            Kprobe => "kprobe",
            Kretprobe => "kretprobe",
            Uprobe => "uprobe",
            Uretprobe => "uretprobe",
            Usdt => "usdt",
            Tracepoint => "tracepoint",
            Profile => "profile",
            Interval => "interval",
            Software => "software",
            Hardware => "hardware",
        }
    }

    /// Look up a probe type from its full name or short alias. The lookup is
    /// case sensitive: `u` is a uprobe while `U` is a USDT probe.
    pub(crate) fn from_alias(name: &str) -> Option<ProbeType> {
        use ProbeType::*;
        Some(match name {
            "kprobe" | "k" => Kprobe,
            "kretprobe" | "kr" => Kretprobe,
            "uprobe" | "u" => Uprobe,
            "uretprobe" | "ur" => Uretprobe,
            "usdt" | "U" => Usdt,
            "tracepoint" | "t" => Tracepoint,
            "profile" | "p" => Profile,
            "interval" | "i" => Interval,
            "software" | "s" => Software,
            "hardware" | "h" => Hardware,
            _ => return None,
        })
    }

    /// Rewrite the probe type prefix of a search to its canonical name, e.g.
    /// `t:sched:*` becomes `tracepoint:sched:*`. Searches without a `:` or
    /// with an unknown prefix are returned untouched; the prefix might then be
    /// part of a symbol name, which is not an error.
    pub(crate) fn canonicalize_search(search: &str) -> (Option<ProbeType>, String) {
        match search.split_once(':') {
            Some((prefix, rest)) => match ProbeType::from_alias(prefix) {
                Some(r#type) => (Some(r#type), format!("{}:{rest}", r#type.to_str())),
                None => (None, search.to_string()),
            },
            None => (None, search.to_string()),
        }
    }
}

/// A probe point in its canonical, printable form. The rendered string is both
/// what the listing prints and what search patterns are matched against.
pub(crate) enum ProbeId<'a> {
    Software(&'a str),
    Hardware(&'a str),
    Uprobe { path: &'a Path, symbol: &'a str },
    Usdt { path: &'a Path, provider: &'a str, name: &'a str },
    Tracepoint { category: &'a str, name: &'a str },
    Kprobe(&'a str),
}

impl fmt::Display for ProbeId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ProbeId::*;
        match self {
            // Counter identifiers keep their historical trailing colon.
            Software(name) => write!(f, "software:{name}:"),
            Hardware(name) => write!(f, "hardware:{name}:"),
            Uprobe { path, symbol } => write!(f, "uprobe:{}:{symbol}", path.display()),
            Usdt {
                path,
                provider,
                name,
            } => write!(f, "usdt:{}:{provider}:{name}", path.display()),
            Tracepoint { category, name } => write!(f, "tracepoint:{category}:{name}"),
            Kprobe(func) => write!(f, "kprobe:{func}"),
        }
    }
}

//! # Btf
//!
//! Module providing kernel function inspection through BTF.

use std::{io::Write, path::Path};

use anyhow::{anyhow, Result};
use btf_rs::{Btf, Type};

use crate::core::pattern::SearchPattern;

/// Provides lookups and display of the functions described by the kernel BTF.
pub(crate) struct BtfInfo {
    /// Main Btf object (vmlinux).
    vmlinux: Btf,
}

impl BtfInfo {
    /// Parse a kernel BTF file and create a Btf object.
    pub(crate) fn from_file(path: &Path) -> Result<BtfInfo> {
        Ok(BtfInfo {
            vmlinux: Btf::from_file(path)
                .map_err(|e| anyhow!("Could not open {}: {e}", path.display()))?,
        })
    }

    /// Write the given functions as probes, one per line, filtered by an
    /// optional search pattern. In verbose mode each probe is followed by its
    /// parameters, one per line.
    pub(crate) fn display_funcs(
        &self,
        funcs: &[String],
        pattern: Option<&SearchPattern>,
        verbose: bool,
        out: &mut dyn Write,
    ) -> Result<()> {
        for func in funcs {
            let probe = format!("kfunc:{func}");
            if let Some(pattern) = pattern {
                if !pattern.matches(&probe) {
                    continue;
                }
            }

            // Functions the BTF does not describe cannot be attached to.
            let proto = match self.function_prototype(func) {
                Some(proto) => proto,
                None => continue,
            };

            writeln!(out, "{probe}")?;
            if !verbose {
                continue;
            }

            for param in proto.parameters.iter() {
                let arg_type = match Self::param_type(&self.vmlinux, param) {
                    Some(arg_type) => arg_type,
                    None => continue,
                };
                match self.vmlinux.resolve_name(param) {
                    Ok(name) if !name.is_empty() => writeln!(out, "    {arg_type} {name}")?,
                    _ => writeln!(out, "    {arg_type}")?,
                }
            }
        }
        Ok(())
    }

    /// Look up the prototype of a function. The resolution is
    /// straightforward: Func -> FuncProto.
    fn function_prototype(&self, name: &str) -> Option<btf_rs::FuncProto> {
        let types = self.vmlinux.resolve_types_by_name(name).ok()?;
        let func = types.iter().find_map(|t| match t {
            Type::Func(func) => Some(func),
            _ => None,
        })?;

        match self.vmlinux.resolve_chained_type(func).ok()? {
            Type::FuncProto(proto) => Some(proto),
            _ => None,
        }
    }

    /// Build the C style type name of a parameter.
    fn param_type(btf: &Btf, param: &btf_rs::Parameter) -> Option<String> {
        let mut resolved = btf.resolve_chained_type(param).ok();
        let mut is_pointer = false;

        // First, traverse the type definition until we find the actual type.
        // A chained type that does not resolve is the BTF void.
        loop {
            resolved = match resolved {
                Some(Type::Ptr(t)) => {
                    is_pointer = true;
                    btf.resolve_chained_type(&t).ok()
                }
                Some(Type::Volatile(t)) => btf.resolve_chained_type(&t).ok(),
                Some(Type::Const(t)) => btf.resolve_chained_type(&t).ok(),
                _ => break,
            }
        }

        // Then resolve the type name.
        let mut full_name = match resolved {
            Some(Type::Int(t)) => btf.resolve_name(&t).ok()?,
            Some(Type::Struct(t)) => format!("struct {}", btf.resolve_name(&t).ok()?),
            Some(Type::Union(t)) => format!("union {}", btf.resolve_name(&t).ok()?),
            Some(Type::Enum(t)) => format!("enum {}", btf.resolve_name(&t).ok()?),
            Some(Type::Enum64(t)) => format!("enum {}", btf.resolve_name(&t).ok()?),
            Some(Type::Typedef(t)) => btf.resolve_name(&t).ok()?,
            Some(Type::Float(t)) => btf.resolve_name(&t).ok()?,
            None => "void".to_string(),
            // Function pointers, arrays and such.
            Some(_) => return None,
        };

        // Set the pointer information C style.
        if is_pointer {
            full_name.push_str(" *");
        }

        Some(full_name)
    }
}

//! # Elf
//!
//! Module providing ELF inspection of user-space binaries: USDT notes and
//! function symbols.

use std::{
    ffi::CStr,
    fs,
    io::{BufRead, Cursor},
    path::Path,
};

use anyhow::{anyhow, bail, Result};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use elf::{abi, endian::AnyEndian, file::Class, note::Note, ElfBytes};

/// SystemTap SDT notes have this type.
const STAPSDT_TYPE: u64 = 3;

/// USDT probe point advertised by a binary in its `.note.stapsdt` section.
#[derive(Debug, PartialEq)]
pub(crate) struct UsdtNote {
    /// Provider name.
    pub(crate) provider: String,
    /// Probe name.
    pub(crate) name: String,
}

/// Parse the USDT notes of a binary. Binaries without a `.note.stapsdt`
/// section yield an empty list.
pub(crate) fn usdt_notes(path: &Path) -> Result<Vec<UsdtNote>> {
    let file = fs::read(path).map_err(|e| anyhow!("Could not read {}: {e}", path.display()))?;
    let elf = ElfBytes::<AnyEndian>::minimal_parse(&file)
        .map_err(|e| anyhow!("Could not parse {}: {e}", path.display()))?;

    let hdr = match elf.section_header_by_name(".note.stapsdt")? {
        Some(hdr) => hdr,
        None => return Ok(Vec::new()),
    };

    let (class, endianness) = (elf.ehdr.class, elf.ehdr.endianness);
    elf.section_data_as_notes(&hdr)
        .map_err(|e| anyhow!("Could not get notes from {}: {e}", path.display()))?
        .map(|note| match note {
            Note::Unknown(note) => {
                if note.n_type != STAPSDT_TYPE || note.name != "stapsdt" {
                    bail!("Unexpected note {} ({})", note.name, note.n_type);
                }

                // The note description holds the probe, base and semaphore
                // addresses, followed by the provider and probe names as null
                // terminated strings.
                let mut desc = Cursor::new(note.desc);
                for _ in 0..3 {
                    read_address(&mut desc, class, endianness)?;
                }

                Ok(UsdtNote {
                    provider: read_cstr(&mut desc)?,
                    name: read_cstr(&mut desc)?,
                })
            }
            _ => bail!("Unexpected note variant in {}", path.display()),
        })
        .collect()
}

/// Address fields in SDT notes have the size and byte order of the ELF image,
/// not ours.
fn read_address(desc: &mut Cursor<&[u8]>, class: Class, endianness: AnyEndian) -> Result<u64> {
    Ok(match (class, endianness) {
        (Class::ELF32, AnyEndian::Little) => desc.read_u32::<LittleEndian>()? as u64,
        (Class::ELF32, AnyEndian::Big) => desc.read_u32::<BigEndian>()? as u64,
        (Class::ELF64, AnyEndian::Little) => desc.read_u64::<LittleEndian>()?,
        (Class::ELF64, AnyEndian::Big) => desc.read_u64::<BigEndian>()?,
    })
}

fn read_cstr(desc: &mut Cursor<&[u8]>) -> Result<String> {
    let mut buf = Vec::new();
    desc.read_until(b'\0', &mut buf)?;
    Ok(CStr::from_bytes_with_nul(&buf)?.to_str()?.to_string())
}

/// List the function symbols defined in a binary, one per line. Uses the
/// symbol table when present, falling back to the dynamic one for stripped
/// binaries.
pub(crate) fn function_symbols(path: &Path) -> Result<String> {
    let file = fs::read(path).map_err(|e| anyhow!("Could not read {}: {e}", path.display()))?;
    let elf = ElfBytes::<AnyEndian>::minimal_parse(&file)
        .map_err(|e| anyhow!("Could not parse {}: {e}", path.display()))?;

    let (symtab, strtab) = match elf.symbol_table()? {
        Some(tables) => tables,
        None => match elf.dynamic_symbol_table()? {
            Some(tables) => tables,
            None => return Ok(String::new()),
        },
    };

    let mut funcs = Vec::new();
    for sym in symtab.iter() {
        if sym.st_symtype() != abi::STT_FUNC || sym.is_undefined() {
            continue;
        }
        match strtab.get(sym.st_name as usize) {
            Ok(name) if !name.is_empty() => funcs.push(name.to_string()),
            _ => (),
        }
    }
    Ok(funcs.join("\n"))
}

#[cfg(test)]
mod tests {
    use probe::probe;

    use super::*;

    // The tests below look for this symbol in their own image.
    #[no_mangle]
    extern "C" fn lsprobe_elf_test_symbol() {}

    #[test]
    fn own_symbols() {
        lsprobe_elf_test_symbol();

        let symbols = function_symbols(Path::new("/proc/self/exe")).unwrap();
        assert!(symbols.lines().any(|sym| sym == "lsprobe_elf_test_symbol"));
    }

    #[test]
    fn own_usdt_notes() {
        probe!(test_provider, test_function, 1);

        let notes = usdt_notes(Path::new("/proc/self/exe")).unwrap();
        assert!(notes.contains(&UsdtNote {
            provider: "test_provider".to_string(),
            name: "test_function".to_string(),
        }));
    }

    #[test]
    fn no_usdt_notes() {
        assert!(usdt_notes(Path::new("/bin/true")).unwrap().is_empty());
    }

    #[test]
    fn missing_binary() {
        assert!(function_symbols(Path::new("/no/such/bin")).is_err());
        assert!(usdt_notes(Path::new("/no/such/bin")).is_err());
    }
}

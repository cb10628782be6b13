//! Symbol listing in the style of `nm(1)`.

use std::io::Write;

use crate::{
    error::Result,
    macho::{
        constants::{Stab, SymbolKind, NO_SECT},
        MachO, Section, Symbol, TEXT_SEGMENT,
    },
};

/// Which symbols to list and in what order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Keep the source and object file stabs that are hidden by default.
    pub all: bool,
    pub globals_only: bool,
    pub undefined_only: bool,
    /// Sort by value instead of by name.
    pub numeric: bool,
    /// Keep symbol table order.
    pub unsorted: bool,
    pub reverse: bool,
    pub names_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: u64,
    pub code: char,
    pub name: String,
}

impl Entry {
    pub fn is_undefined(&self) -> bool {
        self.code.eq_ignore_ascii_case(&'u')
    }

    pub fn format(&self, options: &Options) -> String {
        if options.names_only {
            return self.name.clone();
        }
        if self.is_undefined() {
            format!("{:16} {} {}", "", self.code, self.name)
        } else {
            format!("{:016x} {} {}", self.value, self.code, self.name)
        }
    }
}

/// The one letter type code; uppercase for external and global symbols.
pub fn classify(symbol: &Symbol, section: Option<&Section>) -> char {
    let code = match (symbol.kind(), section) {
        (Some(SymbolKind::Undefined), _) => 'u',
        (_, Some(section)) if section.segname == TEXT_SEGMENT => 't',
        (_, Some(section)) if section.section_type().is_zerofill() => 'b',
        (Some(SymbolKind::Absolute), _) => 'a',
        _ => 'd',
    };
    if symbol.is_external() || symbol.n_type.stab() == Some(Stab::Gsym) {
        code.to_ascii_uppercase()
    } else {
        code
    }
}

fn hidden_stab(symbol: &Symbol) -> bool {
    matches!(
        symbol.n_type.stab(),
        Some(Stab::So) | Some(Stab::Oso) | Some(Stab::Bnsym)
    )
}

/// Debugging entries carry a section number without the section kind.
fn owning_section<'a>(macho: &'a MachO, symbol: &Symbol) -> Result<Option<&'a Section>> {
    if symbol.is_stab() {
        if symbol.n_sect == NO_SECT {
            return Ok(None);
        }
        return macho.section(symbol.n_sect).map(Some);
    }
    macho.symbol_section(symbol)
}

/// Collects the listed symbols of `macho` in display order.
pub fn entries(macho: &MachO, options: &Options) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for symbol in macho.symbol_table() {
        if !options.all && hidden_stab(symbol) {
            continue;
        }
        if options.globals_only && !symbol.is_external() {
            continue;
        }
        if options.undefined_only && !symbol.is_undefined() {
            continue;
        }
        let name = macho.symbol_name(symbol)?;
        if name.is_empty() {
            continue;
        }
        let section = owning_section(macho, symbol)?;
        entries.push(Entry {
            value: symbol.value,
            code: classify(symbol, section),
            name: name.into_owned(),
        });
    }

    if !options.unsorted {
        entries.sort_by(|a, b| {
            if options.numeric {
                a.value.cmp(&b.value).then_with(|| a.name.cmp(&b.name))
            } else {
                a.name.cmp(&b.name)
            }
        });
    }
    if options.reverse {
        entries.reverse();
    }
    Ok(entries)
}

/// Writes one line per listed symbol.
pub fn render<W: Write>(macho: &MachO, options: &Options, out: &mut W) -> Result<()> {
    for entry in entries(macho, options)? {
        writeln!(out, "{}", entry.format(options))?;
    }
    Ok(())
}

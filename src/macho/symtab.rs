use std::{
    collections::HashMap,
    io::{Read, Seek},
};

use num_traits::FromPrimitive;
use tracing::{debug, trace};
use ux::u3;

use super::{
    constants::{Stab, SymbolKind, NO_SECT, N_EXT, N_PEXT, N_STAB, N_TYPE},
    strtab::StringTable,
};
use crate::{
    error::{MachoError, Result},
    reader::Reader,
};

/// The four fields packed into an `n_type` byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeBits {
    pub stab: u3,
    pub private_extern: bool,
    pub kind: u3,
    pub external: bool,
}

impl TypeBits {
    pub fn split(n_type: u8) -> TypeBits {
        // N_STAB:3, N_PEXT:1, N_TYPE:3, N_EXT:1
        TypeBits {
            stab: u3::new((n_type & N_STAB) >> 5),
            private_extern: n_type & N_PEXT != 0,
            kind: u3::new((n_type & N_TYPE) >> 1),
            external: n_type & N_EXT != 0,
        }
    }

    pub fn raw(&self) -> u8 {
        u8::from(self.stab) << 5
            | u8::from(self.private_extern) << 4
            | u8::from(self.kind) << 1
            | u8::from(self.external)
    }

    #[inline]
    pub fn is_stab(&self) -> bool {
        self.stab != u3::new(0)
    }
}

/// The decoded `n_type` byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolType {
    /// A debugging entry; the whole byte is the stab code.
    Debug(u8),
    Symbol {
        kind: SymbolKind,
        private_extern: bool,
        external: bool,
    },
}

impl SymbolType {
    pub fn decode(n_type: u8) -> Option<SymbolType> {
        SymbolType::from_bits(TypeBits::split(n_type))
    }

    pub fn from_bits(bits: TypeBits) -> Option<SymbolType> {
        if bits.is_stab() {
            return Some(SymbolType::Debug(bits.raw()));
        }
        Some(SymbolType::Symbol {
            kind: SymbolKind::from_u8(u8::from(bits.kind) << 1)?,
            private_extern: bits.private_extern,
            external: bits.external,
        })
    }

    pub fn is_stab(&self) -> bool {
        matches!(self, SymbolType::Debug(_))
    }

    /// The stab code, if it is one this crate knows by name.
    pub fn stab(&self) -> Option<Stab> {
        match self {
            SymbolType::Debug(code) => Stab::from_u8(*code),
            SymbolType::Symbol { .. } => None,
        }
    }

    pub fn kind(&self) -> Option<SymbolKind> {
        match self {
            SymbolType::Symbol { kind, .. } => Some(*kind),
            SymbolType::Debug(_) => None,
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, SymbolType::Symbol { external: true, .. })
    }

    pub fn is_private_extern(&self) -> bool {
        matches!(
            self,
            SymbolType::Symbol {
                private_extern: true,
                ..
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub n_strx: u32,
    /// `stroff + n_strx`, the key of this symbol's name in the string table.
    pub name_offset: u64,
    pub n_type: SymbolType,
    pub n_sect: u8,
    pub n_desc: u16,
    pub value: u64,
}

impl Symbol {
    pub fn parse<R>(reader: &mut Reader<R>, stroff: u32) -> Result<Symbol>
    where
        R: Read + Seek,
    {
        let offset = reader.position()?;
        let n_strx = reader.read_u32()?;
        let raw_type = reader.read_u8()?;
        let n_type = SymbolType::decode(raw_type).ok_or(MachoError::UnrecognizedSymbolType {
            offset,
            value: raw_type,
        })?;
        Ok(Symbol {
            n_strx,
            name_offset: u64::from(stroff) + u64::from(n_strx),
            n_type,
            n_sect: reader.read_u8()?,
            n_desc: reader.read_u16()?,
            value: reader.read_word()?,
        })
    }

    #[inline]
    pub fn is_stab(&self) -> bool {
        self.n_type.is_stab()
    }

    #[inline]
    pub fn is_external(&self) -> bool {
        self.n_type.is_external()
    }

    #[inline]
    pub fn kind(&self) -> Option<SymbolKind> {
        self.n_type.kind()
    }

    #[inline]
    pub fn is_section_defined(&self) -> bool {
        self.kind() == Some(SymbolKind::Section)
    }

    #[inline]
    pub fn is_undefined(&self) -> bool {
        self.kind() == Some(SymbolKind::Undefined)
    }

    /// The 1-based index into the flattened section list, for section-defined symbols.
    pub fn section_index(&self) -> Option<u8> {
        match self.kind() {
            Some(SymbolKind::Section) if self.n_sect != NO_SECT => Some(self.n_sect),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct SymbolTable {
    pub symoff: u32,
    pub nsyms: u32,
    pub stroff: u32,
    pub strsize: u32,
    symbols: Vec<Symbol>,
    strings: StringTable,
}

impl SymbolTable {
    /// Decodes an `LC_SYMTAB` body along with the tables it points at. The reader's
    /// position is left right after the command body.
    pub fn parse<R>(reader: &mut Reader<R>) -> Result<SymbolTable>
    where
        R: Read + Seek,
    {
        let symoff = reader.read_u32()?;
        let nsyms = reader.read_u32()?;
        let stroff = reader.read_u32()?;
        let strsize = reader.read_u32()?;

        let mut cursor = reader.scoped(u64::from(symoff))?;
        let mut symbols: Vec<Symbol> = Vec::new();
        let mut by_value: HashMap<u64, usize> = HashMap::new();
        for _ in 0..nsyms {
            let symbol = Symbol::parse(&mut *cursor, stroff)?;
            match by_value.get(&symbol.value) {
                Some(&index) => {
                    let first = &symbols[index];
                    if first.is_section_defined()
                        && symbol.is_section_defined()
                        && first.n_desc != symbol.n_desc
                    {
                        return Err(MachoError::DuplicateSymbolMismatch {
                            value: symbol.value,
                            first: first.n_desc,
                            second: symbol.n_desc,
                        });
                    }
                    trace!(value = symbol.value, "skipped duplicate symbol");
                }
                None => {
                    by_value.insert(symbol.value, symbols.len());
                    symbols.push(symbol);
                }
            }
        }

        cursor.seek_to(u64::from(stroff))?;
        let pool = cursor.read_bytes(strsize as usize)?;
        drop(cursor);

        debug!(nsyms, kept = symbols.len(), strsize, "decoded symbol table");
        let strings = StringTable::new(
            u64::from(stroff),
            pool,
            symbols.iter().map(|symbol| symbol.name_offset),
        );
        Ok(SymbolTable {
            symoff,
            nsyms,
            stroff,
            strsize,
            symbols,
            strings,
        })
    }

    /// Symbols in file order, one per distinct value.
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn strings(&self) -> &StringTable {
        &self.strings
    }
}

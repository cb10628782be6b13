use std::{
    collections::BTreeMap,
    io::{Read, Seek},
};

use num_traits::FromPrimitive;
use tracing::trace;

use super::{
    constants::LoadCommandCode, header::Header, segment::Segment, symtab::SymbolTable,
};
use crate::{
    error::{MachoError, Result},
    reader::{PointerWidth, Reader},
};

/// Size of the `cmd` and `cmdsize` words every load command starts with.
const COMMAND_HEADER_SIZE: u32 = 8;

#[derive(Debug)]
pub enum LoadCommand {
    /// Any command this crate does not decode; its body is skipped.
    Generic { cmd: u32, cmdsize: u32 },
    Segment32 { cmdsize: u32, segment: Segment },
    Segment64 { cmdsize: u32, segment: Segment },
    SymbolTable { cmdsize: u32, symtab: SymbolTable },
}

impl LoadCommand {
    /// Decodes the command at the reader's position and leaves the reader exactly
    /// `cmdsize` bytes after where the command started.
    pub fn parse<R>(reader: &mut Reader<R>) -> Result<LoadCommand>
    where
        R: Read + Seek,
    {
        let offset = reader.position()?;
        let cmd = reader.read_u32()?;
        let cmdsize = reader.read_u32()?;
        if cmdsize < COMMAND_HEADER_SIZE {
            return Err(MachoError::MisalignedRecord {
                offset,
                announced: cmdsize,
                consumed: u64::from(COMMAND_HEADER_SIZE),
            });
        }

        let command = match LoadCommandCode::from_u32(cmd) {
            Some(LoadCommandCode::Segment) => LoadCommand::Segment32 {
                cmdsize,
                segment: Segment::parse(reader, PointerWidth::Four)?,
            },
            Some(LoadCommandCode::Segment64) => LoadCommand::Segment64 {
                cmdsize,
                segment: Segment::parse(reader, PointerWidth::Eight)?,
            },
            Some(LoadCommandCode::Symtab) => LoadCommand::SymbolTable {
                cmdsize,
                symtab: SymbolTable::parse(reader)?,
            },
            _ => LoadCommand::Generic { cmd, cmdsize },
        };

        let consumed = reader.position()? - offset;
        if consumed > u64::from(cmdsize) {
            return Err(MachoError::MisalignedRecord {
                offset,
                announced: cmdsize,
                consumed,
            });
        }
        reader.seek_to(offset + u64::from(cmdsize))?;

        trace!(
            offset,
            cmd = format_args!("{:#x}", cmd),
            code = ?LoadCommandCode::from_u32(cmd),
            cmdsize,
            "decoded load command"
        );
        Ok(command)
    }

    pub fn cmd(&self) -> u32 {
        match self {
            LoadCommand::Generic { cmd, .. } => *cmd,
            LoadCommand::Segment32 { .. } => LoadCommandCode::Segment as u32,
            LoadCommand::Segment64 { .. } => LoadCommandCode::Segment64 as u32,
            LoadCommand::SymbolTable { .. } => LoadCommandCode::Symtab as u32,
        }
    }

    pub fn cmdsize(&self) -> u32 {
        match self {
            LoadCommand::Generic { cmdsize, .. }
            | LoadCommand::Segment32 { cmdsize, .. }
            | LoadCommand::Segment64 { cmdsize, .. }
            | LoadCommand::SymbolTable { cmdsize, .. } => *cmdsize,
        }
    }

    /// The named command code, if this crate knows it.
    pub fn code(&self) -> Option<LoadCommandCode> {
        LoadCommandCode::from_u32(self.cmd())
    }

    pub fn segment(&self) -> Option<&Segment> {
        match self {
            LoadCommand::Segment32 { segment, .. } | LoadCommand::Segment64 { segment, .. } => {
                Some(segment)
            }
            _ => None,
        }
    }

    pub fn symbol_table(&self) -> Option<&SymbolTable> {
        match self {
            LoadCommand::SymbolTable { symtab, .. } => Some(symtab),
            _ => None,
        }
    }
}

/// Walks the `ncmds` load commands following the header, keyed by file offset.
///
/// The reader must sit right after the header. Commands start on the header's
/// alignment boundary, and together they must span `sizeofcmds` bytes.
pub fn walk<R>(reader: &mut Reader<R>, header: &Header) -> Result<BTreeMap<u64, LoadCommand>>
where
    R: Read + Seek,
{
    let start = reader.align_to(header.alignment())?;
    let mut end = start;
    let mut commands = BTreeMap::new();
    for _ in 0..header.ncmds {
        let offset = reader.position()?;
        let command = LoadCommand::parse(reader)?;
        end = reader.position()?;
        reader.align_to(header.alignment())?;
        commands.insert(offset, command);
    }

    let actual = end - start;
    if actual != u64::from(header.sizeofcmds) {
        return Err(MachoError::CommandBlockMismatch {
            expected: header.sizeofcmds,
            actual,
        });
    }
    Ok(commands)
}

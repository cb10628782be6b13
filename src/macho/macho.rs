use std::{
    borrow::Cow,
    collections::BTreeMap,
    fs::File,
    io::{BufReader, Read, Seek},
    path::Path,
};

use once_cell::sync::OnceCell;
use tracing::debug;

use super::{
    header::Header,
    load_command::{self, LoadCommand},
    section::Section,
    segment::Segment,
    strtab::StringTable,
    symtab::{Symbol, SymbolTable},
};
use crate::{
    error::{MachoError, Result},
    reader::{Endian, PointerWidth, Reader},
};

pub const TEXT_SEGMENT: &str = "__TEXT";

/// A fully decoded Mach-O image.
///
/// Construction reads the header and every load command once; a failure anywhere
/// means no `MachO` at all. The source is not kept, and the derived views below
/// are computed on first use and cached.
#[derive(Debug)]
pub struct MachO {
    header: Header,
    load_commands: BTreeMap<u64, LoadCommand>,
    sections: OnceCell<Vec<Section>>,
    // offsets into `load_commands`
    symtab: OnceCell<Option<u64>>,
    text: OnceCell<Option<u64>>,
}

impl MachO {
    pub fn parse<R>(source: R) -> Result<MachO>
    where
        R: Read + Seek,
    {
        let mut reader = Reader::new(source);
        let header = Header::parse(&mut reader)?;
        let load_commands = load_command::walk(&mut reader, &header)?;
        debug!(commands = load_commands.len(), "parsed mach-o image");
        Ok(MachO {
            header,
            load_commands,
            sections: OnceCell::new(),
            symtab: OnceCell::new(),
            text: OnceCell::new(),
        })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<MachO> {
        let file = File::open(path)?;
        MachO::parse(BufReader::new(file))
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    #[inline]
    pub fn byte_order(&self) -> Endian {
        self.header.endian()
    }

    #[inline]
    pub fn is_64bit(&self) -> bool {
        self.header.is_64bit()
    }

    #[inline]
    pub fn pointer_width(&self) -> PointerWidth {
        self.header.width()
    }

    /// Wraps `source` in a reader using this image's byte order and pointer width,
    /// for consumers that go back to the file for section contents.
    pub fn reader<R>(&self, source: R) -> Reader<R>
    where
        R: Read + Seek,
    {
        Reader::with_layout(source, self.byte_order(), self.pointer_width())
    }

    /// Load commands keyed by the file offset they start at.
    pub fn load_commands(&self) -> &BTreeMap<u64, LoadCommand> {
        &self.load_commands
    }

    /// Segments of both widths, in load command order.
    pub fn segments(&self) -> impl Iterator<Item = &Segment> + '_ {
        self.load_commands.values().filter_map(LoadCommand::segment)
    }

    /// Every segment's sections, concatenated in load command order.
    pub fn sections(&self) -> &[Section] {
        self.sections.get_or_init(|| {
            self.segments()
                .flat_map(|segment| segment.sections().iter().cloned())
                .collect()
        })
    }

    /// Looks up a section by the 1-based index symbols use in `n_sect`.
    pub fn section(&self, index: u8) -> Result<&Section> {
        usize::from(index)
            .checked_sub(1)
            .and_then(|index| self.sections().get(index))
            .ok_or(MachoError::SectionIndexOutOfRange { index })
    }

    pub fn section_by_name(&self, segname: &str, sectname: &str) -> Option<&Section> {
        self.sections()
            .iter()
            .find(|section| section.is_named(segname, sectname))
    }

    /// The section a symbol is defined in, if it is defined in one.
    pub fn symbol_section(&self, symbol: &Symbol) -> Result<Option<&Section>> {
        symbol
            .section_index()
            .map(|index| self.section(index))
            .transpose()
    }

    fn symtab_command(&self) -> Option<&SymbolTable> {
        let offset = self.symtab.get_or_init(|| {
            self.load_commands
                .iter()
                .find(|(_, command)| command.symbol_table().is_some())
                .map(|(offset, _)| *offset)
        });
        offset
            .and_then(|offset| self.load_commands.get(&offset))
            .and_then(LoadCommand::symbol_table)
    }

    /// Symbols in file order, one per distinct value. Empty without `LC_SYMTAB`.
    pub fn symbol_table(&self) -> &[Symbol] {
        self.symtab_command()
            .map(SymbolTable::symbols)
            .unwrap_or_default()
    }

    pub fn string_table(&self) -> Option<&StringTable> {
        self.symtab_command().map(SymbolTable::strings)
    }

    /// Resolves a symbol's name through this image's string table. An image
    /// without `LC_SYMTAB` has nothing to resolve against and reports
    /// `MissingLoadCommand`.
    pub fn symbol_name(&self, symbol: &Symbol) -> Result<Cow<'_, str>> {
        match self.string_table() {
            Some(strings) => strings.resolve(symbol.name_offset),
            None => Err(MachoError::MissingLoadCommand("LC_SYMTAB")),
        }
    }

    pub fn text_segment(&self) -> Result<&Segment> {
        let offset = self.text.get_or_init(|| {
            self.load_commands
                .iter()
                .find(|(_, command)| {
                    command
                        .segment()
                        .map_or(false, |segment| segment.segname == TEXT_SEGMENT)
                })
                .map(|(offset, _)| *offset)
        });
        offset
            .and_then(|offset| self.load_commands.get(&offset))
            .and_then(LoadCommand::segment)
            .ok_or(MachoError::MissingRequiredSegment(TEXT_SEGMENT))
    }
}
